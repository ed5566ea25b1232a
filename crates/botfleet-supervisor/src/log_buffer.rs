// ABOUTME: Bounded per-worker log capture.
// ABOUTME: LogBuffer keeps the most recent lines; LogSink stamps and forwards lines into it.

use botfleet_log::WORKER_TARGET;
use chrono::Local;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default number of lines kept per worker.
pub const DEFAULT_CAPACITY: usize = 200;

/// Fixed-capacity ring of log lines. Once full, each write evicts the oldest
/// line. Reads return a copy, never a live view.
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    inner: Mutex<VecDeque<String>>,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` lines (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self, line: impl Into<String>) {
        let mut lines = self.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Snapshot of the stored lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Handle a worker body uses to emit log lines.
///
/// Every line is prefixed with a local timestamp and `[worker-id]`, stored in
/// the worker's buffer, and mirrored to tracing under `botfleet::worker`.
#[derive(Debug, Clone)]
pub struct LogSink {
    worker: Arc<str>,
    buffer: Arc<LogBuffer>,
}

impl LogSink {
    pub fn new(worker: &str, buffer: Arc<LogBuffer>) -> Self {
        Self {
            worker: Arc::from(worker),
            buffer,
        }
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Emit one message. Embedded newlines produce one buffer entry per line.
    pub fn line(&self, message: impl AsRef<str>) {
        let message = message.as_ref().trim_end_matches(['\r', '\n']);
        let stamp = Local::now().format("%Y/%m/%d %H:%M:%S").to_string();
        for part in message.split('\n') {
            let part = part.trim_end_matches('\r');
            tracing::info!(target: WORKER_TARGET, worker = %self.worker, "{}", part);
            self.buffer
                .write(format!("{} [{}] {}", stamp, self.worker, part));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_buffer_has_no_lines() {
        let buf = LogBuffer::new(DEFAULT_CAPACITY);
        assert!(buf.lines().is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_keeps_last_200_of_250_oldest_first() {
        let buf = LogBuffer::default();
        for i in 0..250 {
            buf.write(format!("line {i}"));
        }

        let lines = buf.lines();
        assert_eq!(lines.len(), 200);
        assert_eq!(lines[0], "line 50");
        assert_eq!(lines[199], "line 249");
        let expected: Vec<String> = (50..250).map(|i| format!("line {i}")).collect();
        assert_eq!(lines, expected);
    }

    #[test]
    fn test_partial_fill_preserves_order() {
        let buf = LogBuffer::new(5);
        buf.write("a");
        buf.write("b");
        assert_eq!(buf.lines(), vec!["a", "b"]);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_snapshot_is_not_live() {
        let buf = LogBuffer::new(3);
        buf.write("one");
        let snapshot = buf.lines();
        buf.write("two");
        assert_eq!(snapshot, vec!["one"]);
        assert_eq!(buf.lines(), vec!["one", "two"]);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let buf = LogBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
        buf.write("x");
        buf.write("y");
        assert_eq!(buf.lines(), vec!["y"]);
    }

    #[test]
    fn test_concurrent_writer_and_readers() {
        let buf = Arc::new(LogBuffer::new(50));
        let writer = {
            let buf = Arc::clone(&buf);
            std::thread::spawn(move || {
                for i in 0..1000 {
                    buf.write(format!("{i}"));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let buf = Arc::clone(&buf);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let lines = buf.lines();
                        assert!(lines.len() <= 50);
                        // Each snapshot is a contiguous, increasing run.
                        let nums: Vec<u32> = lines.iter().map(|l| l.parse().unwrap()).collect();
                        assert!(nums.windows(2).all(|w| w[1] == w[0] + 1));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(buf.lines().last().map(String::as_str), Some("999"));
    }

    #[test]
    fn test_sink_prefixes_worker_id() {
        let buf = Arc::new(LogBuffer::new(10));
        let sink = LogSink::new("doc-bot", Arc::clone(&buf));
        sink.line("connected to telegram\n");

        let lines = buf.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("[doc-bot] connected to telegram"));
    }

    #[test]
    fn test_sink_splits_multiline_messages() {
        let buf = Arc::new(LogBuffer::new(10));
        let sink = LogSink::new("w", Arc::clone(&buf));
        sink.line("first\r\nsecond");

        let lines = buf.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[w] first"));
        assert!(lines[1].ends_with("[w] second"));
    }
}
