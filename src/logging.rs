use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use bevy::prelude::*;

/// Verbosity a message requires before it reaches the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Normal = 0,
    Raised = 1,
    Verbose = 2,
}

impl LogLevel {
    pub const MAX: u8 = LogLevel::Verbose as u8;
}

/// Lines kept between heartbeat polls before the oldest are dropped.
pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

#[derive(Default)]
struct BufferState {
    entries: VecDeque<String>,
    dropped: usize,
}

/// Formatted log lines waiting for the next heartbeat poll.
///
/// Bounded so a host without a polling console cannot grow it forever. When
/// full the oldest line is dropped, and the next drain starts with a line
/// saying how many were lost.
#[derive(Clone)]
pub struct LogBuffer {
    state: Arc<Mutex<BufferState>>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl LogBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(BufferState::default())),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, line: String) {
        let mut state = self.lock();
        if state.entries.len() >= self.capacity {
            state.entries.pop_front();
            state.dropped += 1;
        }
        state.entries.push_back(line);
    }

    /// Returns every buffered line and leaves the buffer empty.
    pub fn drain(&self) -> Vec<String> {
        let mut state = self.lock();
        let dropped = std::mem::take(&mut state.dropped);
        let mut lines = Vec::with_capacity(state.entries.len() + 1);
        if dropped > 0 {
            lines.push(format!(
                "[{}] {dropped} log line(s) dropped since the last poll",
                unix_ms_now()
            ));
        }
        lines.extend(state.entries.drain(..));
        lines
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BufferState> {
        // A panic while holding the lock cannot leave the state half-updated.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Log entry point shared by the server internals and host code.
#[derive(Resource, Clone)]
pub struct ServerLog {
    debug_level: Arc<AtomicU8>,
    buffer: LogBuffer,
}

impl Default for ServerLog {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ServerLog {
    pub fn new(debug_level: u8) -> Self {
        Self {
            debug_level: Arc::new(AtomicU8::new(debug_level.min(LogLevel::MAX))),
            buffer: LogBuffer::default(),
        }
    }

    pub fn debug_level(&self) -> u8 {
        self.debug_level.load(Ordering::Relaxed)
    }

    pub fn set_debug_level(&self, level: u8) {
        self.debug_level
            .store(level.min(LogLevel::MAX), Ordering::Relaxed);
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        self.debug_level() >= level as u8
    }

    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    pub fn log_message(&self, text: impl AsRef<str>, level: LogLevel) {
        if !self.enabled(level) {
            return;
        }
        let text = text.as_ref();
        info!("[Tickwire] {text}");
        self.buffer.push(format!("[{}] {text}", unix_ms_now()));
    }

    /// Warnings always reach the sink regardless of debug level.
    pub fn warn(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        warn!("[Tickwire] {text}");
        self.buffer.push(format!("[{}] {text}", unix_ms_now()));
    }

    pub fn error(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        error!("[Tickwire] {text}");
        self.buffer.push(format!("[{}] {text}", unix_ms_now()));
    }
}

pub(crate) fn unix_ms_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_above_debug_level_are_filtered() {
        let log = ServerLog::new(1);
        log.log_message("normal", LogLevel::Normal);
        log.log_message("raised", LogLevel::Raised);
        log.log_message("verbose", LogLevel::Verbose);

        let lines = log.buffer().drain();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("normal"));
        assert!(lines[1].ends_with("raised"));
    }

    #[test]
    fn debug_level_is_clamped() {
        let log = ServerLog::new(9);
        assert_eq!(log.debug_level(), 2);
        log.set_debug_level(0);
        assert!(!log.enabled(LogLevel::Raised));
    }

    #[test]
    fn consecutive_drains_are_disjoint_and_lossless() {
        let buffer = LogBuffer::default();
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        buffer.push(format!("{w}-{i}"));
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        seen.extend(buffer.drain());
        for writer in writers {
            writer.join().expect("writer thread");
        }
        seen.extend(buffer.drain());

        assert_eq!(seen.len(), 1000);
        let unique: std::collections::HashSet<_> = seen.iter().collect();
        assert_eq!(unique.len(), 1000);
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn full_buffer_drops_oldest_and_reports_it() {
        let buffer = LogBuffer::with_capacity(3);
        for i in 0..5 {
            buffer.push(format!("line {i}"));
        }
        assert_eq!(buffer.len(), 3);

        let lines = buffer.drain();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("2 log line(s) dropped since the last poll"));
        assert_eq!(&lines[1..], ["line 2", "line 3", "line 4"]);

        buffer.push("fresh".to_string());
        assert_eq!(buffer.drain(), vec!["fresh".to_string()]);
    }
}
