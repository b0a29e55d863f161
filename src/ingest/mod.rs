//! Log ingestion sources.
//!
//! Every source produces [`LogLine`] records into a bounded mpsc channel and
//! honors a shared shutdown signal. Bounded capacity means a stalled consumer
//! applies backpressure to the producer instead of growing memory. When a
//! source stops (shutdown or end of input) it drops its sender so the channel
//! closes and the aggregator can retire it.

pub mod journald;
pub mod tailer;

pub use journald::JournalReader;
pub use tailer::FileTailer;

/// Per-source channel capacity. Producers block when the pipeline falls
/// behind.
pub const CHANNEL_CAPACITY: usize = 1024;

/// One raw line from a log source.
#[derive(Debug, Clone)]
pub struct LogLine {
    /// Origin tag: the file path, or "journald".
    pub source: String,
    /// Wall-clock arrival time (unix seconds).
    pub timestamp: i64,
    pub content: String,
}

impl LogLine {
    pub fn now(source: &str, content: String) -> Self {
        Self {
            source: source.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            content,
        }
    }
}
