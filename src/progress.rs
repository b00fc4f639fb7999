//! Human-readable progress notifications.

use tracing::info;

/// Receives progress messages emitted while replicating.
///
/// Sinks are observational: nothing in the replication outcome depends on
/// what a sink does with a message.
pub trait ProgressSink: Send + Sync {
    /// Records one progress message.
    fn say(&self, message: &str);
}

/// Sink that forwards every message to `tracing` at info level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn say(&self, message: &str) {
        info!(target: "replika::progress", "{message}");
    }
}
