//! Shared fixtures for replication BDD scenarios.

use std::time::Duration;

use replika::test_support::{RecordingProgress, ScriptedCloud};
use replika::{AggregateOutcome, CopyExecutor, CopyOptions, Replicator, RetryPolicy, SourceImage};
use rstest::fixture;

#[derive(Clone, Debug)]
pub enum ReplicationResult {
    Completed(AggregateOutcome),
    PlanFailed(String),
}

#[derive(Clone, Debug)]
pub struct ReplicationContext {
    pub cloud: ScriptedCloud,
    pub progress: RecordingProgress,
    pub sources: Vec<SourceImage>,
    pub accounts: Vec<String>,
    pub options: CopyOptions,
    pub outcome: Option<ReplicationResult>,
}

#[fixture]
pub fn replication_context() -> ReplicationContext {
    ReplicationContext {
        cloud: ScriptedCloud::new(),
        progress: RecordingProgress::new(),
        sources: Vec::new(),
        accounts: Vec::new(),
        options: CopyOptions::default(),
        outcome: None,
    }
}

impl ReplicationContext {
    /// Builds a replicator over the scripted cloud with sleeps disabled.
    pub fn replicator(&self) -> Replicator<ScriptedCloud, RecordingProgress> {
        Replicator::new(self.cloud.clone(), self.progress.clone()).with_executor(
            CopyExecutor::new()
                .with_tag_retry(RetryPolicy::new(11, Duration::ZERO, 2, Duration::ZERO))
                .with_availability_poll(30, Duration::ZERO),
        )
    }

    pub fn completed(&self) -> Option<&AggregateOutcome> {
        match self.outcome.as_ref() {
            Some(ReplicationResult::Completed(outcome)) => Some(outcome),
            _ => None,
        }
    }
}
