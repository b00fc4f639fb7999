//! Core library for the replika image replication tool.
//!
//! The crate fans a machine image out to many target accounts: planning turns
//! source images and accounts into copy tasks, a bounded worker pool runs
//! each task through the copy → tag → wait state machine, and the results are
//! aggregated into a failure count and a JSON manifest. Cloud access sits
//! behind the [`ImageClient`] and [`ClientFactory`] traits, with an AWS CLI
//! implementation in [`aws`].

pub mod aws;
pub mod cloud;
pub mod config;
pub mod executor;
pub mod image;
pub mod manifest;
pub mod orchestrator;
pub mod plan;
pub mod progress;
pub mod task;
pub mod test_support;

pub use aws::{AwsCliClient, AwsCliFactory, AwsCliSettings, ProcessCommandRunner};
pub use cloud::{ClientFactory, CloudError, CopyImageRequest, ImageClient};
pub use config::{ConfigError, ReplicationConfig};
pub use executor::{CopyExecutor, RetryPolicy};
pub use image::{Image, ImageState, LocateError, locate_single_image};
pub use manifest::{ManifestEntry, ManifestError, read_manifest, write_manifest};
pub use orchestrator::{AggregateOutcome, Replicator};
pub use plan::{CopyOptions, PlanError, SourceImage};
pub use progress::{ProgressSink, TracingProgress};
pub use task::{CopyOutcome, CopyResult, CopyTask, CopyTaskBuilder, TaskError, TaskIdentity};
