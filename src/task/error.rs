//! Error types for a single copy task.

use thiserror::Error;

use crate::cloud::CloudError;
use crate::image::LocateError;

/// Reasons a copy task terminates in the failed state.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TaskError {
    /// Raised when the task is structurally invalid. Never retried.
    #[error("invalid copy task: {0}")]
    Validation(String),
    /// Raised when no client can be obtained for the target account.
    #[error("no client for account {account} in {region}: {source}")]
    Client {
        /// Target account.
        account: String,
        /// Target region.
        region: String,
        /// Factory error.
        #[source]
        source: CloudError,
    },
    /// Raised when the copy submission fails.
    #[error("copy of {image_id} to account {account} failed: {source}")]
    Copy {
        /// Source image identifier.
        image_id: String,
        /// Target account.
        account: String,
        /// Provider error, verbatim.
        #[source]
        source: CloudError,
    },
    /// Raised when tags cannot be applied to the copied image.
    #[error("tagging {image_id} in account {account} failed: {source}")]
    Tagging {
        /// Copied image identifier.
        image_id: String,
        /// Target account.
        account: String,
        /// Last provider error observed.
        #[source]
        source: CloudError,
    },
    /// Raised when the copied image cannot be looked up while polling.
    #[error("lookup of copied image failed: {0}")]
    Lookup(#[from] LocateError),
    /// Raised when the copied image never reaches the available state.
    #[error("timed out waiting for image {image_id} to copy to account {account} after {attempts} checks")]
    Timeout {
        /// Copied image identifier.
        image_id: String,
        /// Target account.
        account: String,
        /// Number of availability checks performed.
        attempts: u32,
    },
    /// Raised when the task's execution aborted unexpectedly.
    #[error("copy to account {account} aborted: {message}")]
    Aborted {
        /// Target account.
        account: String,
        /// Description of the abort.
        message: String,
    },
}
