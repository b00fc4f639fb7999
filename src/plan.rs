//! Expansion of source images and target accounts into copy tasks.

use thiserror::Error;

use crate::cloud::{ClientFactory, CloudError};
use crate::image::{LocateError, locate_single_image};
use crate::task::{CopyTask, TaskError};

/// Image to replicate, identified by its region and identifier.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SourceImage {
    /// Region holding the image.
    pub region: String,
    /// Image identifier.
    pub image_id: String,
}

/// Errors raised while parsing `region:image-id` lists.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SourceParseError {
    /// Raised when an entry lacks a region or an identifier.
    #[error("invalid source image {entry:?}: expected region:image-id")]
    Malformed {
        /// Offending entry.
        entry: String,
    },
    /// Raised when the list names no images.
    #[error("no source images given")]
    Empty,
}

impl SourceImage {
    /// Creates a source image reference.
    #[must_use]
    pub fn new(region: impl Into<String>, image_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            image_id: image_id.into(),
        }
    }

    /// Parses a single `region:image-id` entry.
    ///
    /// # Errors
    ///
    /// Returns [`SourceParseError::Malformed`] unless both halves are present.
    pub fn parse(entry: &str) -> Result<Self, SourceParseError> {
        let malformed = || SourceParseError::Malformed {
            entry: entry.to_owned(),
        };
        let (region, image_id) = entry.trim().split_once(':').ok_or_else(malformed)?;
        let (trimmed_region, trimmed_id) = (region.trim(), image_id.trim());
        if trimmed_region.is_empty() || trimmed_id.is_empty() || trimmed_id.contains(':') {
            return Err(malformed());
        }
        Ok(Self::new(trimmed_region, trimmed_id))
    }

    /// Parses a comma-separated list such as
    /// `us-east-1:ami-1234,eu-west-1:ami-5678`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceParseError::Empty`] when the list is blank and
    /// [`SourceParseError::Malformed`] for the first invalid entry.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, SourceParseError> {
        if list.trim().is_empty() {
            return Err(SourceParseError::Empty);
        }
        list.split(',').map(Self::parse).collect()
    }
}

impl std::fmt::Display for SourceImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.region, self.image_id)
    }
}

/// Splits a comma-separated account list, dropping blank entries.
#[must_use]
pub fn parse_accounts(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|account| !account.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Encryption and availability policy shared by every planned task.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CopyOptions {
    /// KMS key used to encrypt copies.
    pub kms_key_id: Option<String>,
    /// Whether copies are encrypted.
    pub encrypted: bool,
    /// Whether to wait for every copy to become available.
    pub ensure_available: bool,
}

/// Errors raised while planning copy tasks.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PlanError {
    /// Raised when there is nothing to copy to.
    #[error("no target accounts given")]
    NoTargetAccounts,
    /// Raised when no client can read the source region.
    #[error("no client for source region {region}: {source}")]
    Client {
        /// Source region.
        region: String,
        /// Factory error.
        #[source]
        source: CloudError,
    },
    /// Raised when a source image cannot be located.
    #[error("source image {image_id} in {region}: {source}")]
    Locate {
        /// Source region.
        region: String,
        /// Source image identifier.
        image_id: String,
        /// Locator error.
        #[source]
        source: LocateError,
    },
    /// Raised when a planned task fails validation.
    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Locates every source image once and builds one task per
/// (source image, target account) pair, in source-major order.
///
/// # Errors
///
/// Returns [`PlanError`] when no accounts are given, a source image cannot be
/// located, or an assembled task is invalid. No task is returned on error.
pub async fn plan_tasks<F>(
    factory: &F,
    sources: &[SourceImage],
    accounts: &[String],
    options: &CopyOptions,
) -> Result<Vec<CopyTask>, PlanError>
where
    F: ClientFactory + ?Sized,
{
    if accounts.is_empty() {
        return Err(PlanError::NoTargetAccounts);
    }

    let mut tasks = Vec::with_capacity(sources.len().saturating_mul(accounts.len()));
    for source in sources {
        let client = factory
            .source_client(&source.region)
            .map_err(|err| PlanError::Client {
                region: source.region.clone(),
                source: err,
            })?;
        let image = locate_single_image(&client, &source.image_id)
            .await
            .map_err(|err| PlanError::Locate {
                region: source.region.clone(),
                image_id: source.image_id.clone(),
                source: err,
            })?;

        for account in accounts {
            let task = CopyTask::builder()
                .target_account(account.as_str())
                .source_region(source.region.as_str())
                .source_image_id(image.id.as_str())
                .name(image.name.as_str())
                .description(image.description.as_str())
                .kms_key_id(options.kms_key_id.clone())
                .encrypted(options.encrypted)
                .ensure_available(options.ensure_available)
                .source_tags(image.tags.clone())
                .build()?;
            tasks.push(task);
        }
    }
    Ok(tasks)
}
