//! Copy task descriptions and their terminal results.
//!
//! A [`CopyTask`] fully describes one (source image, target account)
//! replication. It is built before orchestration starts and only ever
//! borrowed afterwards; each execution yields exactly one [`CopyResult`].

use std::collections::BTreeMap;

use crate::cloud::CopyImageRequest;
use crate::manifest::ManifestEntry;

mod error;

pub use error::TaskError;

/// One fully resolved replication request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CopyTask {
    /// Account receiving the copy.
    pub target_account: String,
    /// Region holding the source image; the copy lands in the same region.
    pub source_region: String,
    /// Identifier of the image being replicated.
    pub source_image_id: String,
    /// Name copied from the source image.
    pub name: String,
    /// Description copied from the source image.
    pub description: String,
    /// KMS key used to encrypt the copy, when not using the default key.
    pub kms_key_id: Option<String>,
    /// Whether the copy is encrypted.
    pub encrypted: bool,
    /// Whether to wait for the copy to become available.
    pub ensure_available: bool,
    /// Tags to re-apply to the copy.
    pub source_tags: BTreeMap<String, String>,
}

impl CopyTask {
    /// Starts a builder for a [`CopyTask`].
    #[must_use]
    pub fn builder() -> CopyTaskBuilder {
        CopyTaskBuilder::default()
    }

    /// Checks that the task can be submitted.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Validation`] when a required field is blank or a
    /// KMS key is supplied for an unencrypted copy.
    pub fn validate(&self) -> Result<(), TaskError> {
        for (field, value) in [
            ("target_account", &self.target_account),
            ("source_region", &self.source_region),
            ("source_image_id", &self.source_image_id),
        ] {
            if value.trim().is_empty() {
                return Err(TaskError::Validation(format!(
                    "missing or empty field: {field}"
                )));
            }
        }
        if self.kms_key_id.is_some() && !self.encrypted {
            return Err(TaskError::Validation(String::from(
                "kms_key_id requires encrypted to be set",
            )));
        }
        Ok(())
    }

    /// Builds the provider copy request for this task.
    #[must_use]
    pub fn copy_request(&self) -> CopyImageRequest {
        CopyImageRequest {
            source_region: self.source_region.clone(),
            source_image_id: self.source_image_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            kms_key_id: self.kms_key_id.clone(),
            encrypted: self.encrypted,
        }
    }

    /// Returns the identifying triple reported alongside the result.
    #[must_use]
    pub fn identity(&self) -> TaskIdentity {
        TaskIdentity {
            account: self.target_account.clone(),
            region: self.source_region.clone(),
            source_image_id: self.source_image_id.clone(),
        }
    }
}

/// Builder for [`CopyTask`] that trims inputs and validates on build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CopyTaskBuilder {
    target_account: String,
    source_region: String,
    source_image_id: String,
    name: String,
    description: String,
    kms_key_id: Option<String>,
    encrypted: bool,
    ensure_available: bool,
    source_tags: BTreeMap<String, String>,
}

impl CopyTaskBuilder {
    /// Sets the target account.
    #[must_use]
    pub fn target_account(mut self, value: impl Into<String>) -> Self {
        self.target_account = value.into();
        self
    }

    /// Sets the source region.
    #[must_use]
    pub fn source_region(mut self, value: impl Into<String>) -> Self {
        self.source_region = value.into();
        self
    }

    /// Sets the source image identifier.
    #[must_use]
    pub fn source_image_id(mut self, value: impl Into<String>) -> Self {
        self.source_image_id = value.into();
        self
    }

    /// Sets the copy's name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the copy's description.
    #[must_use]
    pub fn description(mut self, value: impl Into<String>) -> Self {
        self.description = value.into();
        self
    }

    /// Sets the KMS key. Blank keys are treated as unset.
    #[must_use]
    pub fn kms_key_id(mut self, value: Option<String>) -> Self {
        self.kms_key_id = value;
        self
    }

    /// Sets whether the copy is encrypted.
    #[must_use]
    pub const fn encrypted(mut self, value: bool) -> Self {
        self.encrypted = value;
        self
    }

    /// Sets whether to wait for availability.
    #[must_use]
    pub const fn ensure_available(mut self, value: bool) -> Self {
        self.ensure_available = value;
        self
    }

    /// Sets the tags to propagate.
    #[must_use]
    pub fn source_tags(mut self, value: BTreeMap<String, String>) -> Self {
        self.source_tags = value;
        self
    }

    /// Builds and validates the [`CopyTask`].
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Validation`] when the assembled task is invalid.
    pub fn build(self) -> Result<CopyTask, TaskError> {
        let task = CopyTask {
            target_account: self.target_account.trim().to_owned(),
            source_region: self.source_region.trim().to_owned(),
            source_image_id: self.source_image_id.trim().to_owned(),
            name: self.name,
            description: self.description,
            kms_key_id: self
                .kms_key_id
                .map(|key| key.trim().to_owned())
                .filter(|key| !key.is_empty()),
            encrypted: self.encrypted,
            ensure_available: self.ensure_available,
            source_tags: self.source_tags,
        };
        task.validate()?;
        Ok(task)
    }
}

/// Identifies the task a result belongs to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TaskIdentity {
    /// Target account.
    pub account: String,
    /// Region of the source image and of the copy.
    pub region: String,
    /// Source image identifier.
    pub source_image_id: String,
}

/// Terminal state of one task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CopyOutcome {
    /// Copy, tagging, and any availability wait completed.
    Succeeded {
        /// Identifier of the new image in the target account.
        image_id: String,
    },
    /// The first fatal step's error.
    Failed(TaskError),
}

/// Result produced exactly once per task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CopyResult {
    /// Which task produced this result.
    pub identity: TaskIdentity,
    /// Terminal outcome.
    pub outcome: CopyOutcome,
}

impl CopyResult {
    /// Pairs an identity with the executor's result.
    #[must_use]
    pub fn new(identity: TaskIdentity, result: Result<String, TaskError>) -> Self {
        let outcome = match result {
            Ok(image_id) => CopyOutcome::Succeeded { image_id },
            Err(err) => CopyOutcome::Failed(err),
        };
        Self { identity, outcome }
    }

    /// Returns `true` when the task failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self.outcome, CopyOutcome::Failed(_))
    }

    /// Returns the manifest entry for a succeeded task.
    #[must_use]
    pub fn manifest_entry(&self) -> Option<ManifestEntry> {
        match &self.outcome {
            CopyOutcome::Succeeded { image_id } => Some(ManifestEntry {
                account_id: self.identity.account.clone(),
                region: self.identity.region.clone(),
                image_id: image_id.clone(),
            }),
            CopyOutcome::Failed(_) => None,
        }
    }
}
