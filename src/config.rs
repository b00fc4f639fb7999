//! Configuration loading via `ortho-config`.

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::aws::{ACCOUNT_PLACEHOLDER, AwsCliSettings, DEFAULT_AWS_BIN};
use crate::plan::{CopyOptions, SourceImage, parse_accounts};

/// Replication settings derived from configuration files and environment
/// variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "REPLIKA",
    discovery(
        app_name = "replika",
        env_var = "REPLIKA_CONFIG_PATH",
        config_file_name = "replika.toml",
        dotfile_name = ".replika.toml",
        project_file_name = "replika.toml"
    )
)]
#[expect(
    clippy::struct_excessive_bools,
    reason = "configuration struct with user-facing toggle settings that are naturally expressed as booleans"
)]
pub struct ReplicationConfig {
    /// Images to replicate as a comma-separated `region:image-id` list.
    #[ortho_config(default = String::new())]
    pub source_images: String,
    /// Comma-separated list of accounts receiving copies.
    #[ortho_config(default = String::new())]
    pub target_accounts: String,
    /// KMS key used to encrypt copies. Requires `encrypt_boot`.
    pub kms_key_id: Option<String>,
    /// Whether copies are encrypted.
    #[ortho_config(default = false)]
    pub encrypt_boot: bool,
    /// Maximum number of copies in flight; `0` runs every copy at once.
    #[ortho_config(default = 0)]
    pub copy_concurrency: usize,
    /// Whether to wait for every copy to become available.
    #[ortho_config(default = false)]
    pub ensure_available: bool,
    /// Path receiving the JSON manifest of successful copies.
    pub manifest_output: Option<String>,
    /// Path to the `aws` executable.
    #[ortho_config(default = DEFAULT_AWS_BIN.to_owned())]
    pub aws_bin: String,
    /// AWS CLI profile used to read source images.
    pub source_profile: Option<String>,
    /// AWS CLI profile template for target accounts, for example
    /// `replika-{account_id}`.
    pub target_profile_template: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl ReplicationConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to replika.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("replika")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages include guidance on how
    /// to provide missing values via environment variables or configuration
    /// files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when a value cannot be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.source_images,
            &FieldMetadata::new(
                "source images",
                "REPLIKA_SOURCE_IMAGES",
                "source_images",
            ),
        )?;
        Self::require_field(
            &self.target_accounts,
            &FieldMetadata::new(
                "target accounts",
                "REPLIKA_TARGET_ACCOUNTS",
                "target_accounts",
            ),
        )?;
        Self::require_field(
            &self.aws_bin,
            &FieldMetadata::new("AWS CLI binary", "REPLIKA_AWS_BIN", "aws_bin"),
        )?;
        self.source_image_list()?;
        if self.target_account_list().is_empty() {
            return Err(ConfigError::Invalid(String::from(
                "target_accounts lists no accounts",
            )));
        }
        if self.kms_key().is_some() && !self.encrypt_boot {
            return Err(ConfigError::Invalid(String::from(
                "kms_key_id requires encrypt_boot to be enabled",
            )));
        }
        if let Some(template) = &self.target_profile_template
            && !template.contains(ACCOUNT_PLACEHOLDER)
        {
            return Err(ConfigError::Invalid(format!(
                "target_profile_template must contain {ACCOUNT_PLACEHOLDER}"
            )));
        }
        Ok(())
    }

    /// Parses [`Self::source_images`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the list is malformed.
    pub fn source_image_list(&self) -> Result<Vec<SourceImage>, ConfigError> {
        SourceImage::parse_list(&self.source_images)
            .map_err(|err| ConfigError::Invalid(format!("source_images: {err}")))
    }

    /// Parses [`Self::target_accounts`], dropping blank entries.
    #[must_use]
    pub fn target_account_list(&self) -> Vec<String> {
        parse_accounts(&self.target_accounts)
    }

    fn kms_key(&self) -> Option<String> {
        self.kms_key_id
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_owned)
    }

    /// Encryption and availability policy for planned tasks.
    #[must_use]
    pub fn copy_options(&self) -> CopyOptions {
        CopyOptions {
            kms_key_id: self.kms_key(),
            encrypted: self.encrypt_boot,
            ensure_available: self.ensure_available,
        }
    }

    /// Manifest destination, if configured and non-blank.
    #[must_use]
    pub fn manifest_path(&self) -> Option<Utf8PathBuf> {
        self.manifest_output
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(Utf8PathBuf::from)
    }

    /// Settings for the AWS CLI client factory.
    #[must_use]
    pub fn aws_settings(&self) -> AwsCliSettings {
        AwsCliSettings {
            aws_bin: self.aws_bin.trim().to_owned(),
            source_profile: self.source_profile.clone(),
            target_profile_template: self.target_profile_template.clone(),
        }
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configured value cannot be used.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
