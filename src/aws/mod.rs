//! Image client backed by the AWS CLI.
//!
//! Every call shells out to `aws ec2 ...` with `--output json`, mirroring how
//! the rest of the tooling drives provider CLIs. Credentials are resolved by
//! the CLI itself from named profiles, so this module never handles secrets.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::cloud::{ClientFactory, CloudError, CloudFuture, CopyImageRequest, ImageClient};
use crate::image::Image;

mod command;
mod parse;

pub use command::{CommandError, CommandFuture, CommandOutput, CommandRunner, ProcessCommandRunner};

/// Default AWS CLI binary name.
pub const DEFAULT_AWS_BIN: &str = "aws";

/// Placeholder replaced by the target account in profile templates.
pub const ACCOUNT_PLACEHOLDER: &str = "{account_id}";

/// Regional AWS client acting under one CLI profile.
#[derive(Debug)]
pub struct AwsCliClient<R: CommandRunner> {
    runner: Arc<R>,
    aws_bin: String,
    region: String,
    profile: Option<String>,
}

impl<R: CommandRunner> AwsCliClient<R> {
    /// Creates a client for `region` using `profile`, or the CLI default
    /// credentials when `profile` is `None`.
    #[must_use]
    pub fn new(
        runner: Arc<R>,
        aws_bin: impl Into<String>,
        region: impl Into<String>,
        profile: Option<String>,
    ) -> Self {
        Self {
            runner,
            aws_bin: aws_bin.into(),
            region: region.into(),
            profile,
        }
    }

    /// Region every call is sent to.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Profile used for credentials, if any.
    #[must_use]
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    fn ec2_args(&self, operation: &str, mut rest: Vec<OsString>) -> Vec<OsString> {
        let mut args = vec![OsString::from("ec2"), OsString::from(operation)];
        args.append(&mut rest);
        args.push(OsString::from("--region"));
        args.push(OsString::from(&self.region));
        if let Some(profile) = &self.profile {
            args.push(OsString::from("--profile"));
            args.push(OsString::from(profile));
        }
        args.push(OsString::from("--output"));
        args.push(OsString::from("json"));
        args
    }

    async fn run_ec2(&self, operation: &str, rest: Vec<OsString>) -> Result<String, CloudError> {
        let args = self.ec2_args(operation, rest);
        debug!(operation, region = %self.region, profile = ?self.profile, "invoking aws cli");
        let output = self
            .runner
            .run(&self.aws_bin, &args)
            .await
            .map_err(|err| CloudError::uncoded(err.to_string()))?;
        if output.is_success() {
            Ok(output.stdout)
        } else {
            Err(parse::cli_error(&output.stderr, output.code))
        }
    }
}

fn copy_image_args(request: &CopyImageRequest, client_token: &str) -> Vec<OsString> {
    let mut args = vec![
        OsString::from("--source-region"),
        OsString::from(&request.source_region),
        OsString::from("--source-image-id"),
        OsString::from(&request.source_image_id),
        OsString::from("--name"),
        OsString::from(&request.name),
    ];
    if !request.description.is_empty() {
        args.push(OsString::from("--description"));
        args.push(OsString::from(&request.description));
    }
    if request.encrypted {
        args.push(OsString::from("--encrypted"));
    }
    if let Some(key) = &request.kms_key_id {
        args.push(OsString::from("--kms-key-id"));
        args.push(OsString::from(key));
    }
    args.push(OsString::from("--client-token"));
    args.push(OsString::from(client_token));
    args
}

impl<R: CommandRunner> ImageClient for AwsCliClient<R> {
    fn copy_image<'a>(&'a self, request: &'a CopyImageRequest) -> CloudFuture<'a, String> {
        Box::pin(async move {
            let token = Uuid::new_v4().to_string();
            let stdout = self
                .run_ec2("copy-image", copy_image_args(request, &token))
                .await?;
            parse::copied_image_id(&stdout)
        })
    }

    fn create_tags<'a>(
        &'a self,
        image_id: &'a str,
        tags: &'a BTreeMap<String, String>,
    ) -> CloudFuture<'a, ()> {
        Box::pin(async move {
            let args = vec![
                OsString::from("--resources"),
                OsString::from(image_id),
                OsString::from("--tags"),
                OsString::from(parse::render_tags(tags)),
            ];
            self.run_ec2("create-tags", args).await.map(|_| ())
        })
    }

    fn describe_images<'a>(&'a self, image_id: &'a str) -> CloudFuture<'a, Vec<Image>> {
        Box::pin(async move {
            let args = vec![
                OsString::from("--filters"),
                OsString::from(format!("Name=image-id,Values={image_id}")),
            ];
            let stdout = self.run_ec2("describe-images", args).await?;
            parse::described_images(&stdout)
        })
    }
}

/// Settings shared by every client an [`AwsCliFactory`] produces.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AwsCliSettings {
    /// Path to the `aws` binary.
    pub aws_bin: String,
    /// Profile used to read source images; CLI defaults when `None`.
    pub source_profile: Option<String>,
    /// Profile template for target accounts, containing [`ACCOUNT_PLACEHOLDER`].
    /// Target clients fall back to the source profile when `None`.
    pub target_profile_template: Option<String>,
}

impl Default for AwsCliSettings {
    fn default() -> Self {
        Self {
            aws_bin: String::from(DEFAULT_AWS_BIN),
            source_profile: None,
            target_profile_template: None,
        }
    }
}

impl AwsCliSettings {
    /// Returns the profile used for `account`.
    #[must_use]
    pub fn target_profile(&self, account: &str) -> Option<String> {
        self.target_profile_template.as_ref().map_or_else(
            || self.source_profile.clone(),
            |template| Some(template.replace(ACCOUNT_PLACEHOLDER, account)),
        )
    }
}

/// Builds [`AwsCliClient`]s sharing one command runner.
#[derive(Debug)]
pub struct AwsCliFactory<R: CommandRunner> {
    runner: Arc<R>,
    settings: AwsCliSettings,
}

impl AwsCliFactory<ProcessCommandRunner> {
    /// Creates a factory wired to the real process runner.
    #[must_use]
    pub fn with_process_runner(settings: AwsCliSettings) -> Self {
        Self::new(settings, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> AwsCliFactory<R> {
    /// Creates a factory using the provided settings and runner.
    #[must_use]
    pub fn new(settings: AwsCliSettings, runner: R) -> Self {
        Self {
            runner: Arc::new(runner),
            settings,
        }
    }

    /// Settings applied to produced clients.
    #[must_use]
    pub const fn settings(&self) -> &AwsCliSettings {
        &self.settings
    }

    fn client(&self, region: &str, profile: Option<String>) -> Result<AwsCliClient<R>, CloudError> {
        let trimmed = region.trim();
        if trimmed.is_empty() {
            return Err(CloudError::uncoded("region must not be empty"));
        }
        Ok(AwsCliClient::new(
            Arc::clone(&self.runner),
            self.settings.aws_bin.clone(),
            trimmed,
            profile,
        ))
    }
}

impl<R: CommandRunner + 'static> ClientFactory for AwsCliFactory<R> {
    type Client = AwsCliClient<R>;

    fn source_client(&self, region: &str) -> Result<Self::Client, CloudError> {
        self.client(region, self.settings.source_profile.clone())
    }

    fn target_client(&self, account: &str, region: &str) -> Result<Self::Client, CloudError> {
        let trimmed_account = account.trim();
        if trimmed_account.is_empty() {
            return Err(CloudError::uncoded("target account must not be empty"));
        }
        self.client(region, self.settings.target_profile(trimmed_account))
    }
}
