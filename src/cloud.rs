//! Narrow cloud capability consumed by the replication core.
//!
//! The executor only ever needs three calls against a regional, account-bound
//! client: submit a copy, apply tags, and describe an image. Everything about
//! credentials and transport lives behind [`ImageClient`] and
//! [`ClientFactory`].

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::image::Image;

/// Error code returned when the caller is not (yet) authorised for an action.
pub const UNAUTHORIZED_OPERATION: &str = "UnauthorizedOperation";

/// Error codes returned while a freshly copied image or its snapshot is not
/// yet visible to the tagging call.
pub const NOT_YET_VISIBLE_CODES: [&str; 2] = ["InvalidAMIID.NotFound", "InvalidSnapshot.NotFound"];

/// Failure reported by a cloud API call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CloudError {
    /// Provider error code (for example `UnauthorizedOperation`), when known.
    pub code: Option<String>,
    /// Human-readable message returned by the provider.
    pub message: String,
}

impl fmt::Display for CloudError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{code}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for CloudError {}

impl CloudError {
    /// Builds an error carrying a provider error code.
    #[must_use]
    pub fn coded(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Builds an error without a provider code (transport or parsing issues).
    #[must_use]
    pub fn uncoded(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Returns `true` when the error is an authorisation denial.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.code.as_deref() == Some(UNAUTHORIZED_OPERATION)
    }

    /// Returns `true` when the target image or snapshot is not visible yet.
    #[must_use]
    pub fn is_not_yet_visible(&self) -> bool {
        self.code
            .as_deref()
            .is_some_and(|code| NOT_YET_VISIBLE_CODES.contains(&code))
    }
}

/// Parameters for a single image copy submission.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CopyImageRequest {
    /// Region holding the source image.
    pub source_region: String,
    /// Identifier of the image to copy.
    pub source_image_id: String,
    /// Name given to the copy.
    pub name: String,
    /// Description given to the copy.
    pub description: String,
    /// KMS key used to encrypt the copy's snapshots.
    pub kms_key_id: Option<String>,
    /// Whether the copy's snapshots are encrypted.
    pub encrypted: bool,
}

/// Future returned by cloud operations.
pub type CloudFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CloudError>> + Send + 'a>>;

/// Regional client bound to one account.
pub trait ImageClient: Send + Sync {
    /// Submits an image copy and returns the new image identifier.
    fn copy_image<'a>(&'a self, request: &'a CopyImageRequest) -> CloudFuture<'a, String>;

    /// Applies `tags` to the image identified by `image_id`.
    fn create_tags<'a>(
        &'a self,
        image_id: &'a str,
        tags: &'a BTreeMap<String, String>,
    ) -> CloudFuture<'a, ()>;

    /// Returns every image matching `image_id`.
    fn describe_images<'a>(&'a self, image_id: &'a str) -> CloudFuture<'a, Vec<Image>>;
}

/// Produces authenticated regional clients.
///
/// Implementations own credential handling, including any cross-account role
/// assumption, so the core never sees secrets.
pub trait ClientFactory: Send + Sync {
    /// Client type handed to the executor.
    type Client: ImageClient + 'static;

    /// Returns a client in the caller's own account for reading source images.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError`] when a client cannot be built for `region`.
    fn source_client(&self, region: &str) -> Result<Self::Client, CloudError>;

    /// Returns a client acting in `account` within `region`.
    ///
    /// # Errors
    ///
    /// Returns [`CloudError`] when a client cannot be built for the pair.
    fn target_client(&self, account: &str, region: &str) -> Result<Self::Client, CloudError>;
}
