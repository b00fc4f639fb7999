//! Image descriptions and single-image lookup.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::cloud::{CloudError, ImageClient};

/// Lifecycle state reported for an image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImageState {
    /// The image can be launched.
    Available,
    /// The image is still being created or copied.
    Pending,
    /// Creation or copy failed.
    Failed,
    /// Any other provider state, kept verbatim.
    Other(String),
}

impl ImageState {
    /// Returns the provider spelling of the state.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Available => "available",
            Self::Pending => "pending",
            Self::Failed => "failed",
            Self::Other(value) => value.as_str(),
        }
    }

    /// Returns `true` for [`ImageState::Available`].
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

impl From<&str> for ImageState {
    fn from(value: &str) -> Self {
        match value {
            "available" => Self::Available,
            "pending" => Self::Pending,
            "failed" => Self::Failed,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl std::fmt::Display for ImageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of a machine image as returned by the provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Image {
    /// Provider image identifier.
    pub id: String,
    /// Image name; empty when the provider reports none.
    pub name: String,
    /// Image description; empty when the provider reports none.
    pub description: String,
    /// Current lifecycle state.
    pub state: ImageState,
    /// Metadata tags attached to the image.
    pub tags: BTreeMap<String, String>,
}

impl Image {
    /// Creates an untagged image description with empty name and description.
    #[must_use]
    pub fn new(id: impl Into<String>, state: ImageState) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            state,
            tags: BTreeMap::new(),
        }
    }
}

/// Errors raised while locating a single image.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LocateError {
    /// Raised when the lookup returns zero or several images.
    #[error("single image {image_id} not located (found: {found} images)")]
    NotSingle {
        /// Identifier that was looked up.
        image_id: String,
        /// Number of images returned.
        found: usize,
    },
    /// Raised when the describe call itself fails.
    #[error("failed to describe image: {0}")]
    Remote(#[from] CloudError),
}

/// Looks up exactly one image by identifier.
///
/// Missing and ambiguous results are treated alike: the caller cannot
/// proceed with either.
///
/// # Errors
///
/// Returns [`LocateError::NotSingle`] unless exactly one image matches and
/// [`LocateError::Remote`] when the describe call fails.
pub async fn locate_single_image<C>(client: &C, image_id: &str) -> Result<Image, LocateError>
where
    C: ImageClient + ?Sized,
{
    let mut images = client.describe_images(image_id).await?;
    if images.len() != 1 {
        return Err(LocateError::NotSingle {
            image_id: image_id.to_owned(),
            found: images.len(),
        });
    }
    images.pop().ok_or_else(|| LocateError::NotSingle {
        image_id: image_id.to_owned(),
        found: 0,
    })
}
