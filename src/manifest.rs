//! JSON manifest of successfully replicated images.
//!
//! The document is a JSON array of `{account_id, region, image_id}` objects
//! in completion order.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One replicated image.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct ManifestEntry {
    /// Account holding the copy.
    pub account_id: String,
    /// Region holding the copy.
    pub region: String,
    /// Identifier of the copy.
    pub image_id: String,
}

/// Errors raised while reading or writing a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Raised when the file system rejects an operation.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the document cannot be encoded or decoded.
    #[error("invalid manifest {path}: {message}")]
    Format {
        /// Path of the manifest.
        path: Utf8PathBuf,
        /// Serializer error message.
        message: String,
    },
}

fn split_path(path: &Utf8Path) -> Result<(&Utf8Path, &str), ManifestError> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().ok_or_else(|| ManifestError::Io {
        path: path.to_path_buf(),
        message: String::from("manifest path is missing a filename"),
    })?;
    Ok((parent, file_name))
}

/// Writes `entries` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ManifestError::Io`] when the directory or file cannot be written
/// and [`ManifestError::Format`] when serialization fails.
pub fn write_manifest(path: &Utf8Path, entries: &[ManifestEntry]) -> Result<(), ManifestError> {
    let (parent, file_name) = split_path(path)?;
    Dir::create_ambient_dir_all(parent, ambient_authority()).map_err(|err| ManifestError::Io {
        path: parent.to_path_buf(),
        message: err.to_string(),
    })?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| {
        ManifestError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        }
    })?;

    let rendered = serde_json::to_vec(entries).map_err(|err| ManifestError::Format {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    dir.write(file_name, rendered)
        .map_err(|err| ManifestError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

/// Reads a manifest previously written by [`write_manifest`].
///
/// # Errors
///
/// Returns [`ManifestError::Io`] when the file cannot be read and
/// [`ManifestError::Format`] when it is not a manifest document.
pub fn read_manifest(path: &Utf8Path) -> Result<Vec<ManifestEntry>, ManifestError> {
    let (parent, file_name) = split_path(path)?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| {
        ManifestError::Io {
            path: parent.to_path_buf(),
            message: err.to_string(),
        }
    })?;
    let contents = dir
        .read_to_string(file_name)
        .map_err(|err| ManifestError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    serde_json::from_str(&contents).map_err(|err| ManifestError::Format {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}
