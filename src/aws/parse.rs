//! Decoding of AWS CLI JSON output and error text.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::cloud::CloudError;
use crate::image::{Image, ImageState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CopyImageOutput {
    image_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeImagesOutput {
    #[serde(default)]
    images: Vec<AwsImage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwsImage {
    image_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    tags: Vec<AwsTag>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AwsTag {
    key: String,
    #[serde(default)]
    value: String,
}

impl From<AwsImage> for Image {
    fn from(raw: AwsImage) -> Self {
        Self {
            id: raw.image_id,
            name: raw.name.unwrap_or_default(),
            description: raw.description.unwrap_or_default(),
            state: raw
                .state
                .as_deref()
                .map_or_else(|| ImageState::Other(String::new()), ImageState::from),
            tags: raw
                .tags
                .into_iter()
                .map(|tag| (tag.key, tag.value))
                .collect::<BTreeMap<_, _>>(),
        }
    }
}

fn parse_failure(resource: &str, err: &serde_json::Error) -> CloudError {
    CloudError::uncoded(format!("failed to parse {resource} output: {err}"))
}

/// Extracts the new image identifier from `aws ec2 copy-image` output.
pub(super) fn copied_image_id(stdout: &str) -> Result<String, CloudError> {
    serde_json::from_str::<CopyImageOutput>(stdout)
        .map(|out| out.image_id)
        .map_err(|err| parse_failure("copy-image", &err))
}

/// Decodes `aws ec2 describe-images` output.
pub(super) fn described_images(stdout: &str) -> Result<Vec<Image>, CloudError> {
    serde_json::from_str::<DescribeImagesOutput>(stdout)
        .map(|out| out.images.into_iter().map(Image::from).collect())
        .map_err(|err| parse_failure("describe-images", &err))
}

/// Renders tags in the shorthand-free JSON form accepted by `--tags`.
pub(super) fn render_tags(tags: &BTreeMap<String, String>) -> String {
    let entries = tags
        .iter()
        .map(|(key, value)| serde_json::json!({ "Key": key, "Value": value }))
        .collect::<Vec<_>>();
    serde_json::Value::Array(entries).to_string()
}

/// Converts a failed CLI invocation's stderr into a [`CloudError`].
///
/// The CLI reports service errors as
/// `An error occurred (<Code>) when calling the <Op> operation: <message>`.
/// Anything else becomes an uncoded error carrying the trimmed stderr.
pub(super) fn cli_error(stderr: &str, status: Option<i32>) -> CloudError {
    let trimmed = stderr.trim();
    let coded = trimmed.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("An error occurred (")?;
        let (code, tail) = rest.split_once(')')?;
        let message = tail
            .split_once(": ")
            .map_or_else(|| tail.trim(), |(_, message)| message.trim());
        Some(CloudError::coded(code, message))
    });
    coded.unwrap_or_else(|| {
        let status_text = status.map_or_else(|| String::from("unknown"), |code| code.to_string());
        if trimmed.is_empty() {
            CloudError::uncoded(format!("aws exited with status {status_text}"))
        } else {
            CloudError::uncoded(format!("aws exited with status {status_text}: {trimmed}"))
        }
    })
}
