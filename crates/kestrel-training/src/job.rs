//! Training job model and inbound message parsing.
//!
//! The wire format is lenient (every field optional) so that a missing or
//! `null` field is reported as [`JobError::InvalidInput`] with a useful
//! message instead of a bare serde error.

use crate::error::{JobError, JobResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Opaque hyperparameters forwarded to the training engine.
pub type HyperParameters = BTreeMap<String, serde_json::Value>;

/// One annotated region of an image, top-left origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub name: String,
    #[serde(default)]
    pub bounding_boxes: Vec<BoundingBox>,
}

impl ImageRecord {
    /// File name without its extension, used for the label file.
    #[must_use]
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }
}

/// A parsed, validated training request. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingJob {
    pub dataset_id: String,
    pub model_name: String,
    pub authentication: String,
    pub hyper_parameters: HyperParameters,
    pub images: Vec<ImageRecord>,
}

/// The fields needed to correlate an outcome with its request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobIdentity {
    pub dataset_id: String,
    pub model_name: String,
    pub authentication: String,
}

impl TrainingJob {
    #[must_use]
    pub fn identity(&self) -> JobIdentity {
        JobIdentity {
            dataset_id: self.dataset_id.clone(),
            model_name: self.model_name.clone(),
            authentication: self.authentication.clone(),
        }
    }
}

/// Inbound envelope; producer-side fields such as `pattern` are ignored.
#[derive(Debug, Deserialize)]
struct JobEnvelope {
    #[serde(default)]
    data: Option<WireJob>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireJob {
    #[serde(default)]
    dataset_id: Option<String>,
    #[serde(default)]
    model_name: Option<String>,
    #[serde(default, rename = "Authentication")]
    authentication: Option<String>,
    #[serde(default)]
    images: Option<Vec<WireImage>>,
    #[serde(default)]
    hyper_parameters: Option<HyperParameters>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireImage {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    bounding_boxes: Option<Vec<BoundingBox>>,
}

fn required(value: Option<String>, field: &str) -> JobResult<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(JobError::InvalidInput(format!("missing {field} in message"))),
    }
}

/// A name that is safe to use as a single path component.
fn is_plain_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Parse a raw inbound message body into a [`TrainingJob`].
pub fn parse_job(body: &[u8]) -> JobResult<TrainingJob> {
    let envelope: JobEnvelope = serde_json::from_slice(body)?;
    let data = envelope
        .data
        .ok_or_else(|| JobError::InvalidInput("missing data in message".to_string()))?;

    let dataset_id = required(data.dataset_id, "datasetId")?;
    if !is_plain_component(&dataset_id) {
        return Err(JobError::InvalidInput(format!(
            "datasetId is not a valid folder name: {dataset_id}"
        )));
    }
    let model_name = required(data.model_name, "modelName")?;
    let authentication = required(data.authentication, "Authentication")?;

    let wire_images = data
        .images
        .ok_or_else(|| JobError::InvalidInput("no images in message".to_string()))?;
    if wire_images.is_empty() {
        return Err(JobError::InvalidInput("no images in message".to_string()));
    }

    let mut seen = HashSet::new();
    let mut stems = HashSet::new();
    let mut images = Vec::with_capacity(wire_images.len());
    for (idx, image) in wire_images.into_iter().enumerate() {
        let name = match image.name {
            Some(n) if !n.trim().is_empty() => n,
            _ => {
                return Err(JobError::InvalidInput(format!(
                    "no filename in image[{idx}]"
                )));
            }
        };
        if !is_plain_component(&name) {
            return Err(JobError::InvalidInput(format!(
                "image[{idx}] name is not a plain file name: {name}"
            )));
        }
        if !seen.insert(name.clone()) {
            return Err(JobError::InvalidInput(format!(
                "duplicate image name: {name}"
            )));
        }
        let record = ImageRecord {
            name,
            bounding_boxes: image.bounding_boxes.unwrap_or_default(),
        };
        // Label files are keyed by stem, so `a.jpg` and `a.png` would share one.
        if !stems.insert(record.stem().to_string()) {
            return Err(JobError::InvalidInput(format!(
                "image[{idx}] {} shares its label file name with another image",
                record.name
            )));
        }
        images.push(record);
    }

    Ok(TrainingJob {
        dataset_id,
        model_name,
        authentication,
        hyper_parameters: data.hyper_parameters.unwrap_or_default(),
        images,
    })
}

/// Best-effort extraction of correlation fields from a message that may not
/// parse as a valid job. Unreadable fields come back empty.
#[must_use]
pub fn peek_identity(body: &[u8]) -> JobIdentity {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return JobIdentity::default();
    };
    let field = |name: &str| {
        value
            .get("data")
            .and_then(|d| d.get(name))
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    JobIdentity {
        dataset_id: field("datasetId"),
        model_name: field("modelName"),
        authentication: field("Authentication"),
    }
}
