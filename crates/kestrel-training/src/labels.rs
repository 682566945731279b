//! Label encoding: free-text labels to a dense, job-scoped id space, and
//! bounding boxes to center-origin annotation lines.

use crate::error::{JobError, JobResult};
use crate::job::{BoundingBox, ImageRecord};
use std::collections::{BTreeMap, HashMap};

/// Label text to integer id, assigned in first-seen order from 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSpace {
    ids: HashMap<String, u32>,
    names: Vec<String>,
}

impl LabelSpace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id of `label`, assigning the next free id on first sight.
    pub fn intern(&mut self, label: &str) -> u32 {
        if let Some(id) = self.ids.get(label) {
            return *id;
        }
        let id = self.names.len() as u32;
        self.ids.insert(label.to_string(), id);
        self.names.push(label.to_string());
        id
    }

    #[must_use]
    pub fn id_of(&self, label: &str) -> Option<u32> {
        self.ids.get(label).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// `(id, label)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(id, name)| (id as u32, name.as_str()))
    }

    /// Id-ordered listing as written to the training manifest.
    #[must_use]
    pub fn to_names(&self) -> BTreeMap<u32, String> {
        self.iter()
            .map(|(id, name)| (id, name.to_string()))
            .collect()
    }
}

/// Result of encoding one job's annotations.
#[derive(Debug, Clone, Default)]
pub struct LabelEncoding {
    pub label_space: LabelSpace,
    lines: HashMap<String, Vec<String>>,
}

impl LabelEncoding {
    /// Encoded annotation lines for an image; empty for unknown images or
    /// images without boxes.
    #[must_use]
    pub fn lines_for(&self, image_name: &str) -> &[String] {
        self.lines.get(image_name).map_or(&[], Vec::as_slice)
    }

    /// Contents of the label file for an image: one newline-terminated line
    /// per box.
    #[must_use]
    pub fn label_file_contents(&self, image_name: &str) -> String {
        let mut out = String::new();
        for line in self.lines_for(image_name) {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// `<id> <center_x> <center_y> <width> <height>`
#[must_use]
pub fn encode_box(label_id: u32, bbox: &BoundingBox) -> String {
    let center_x = bbox.x + bbox.width / 2.0;
    let center_y = bbox.y + bbox.height / 2.0;
    format!(
        "{label_id} {center_x} {center_y} {} {}",
        bbox.width, bbox.height
    )
}

/// Encode every image's boxes, building the label space as a side effect.
/// Iteration order is image order then box order, which fixes the class
/// index contract of the exported model.
pub fn encode_labels(images: &[ImageRecord]) -> JobResult<LabelEncoding> {
    if images.is_empty() {
        return Err(JobError::InvalidInput("job has no images".to_string()));
    }

    let mut encoding = LabelEncoding::default();
    for (idx, image) in images.iter().enumerate() {
        if image.name.trim().is_empty() {
            return Err(JobError::InvalidInput(format!("image[{idx}] has no name")));
        }
        let lines = image
            .bounding_boxes
            .iter()
            .map(|bbox| {
                let id = encoding.label_space.intern(&bbox.label);
                encode_box(id, bbox)
            })
            .collect();
        encoding.lines.insert(image.name.clone(), lines);
    }

    Ok(encoding)
}
