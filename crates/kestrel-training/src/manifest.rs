//! The declarative dataset manifest consumed by the training engine.

use crate::error::{JobError, JobResult};
use crate::labels::LabelSpace;
use crate::partition::DatasetPartition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetManifest {
    /// Dataset root; the partition paths below are relative to it.
    pub path: PathBuf,
    pub train: String,
    pub val: String,
    pub test: String,
    pub names: BTreeMap<u32, String>,
}

fn images_rel(partition: DatasetPartition) -> String {
    format!("images/{partition}")
}

impl DatasetManifest {
    #[must_use]
    pub fn new(dataset_root: PathBuf, labels: &LabelSpace) -> Self {
        Self {
            path: dataset_root,
            train: images_rel(DatasetPartition::Train),
            val: images_rel(DatasetPartition::Valid),
            test: images_rel(DatasetPartition::Test),
            names: labels.to_names(),
        }
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn write(&self, path: &Path) -> JobResult<()> {
        let yaml = self.to_yaml().map_err(std::io::Error::other);
        let yaml = yaml.map_err(|e| JobError::filesystem(path, e))?;
        std::fs::write(path, yaml).map_err(|e| JobError::filesystem(path, e))
    }

    pub fn read(path: &Path) -> JobResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| JobError::filesystem(path, e))?;
        serde_yaml::from_str(&content).map_err(|e| {
            JobError::Training(format!("unreadable manifest {}: {e}", path.display()))
        })
    }
}
