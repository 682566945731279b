use crate::error::{JobError, JobResult};
use crate::partition::DatasetPartition;
use std::path::{Path, PathBuf};

pub const DATASETS_DIR: &str = "datasets";
pub const TRAININGS_DIR: &str = "trainings";
pub const RUNS_DIR: &str = "runs";
pub const MANIFEST_EXTENSION: &str = "yaml";

/// Filesystem layout of a worker's workspace root.
///
/// ```text
/// <root>/datasets/<dataset_id>/{images,labels}/{train,test,valid}/
/// <root>/trainings/<dataset_id>/<dataset_id>.yaml
/// <root>/runs/<dataset_id>/          (scratch, erased after every job)
/// ```
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn datasets_root(&self) -> PathBuf {
        self.root.join(DATASETS_DIR)
    }

    #[must_use]
    pub fn trainings_root(&self) -> PathBuf {
        self.root.join(TRAININGS_DIR)
    }

    #[must_use]
    pub fn runs_root(&self) -> PathBuf {
        self.root.join(RUNS_DIR)
    }

    #[must_use]
    pub fn dataset_dir(&self, dataset_id: &str) -> PathBuf {
        self.datasets_root().join(dataset_id)
    }

    #[must_use]
    pub fn images_dir(&self, dataset_id: &str) -> PathBuf {
        self.dataset_dir(dataset_id).join("images")
    }

    #[must_use]
    pub fn labels_dir(&self, dataset_id: &str) -> PathBuf {
        self.dataset_dir(dataset_id).join("labels")
    }

    #[must_use]
    pub fn partition_images_dir(&self, dataset_id: &str, partition: DatasetPartition) -> PathBuf {
        self.images_dir(dataset_id).join(partition.as_str())
    }

    #[must_use]
    pub fn partition_labels_dir(&self, dataset_id: &str, partition: DatasetPartition) -> PathBuf {
        self.labels_dir(dataset_id).join(partition.as_str())
    }

    #[must_use]
    pub fn training_dir(&self, dataset_id: &str) -> PathBuf {
        self.trainings_root().join(dataset_id)
    }

    #[must_use]
    pub fn manifest_path(&self, dataset_id: &str) -> PathBuf {
        self.training_dir(dataset_id)
            .join(format!("{dataset_id}.{MANIFEST_EXTENSION}"))
    }

    /// Scratch output folder handed to the training engine.
    #[must_use]
    pub fn run_dir(&self, dataset_id: &str) -> PathBuf {
        self.runs_root().join(dataset_id)
    }

    /// Every folder a dataset needs, parents before children.
    #[must_use]
    pub fn dataset_folders(&self, dataset_id: &str) -> Vec<PathBuf> {
        let mut folders = vec![
            self.dataset_dir(dataset_id),
            self.images_dir(dataset_id),
            self.labels_dir(dataset_id),
            self.training_dir(dataset_id),
        ];
        for partition in DatasetPartition::ALL {
            folders.push(self.partition_images_dir(dataset_id, partition));
            folders.push(self.partition_labels_dir(dataset_id, partition));
        }
        folders
    }

    /// Ensure the three top-level roots exist. Run once at worker startup.
    pub fn prepare_roots(&self) -> JobResult<()> {
        for dir in [
            self.datasets_root(),
            self.trainings_root(),
            self.runs_root(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| JobError::filesystem(&dir, e))?;
        }
        Ok(())
    }
}
