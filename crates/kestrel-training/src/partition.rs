//! Deterministic 80/10/10 prefix split of a job's images.

use crate::error::{JobError, JobResult};
use crate::job::ImageRecord;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetPartition {
    Train,
    Test,
    Valid,
}

impl DatasetPartition {
    pub const ALL: [Self; 3] = [Self::Train, Self::Test, Self::Valid];

    /// Folder name used under `images/` and `labels/`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Test => "test",
            Self::Valid => "valid",
        }
    }
}

impl fmt::Display for DatasetPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open index ranges of the three partitions over an input of `len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitBounds {
    pub len: usize,
    pub train_end: usize,
    pub test_end: usize,
}

impl SplitBounds {
    /// `train_end = floor(0.8 * len)`, `test_end = floor(0.9 * len)`.
    ///
    /// Integer arithmetic gives the exact floor, matching truncation of the
    /// float products for every `len`.
    #[must_use]
    pub fn for_len(len: usize) -> Self {
        Self {
            len,
            train_end: len * 8 / 10,
            test_end: len * 9 / 10,
        }
    }

    #[must_use]
    pub fn range(&self, partition: DatasetPartition) -> std::ops::Range<usize> {
        match partition {
            DatasetPartition::Train => 0..self.train_end,
            DatasetPartition::Test => self.train_end..self.test_end,
            DatasetPartition::Valid => self.test_end..self.len,
        }
    }

    /// Fails with [`JobError::InsufficientData`] naming the first empty
    /// partition.
    pub fn validate(&self) -> JobResult<()> {
        for partition in DatasetPartition::ALL {
            if self.range(partition).is_empty() {
                return Err(JobError::InsufficientData(format!(
                    "not enough images for partition {partition} ({} images in job)",
                    self.len
                )));
            }
        }
        Ok(())
    }
}

/// A job's images split into train/test/valid, borrowing the job.
#[derive(Debug, Clone)]
pub struct PartitionedDataset<'a> {
    train: &'a [ImageRecord],
    test: &'a [ImageRecord],
    valid: &'a [ImageRecord],
}

impl<'a> PartitionedDataset<'a> {
    #[must_use]
    pub fn get(&self, partition: DatasetPartition) -> &'a [ImageRecord] {
        match partition {
            DatasetPartition::Train => self.train,
            DatasetPartition::Test => self.test,
            DatasetPartition::Valid => self.valid,
        }
    }

    /// `(partition, image)` pairs in partition order then input order.
    pub fn iter(&self) -> impl Iterator<Item = (DatasetPartition, &'a ImageRecord)> + '_ {
        DatasetPartition::ALL
            .into_iter()
            .flat_map(move |p| self.get(p).iter().map(move |image| (p, image)))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.train.len() + self.test.len() + self.valid.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split `images` into the three partitions, rejecting empty ones.
pub fn partition_images(images: &[ImageRecord]) -> JobResult<PartitionedDataset<'_>> {
    let bounds = SplitBounds::for_len(images.len());
    bounds.validate()?;
    Ok(PartitionedDataset {
        train: &images[bounds.range(DatasetPartition::Train)],
        test: &images[bounds.range(DatasetPartition::Test)],
        valid: &images[bounds.range(DatasetPartition::Valid)],
    })
}
