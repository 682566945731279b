//! Kestrel Training
//!
//! Dataset-side primitives of the training pipeline:
//! - Parsing and validating training jobs (`TrainingJob`)
//! - Encoding labels and partitioning images
//! - Laying out dataset workspaces and writing the training manifest
//! - The `Trainer` engine boundary and its command-line implementation

pub mod artifacts;
pub mod command;
pub mod error;
pub mod job;
pub mod labels;
pub mod layout;
pub mod manifest;
pub mod partition;
pub mod trainer;
pub mod workspace;

pub use artifacts::{ArtifactKind, ExportedArtifact, make_artifact};
pub use command::CommandTrainer;
pub use error::{JobError, JobResult};
pub use job::{
    BoundingBox, HyperParameters, ImageRecord, JobIdentity, TrainingJob, parse_job, peek_identity,
};
pub use labels::{LabelEncoding, LabelSpace, encode_labels};
pub use layout::WorkspaceLayout;
pub use manifest::DatasetManifest;
pub use partition::{DatasetPartition, PartitionedDataset, SplitBounds, partition_images};
pub use trainer::{TrainedModel, Trainer, TrainingRequest};
pub use workspace::{PreparedWorkspace, prepare_workspace};
