use crate::artifacts::ArtifactKind;
use crate::error::JobResult;
use crate::job::HyperParameters;
use async_trait::async_trait;
use std::path::PathBuf;

/// Everything a training engine gets to see of a job.
#[derive(Debug, Clone)]
pub struct TrainingRequest {
    pub dataset_id: String,
    pub manifest_path: PathBuf,
    pub hyper_parameters: HyperParameters,
    /// Scratch folder the engine writes its run output into.
    pub run_dir: PathBuf,
}

/// Handle to a finished training run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainedModel {
    /// Native weights produced by the run.
    pub weights: PathBuf,
}

/// An opaque training engine. Errors are reported as
/// [`crate::JobError::Training`] and are never retried by the caller.
#[async_trait]
pub trait Trainer: Send + Sync {
    fn id(&self) -> &'static str;

    async fn train(&self, request: &TrainingRequest) -> JobResult<TrainedModel>;

    /// Export `model` to `kind`, returning the produced file.
    async fn export(&self, model: &TrainedModel, kind: ArtifactKind) -> JobResult<PathBuf>;
}
