//! Training stage: hands the prepared dataset to the engine and collects the
//! exported artifacts.

use kestrel_training::{
    ArtifactKind, ExportedArtifact, JobError, JobResult, TrainedModel, Trainer, TrainingRequest,
    make_artifact,
};
use std::time::Instant;
use tracing::info;

/// Every failure of the engine is reported as a training failure, whatever
/// the engine classified it as.
fn as_training_error(err: JobError) -> JobError {
    match err {
        JobError::Training(_) => err,
        other => JobError::Training(other.to_string()),
    }
}

/// Run one training to completion. Not retried and not time-limited.
pub async fn invoke_training(
    trainer: &dyn Trainer,
    request: &TrainingRequest,
) -> JobResult<TrainedModel> {
    let run_dir = &request.run_dir;
    tokio::fs::create_dir_all(run_dir).await.map_err(|e| {
        JobError::Training(format!("cannot create run folder {}: {e}", run_dir.display()))
    })?;

    let started = Instant::now();
    info!(
        dataset_id = %request.dataset_id,
        engine = trainer.id(),
        run_dir = %run_dir.display(),
        "Invoking training engine"
    );
    let model = trainer.train(request).await.map_err(as_training_error)?;
    info!(
        dataset_id = %request.dataset_id,
        elapsed_secs = started.elapsed().as_secs(),
        "Training engine finished"
    );
    Ok(model)
}

/// Export `model` to each of `kinds`, in order, and fingerprint the files.
pub async fn export_artifacts(
    trainer: &dyn Trainer,
    model: &TrainedModel,
    kinds: &[ArtifactKind],
) -> JobResult<Vec<ExportedArtifact>> {
    let mut artifacts = Vec::with_capacity(kinds.len());
    for &kind in kinds {
        let path = trainer.export(model, kind).await.map_err(as_training_error)?;
        let artifact = make_artifact(kind, path).map_err(as_training_error)?;
        info!(
            kind = %artifact.kind,
            path = %artifact.path.display(),
            sha256 = %artifact.sha256,
            "Model exported"
        );
        artifacts.push(artifact);
    }
    Ok(artifacts)
}
