//! Per-job pipeline.
//!
//! A job moves through
//!
//! ```text
//! Received -> Parsed -> WorkspaceReady -> Downloaded -> Trained -> Exported -> Uploaded
//! ```
//!
//! Any state before `Uploaded` may move to `Failed`. Both `Uploaded` and
//! `Failed` lead to the terminal `Published`.
//!
//! Every consumed delivery ends with exactly one published outcome followed by
//! exactly one acknowledgement, whatever stage failed.

use crate::broker::{Broker, Delivery};
use crate::config::WorkerConfig;
use crate::error::TransportResult;
use crate::fetcher::{FetchPlan, fetch_dataset};
use crate::invoker::{export_artifacts, invoke_training};
use crate::publisher::{ModelFile, OutcomeMessage, OutcomeStatus, ResultPublisher};
use crate::storage::StorageService;
use crate::uploader::upload_artifacts;
use kestrel_training::{
    ArtifactKind, JobError, JobIdentity, Trainer, TrainingJob, TrainingRequest, WorkspaceLayout,
    encode_labels, parse_job, partition_images, peek_identity, prepare_workspace,
};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// The fallible steps of a job, named in Failure outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Parse,
    Prepare,
    Download,
    Train,
    Export,
    Upload,
}

impl PipelineStage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Prepare => "prepare",
            Self::Download => "download",
            Self::Train => "train",
            Self::Export => "export",
            Self::Upload => "upload",
        }
    }

    /// Human wording used in outcome messages.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Parse => "parsing input",
            Self::Prepare => "preparing dataset",
            Self::Download => "downloading images",
            Self::Train => "training model",
            Self::Export => "exporting model",
            Self::Upload => "uploading model",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Parsed,
    WorkspaceReady,
    Downloaded,
    Trained,
    Exported,
    Uploaded,
    Failed {
        stage: PipelineStage,
        reason: String,
    },
    Published,
}

impl PipelineState {
    /// Whether moving from `self` to `to` is legal.
    #[must_use]
    pub fn can_transition_to(&self, to: &Self) -> bool {
        match (self, to) {
            (Self::Received, Self::Parsed)
            | (Self::Parsed, Self::WorkspaceReady)
            | (Self::WorkspaceReady, Self::Downloaded)
            | (Self::Downloaded, Self::Trained)
            | (Self::Trained, Self::Exported)
            | (Self::Exported, Self::Uploaded)
            | (Self::Uploaded | Self::Failed { .. }, Self::Published)
            // Any stage before the upload completes can fail.
            | (
                Self::Received
                | Self::Parsed
                | Self::WorkspaceReady
                | Self::Downloaded
                | Self::Trained
                | Self::Exported,
                Self::Failed { .. },
            ) => true,
            _ => false,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Published)
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Parsed => "parsed",
            Self::WorkspaceReady => "workspace_ready",
            Self::Downloaded => "downloaded",
            Self::Trained => "trained",
            Self::Exported => "exported",
            Self::Uploaded => "uploaded",
            Self::Failed { .. } => "failed",
            Self::Published => "published",
        }
    }
}

/// A job error tagged with the stage that raised it.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: PipelineStage,
    pub error: JobError,
}

impl StageFailure {
    fn at(stage: PipelineStage) -> impl FnOnce(JobError) -> Self {
        move |error| Self { stage, error }
    }
}

/// Current state of one job, with traced transitions.
#[derive(Debug)]
struct JobProgress {
    state: PipelineState,
}

impl JobProgress {
    fn new() -> Self {
        Self {
            state: PipelineState::Received,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        if !self.state.can_transition_to(&next) {
            error!(
                from = self.state.name(),
                to = next.name(),
                "Illegal pipeline transition"
            );
        }
        debug!(
            from = self.state.name(),
            to = next.name(),
            "Pipeline transition"
        );
        self.state = next;
    }
}

/// Drives one delivery from raw message to published, acknowledged outcome.
pub struct JobOrchestrator {
    broker: Arc<dyn Broker>,
    storage: Arc<dyn StorageService>,
    trainer: Arc<dyn Trainer>,
    layout: WorkspaceLayout,
    publisher: ResultPublisher,
    download_concurrency: usize,
    export_formats: Vec<ArtifactKind>,
}

impl JobOrchestrator {
    #[must_use]
    pub fn new(
        config: &WorkerConfig,
        broker: Arc<dyn Broker>,
        storage: Arc<dyn StorageService>,
        trainer: Arc<dyn Trainer>,
    ) -> Self {
        Self {
            broker,
            storage,
            trainer,
            layout: WorkspaceLayout::new(&config.workspace.root),
            publisher: ResultPublisher::new(config.broker.response_queue.clone()),
            download_concurrency: config.storage.download_concurrency,
            export_formats: config.engine.export_formats.clone(),
        }
    }

    #[must_use]
    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Process one delivery to completion.
    ///
    /// Job failures become Failure outcomes and are not returned. Only
    /// transport errors (publish or ack) are returned; they are fatal for the
    /// worker.
    pub async fn handle(&self, delivery: &Delivery) -> TransportResult<OutcomeStatus> {
        let hint = peek_identity(&delivery.body);
        let span = info_span!(
            "job",
            dataset_id = %hint.dataset_id,
            delivery_tag = delivery.delivery_tag
        );
        self.handle_inner(delivery).instrument(span).await
    }

    async fn handle_inner(&self, delivery: &Delivery) -> TransportResult<OutcomeStatus> {
        info!(bytes = delivery.body.len(), "Job received");
        let mut progress = JobProgress::new();

        let (outcome, run_dir) = match parse_job(&delivery.body) {
            Ok(job) => {
                progress.advance(PipelineState::Parsed);
                let run_dir = self.layout.run_dir(&job.dataset_id);
                let outcome = match self.run_stages(&job, &run_dir, &mut progress).await {
                    Ok(files) => OutcomeMessage::success(&job.identity(), files),
                    Err(failure) => Self::fail(&mut progress, &job.identity(), &failure),
                };
                (outcome, Some(run_dir))
            }
            Err(error) => {
                let failure = StageFailure {
                    stage: PipelineStage::Parse,
                    error,
                };
                let identity = peek_identity(&delivery.body);
                (Self::fail(&mut progress, &identity, &failure), None)
            }
        };

        let delivered = self.deliver(delivery, &outcome, &mut progress).await;
        if let Some(run_dir) = run_dir {
            remove_scratch(&run_dir).await;
        }
        if let Err(e) = &delivered {
            error!(
                state = progress.state.name(),
                published = progress.state.is_terminal(),
                error = %e,
                "Outcome delivery failed"
            );
        }
        delivered?;

        info!(status = ?outcome.status(), "Job finished");
        Ok(outcome.status())
    }

    /// Publish the outcome, then acknowledge the delivery. The ack is never
    /// sent when the publish fails.
    async fn deliver(
        &self,
        delivery: &Delivery,
        outcome: &OutcomeMessage,
        progress: &mut JobProgress,
    ) -> TransportResult<()> {
        self.publisher
            .publish(self.broker.as_ref(), delivery, outcome)
            .await?;
        progress.advance(PipelineState::Published);

        self.broker.ack(delivery.delivery_tag).await?;
        debug!(
            delivery_tag = delivery.delivery_tag,
            "Delivery acknowledged"
        );
        Ok(())
    }

    fn fail(
        progress: &mut JobProgress,
        identity: &JobIdentity,
        failure: &StageFailure,
    ) -> OutcomeMessage {
        warn!(
            stage = %failure.stage,
            kind = failure.error.kind(),
            error = %failure.error,
            "Job failed"
        );
        progress.advance(PipelineState::Failed {
            stage: failure.stage,
            reason: failure.error.to_string(),
        });
        OutcomeMessage::failure(identity, failure.stage, &failure.error)
    }

    async fn run_stages(
        &self,
        job: &TrainingJob,
        run_dir: &Path,
        progress: &mut JobProgress,
    ) -> Result<Vec<ModelFile>, StageFailure> {
        let storage = self.storage.as_ref();
        let labels = encode_labels(&job.images).map_err(StageFailure::at(PipelineStage::Parse))?;
        let dataset =
            partition_images(&job.images).map_err(StageFailure::at(PipelineStage::Prepare))?;
        let workspace = prepare_workspace(&self.layout, &job.dataset_id, &labels.label_space)
            .map_err(StageFailure::at(PipelineStage::Prepare))?;
        progress.advance(PipelineState::WorkspaceReady);

        let plan = FetchPlan {
            dataset_id: &job.dataset_id,
            credential: &job.authentication,
            dataset: &dataset,
            labels: &labels,
        };
        fetch_dataset(storage, &self.layout, &plan, self.download_concurrency)
            .await
            .map_err(StageFailure::at(PipelineStage::Download))?;
        progress.advance(PipelineState::Downloaded);

        let request = TrainingRequest {
            dataset_id: job.dataset_id.clone(),
            manifest_path: workspace.manifest_path,
            hyper_parameters: job.hyper_parameters.clone(),
            run_dir: run_dir.to_path_buf(),
        };
        let model = invoke_training(self.trainer.as_ref(), &request)
            .await
            .map_err(StageFailure::at(PipelineStage::Train))?;
        progress.advance(PipelineState::Trained);

        let artifacts = export_artifacts(self.trainer.as_ref(), &model, &self.export_formats)
            .await
            .map_err(StageFailure::at(PipelineStage::Export))?;
        progress.advance(PipelineState::Exported);

        let files = upload_artifacts(storage, &job.identity(), &artifacts)
            .await
            .map_err(StageFailure::at(PipelineStage::Upload))?;
        progress.advance(PipelineState::Uploaded);

        Ok(files)
    }
}

/// Remove a job's scratch folder. Failures are logged and otherwise ignored.
async fn remove_scratch(run_dir: &Path) {
    match tokio::fs::remove_dir_all(run_dir).await {
        Ok(()) => debug!(path = %run_dir.display(), "Scratch folder removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            path = %run_dir.display(),
            error = %e,
            "Failed to remove scratch folder"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::PipelineState::{
        Downloaded, Exported, Parsed, Published, Received, Trained, Uploaded,
    };
    use super::*;

    fn failed(stage: PipelineStage) -> PipelineState {
        PipelineState::Failed {
            stage,
            reason: "boom".to_string(),
        }
    }

    #[test]
    fn test_happy_path_transitions_are_legal() {
        let path = [
            Received,
            Parsed,
            PipelineState::WorkspaceReady,
            Downloaded,
            Trained,
            Exported,
            Uploaded,
            Published,
        ];
        for pair in path.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            assert!(from.can_transition_to(to), "{} -> {}", from.name(), to.name());
        }
        assert!(path[7].is_terminal());
        assert!(!Uploaded.is_terminal());
    }

    #[test]
    fn test_failure_transitions() {
        assert!(Received.can_transition_to(&failed(PipelineStage::Parse)));
        assert!(Exported.can_transition_to(&failed(PipelineStage::Upload)));
        let download_failed = failed(PipelineStage::Download);
        assert!(download_failed.can_transition_to(&Published));
        assert!(!download_failed.is_terminal());

        assert!(!Uploaded.can_transition_to(&failed(PipelineStage::Upload)));
        assert!(!Published.can_transition_to(&failed(PipelineStage::Upload)));
        assert!(!failed(PipelineStage::Train).can_transition_to(&Trained));
    }

    #[test]
    fn test_stages_cannot_be_skipped_or_repeated() {
        assert!(!Received.can_transition_to(&Downloaded));
        assert!(!Parsed.can_transition_to(&Published));
        assert!(!Published.can_transition_to(&Published));
        assert!(!Trained.can_transition_to(&Trained));
    }

    #[test]
    fn test_stage_descriptions() {
        assert_eq!(PipelineStage::Download.to_string(), "download");
        assert_eq!(PipelineStage::Parse.description(), "parsing input");
    }
}
