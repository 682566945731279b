//! Outcome messages and their delivery to the response queue.

use crate::broker::{Broker, Delivery};
use crate::error::TransportResult;
use crate::orchestrator::PipelineStage;
use kestrel_training::{ArtifactKind, JobError, JobIdentity};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Message pattern the dataset service subscribes to.
pub const OUTCOME_PATTERN: &str = "model_trained";

pub const SUCCESS_MESSAGE: &str = "Model trained and uploaded";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Uploaded,
    Failed,
}

/// One uploaded model file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFile {
    pub url: String,
    pub model_type: ArtifactKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeData {
    pub status: OutcomeStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_files: Option<Vec<ModelFile>>,
    pub model_name: String,
    pub dataset_id: String,
    #[serde(rename = "Authentication")]
    pub authentication: String,
}

/// The single message published for every consumed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeMessage {
    pub pattern: String,
    pub data: OutcomeData,
}

impl OutcomeMessage {
    #[must_use]
    pub fn success(identity: &JobIdentity, model_files: Vec<ModelFile>) -> Self {
        Self::new(
            identity,
            OutcomeStatus::Uploaded,
            SUCCESS_MESSAGE.to_string(),
            Some(model_files),
        )
    }

    /// Failure outcome; the message names the stage that failed.
    #[must_use]
    pub fn failure(identity: &JobIdentity, stage: PipelineStage, error: &JobError) -> Self {
        let message = format!("Error in {}: {error}", stage.description());
        Self::new(identity, OutcomeStatus::Failed, message, None)
    }

    fn new(
        identity: &JobIdentity,
        status: OutcomeStatus,
        message: String,
        model_files: Option<Vec<ModelFile>>,
    ) -> Self {
        Self {
            pattern: OUTCOME_PATTERN.to_string(),
            data: OutcomeData {
                status,
                message,
                model_files,
                model_name: identity.model_name.clone(),
                dataset_id: identity.dataset_id.clone(),
                authentication: identity.authentication.clone(),
            },
        }
    }

    #[must_use]
    pub fn status(&self) -> OutcomeStatus {
        self.data.status
    }
}

/// Publishes outcomes as persistent messages and waits for the broker to
/// confirm them.
#[derive(Debug, Clone)]
pub struct ResultPublisher {
    response_queue: String,
}

impl ResultPublisher {
    #[must_use]
    pub fn new(response_queue: impl Into<String>) -> Self {
        Self {
            response_queue: response_queue.into(),
        }
    }

    /// Queue the outcome for `delivery` goes to: the requester's `reply_to`
    /// when set, otherwise the configured response queue.
    #[must_use]
    pub fn target_queue<'a>(&'a self, delivery: &'a Delivery) -> &'a str {
        delivery
            .reply_to
            .as_deref()
            .filter(|q| !q.is_empty())
            .unwrap_or(&self.response_queue)
    }

    pub async fn publish(
        &self,
        broker: &dyn Broker,
        delivery: &Delivery,
        outcome: &OutcomeMessage,
    ) -> TransportResult<()> {
        let payload = serde_json::to_vec(outcome)?;
        let queue = self.target_queue(delivery);
        let correlation_id = delivery.correlation_id.as_deref();
        broker.publish(queue, &payload, correlation_id).await?;
        info!(
            queue,
            status = ?outcome.status(),
            message = %outcome.data.message,
            "Outcome published"
        );
        Ok(())
    }
}
