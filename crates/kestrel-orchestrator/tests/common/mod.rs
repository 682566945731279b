//! Shared test doubles for the orchestrator integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use kestrel_orchestrator::error::{StorageError, StorageResult};
use kestrel_orchestrator::{
    Broker, Delivery, JobOrchestrator, OutcomeStatus, StorageService, TransportError,
    TransportResult, WorkerConfig,
};
use kestrel_training::{ArtifactKind, JobError, JobResult, TrainedModel, Trainer, TrainingRequest};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One message handed to [`RecordingBroker::publish`].
#[derive(Debug, Clone)]
pub struct Published {
    pub queue: String,
    pub payload: Value,
    pub correlation_id: Option<String>,
}

/// In-memory broker that records publishes and acks in order.
#[derive(Default)]
pub struct RecordingBroker {
    pub pending: Mutex<VecDeque<Delivery>>,
    pub published: Mutex<Vec<Published>>,
    pub acks: Mutex<Vec<u64>>,
    pub events: Mutex<Vec<String>>,
    pub fail_publish: bool,
    pub fail_ack: bool,
}

impl RecordingBroker {
    pub fn with_deliveries(deliveries: Vec<Delivery>) -> Self {
        Self {
            pending: Mutex::new(deliveries.into()),
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn acks(&self) -> Vec<u64> {
        self.acks.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// The only published outcome; panics unless exactly one was published.
    pub fn single_outcome(&self) -> Value {
        let published = self.published();
        assert_eq!(
            published.len(),
            1,
            "expected exactly one publish, got {published:?}"
        );
        published[0].payload.clone()
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn next_delivery(&self) -> TransportResult<Option<Delivery>> {
        Ok(self.pending.lock().unwrap().pop_front())
    }

    async fn publish(
        &self,
        queue: &str,
        payload: &[u8],
        correlation_id: Option<&str>,
    ) -> TransportResult<()> {
        self.events.lock().unwrap().push(format!("publish:{queue}"));
        if self.fail_publish {
            return Err(TransportError::Publish {
                queue: queue.to_string(),
                reason: "channel closed".to_string(),
            });
        }
        self.published.lock().unwrap().push(Published {
            queue: queue.to_string(),
            payload: serde_json::from_slice(payload).unwrap(),
            correlation_id: correlation_id.map(str::to_string),
        });
        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> TransportResult<()> {
        self.events.lock().unwrap().push(format!("ack:{delivery_tag}"));
        if self.fail_ack {
            return Err(TransportError::Ack {
                delivery_tag,
                reason: "channel closed".to_string(),
            });
        }
        self.acks.lock().unwrap().push(delivery_tag);
        Ok(())
    }
}

/// Storage double serving generated image bytes and recording uploads.
#[derive(Default)]
pub struct ScriptedStorage {
    pub fail_image: Option<String>,
    /// Zero-based index of the upload call that fails.
    pub fail_upload_at: Option<usize>,
    pub fetched: Mutex<Vec<String>>,
    pub uploads: Mutex<Vec<String>>,
}

impl ScriptedStorage {
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageService for ScriptedStorage {
    async fn fetch_image(
        &self,
        dataset_id: &str,
        image_name: &str,
        credential: &str,
    ) -> StorageResult<Vec<u8>> {
        self.fetched.lock().unwrap().push(image_name.to_string());
        if self.fail_image.as_deref() == Some(image_name) {
            return Err(StorageError::Status {
                url: format!("http://storage/image/{dataset_id}/{image_name}"),
                status: 404,
                body: "Not Found".to_string(),
            });
        }
        Ok(format!("{credential}:{image_name}").into_bytes())
    }

    async fn upload_model(
        &self,
        dataset_id: &str,
        file_name: &str,
        path: &Path,
        _credential: &str,
    ) -> StorageResult<String> {
        let index = {
            let mut uploads = self.uploads.lock().unwrap();
            uploads.push(file_name.to_string());
            uploads.len() - 1
        };
        assert!(path.is_file(), "uploading missing file {}", path.display());
        if self.fail_upload_at == Some(index) {
            return Err(StorageError::Status {
                url: format!("http://storage/upload/model/{dataset_id}"),
                status: 500,
                body: "disk full".to_string(),
            });
        }
        Ok(format!("http://storage/model/{dataset_id}/{file_name}"))
    }
}

/// Trainer double writing small files where a real engine would.
#[derive(Default)]
pub struct ScriptedTrainer {
    pub fail_train: bool,
    pub fail_export: Option<ArtifactKind>,
    /// Replace the run folder with a plain file so it cannot be removed.
    pub poison_run_dir: bool,
    pub requests: Mutex<Vec<TrainingRequest>>,
}

impl ScriptedTrainer {
    pub fn requests(&self) -> Vec<TrainingRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Trainer for ScriptedTrainer {
    fn id(&self) -> &'static str {
        "scripted"
    }

    async fn train(&self, request: &TrainingRequest) -> JobResult<TrainedModel> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_train {
            return Err(JobError::Training("CUDA out of memory".to_string()));
        }
        assert!(
            request.manifest_path.is_file(),
            "manifest not written before training"
        );

        let weights_dir = if self.poison_run_dir {
            std::fs::remove_dir_all(&request.run_dir).unwrap();
            std::fs::write(&request.run_dir, b"not a folder").unwrap();
            request.run_dir.with_extension("weights")
        } else {
            request.run_dir.join("weights")
        };
        std::fs::create_dir_all(&weights_dir).unwrap();
        let weights = weights_dir.join("best.pt");
        std::fs::write(&weights, b"weights").unwrap();
        Ok(TrainedModel { weights })
    }

    async fn export(&self, model: &TrainedModel, kind: ArtifactKind) -> JobResult<PathBuf> {
        if self.fail_export == Some(kind) {
            return Err(JobError::Training(format!("{kind} export crashed")));
        }
        let path = model.weights.with_extension(kind.extension());
        std::fs::write(&path, kind.as_str()).unwrap();
        Ok(path)
    }
}

/// A job message with `count` images named `img_000.jpg`, ...
pub fn job_body(dataset_id: &str, count: usize) -> Vec<u8> {
    let images: Vec<Value> = (0..count)
        .map(|i| {
            let label = if i % 2 == 0 { "mask" } else { "no_mask" };
            json!({
                "name": format!("img_{i:03}.jpg"),
                "boundingBoxes": [
                    {"label": label, "x": 0.1, "y": 0.2, "width": 0.3, "height": 0.4}
                ]
            })
        })
        .collect();
    serde_json::to_vec(&json!({
        "pattern": "train_model",
        "data": {
            "datasetId": dataset_id,
            "modelName": "masks",
            "Authentication": "tok",
            "hyperParameters": {"epochs": 2},
            "images": images
        }
    }))
    .unwrap()
}

pub fn delivery(tag: u64, body: Vec<u8>) -> Delivery {
    Delivery {
        body,
        delivery_tag: tag,
        correlation_id: Some(format!("corr-{tag}")),
        reply_to: None,
    }
}

pub fn test_config(root: &Path) -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.workspace.root = root.to_path_buf();
    config.storage.download_concurrency = 3;
    config
}

pub struct Harness {
    pub broker: Arc<RecordingBroker>,
    pub storage: Arc<ScriptedStorage>,
    pub trainer: Arc<ScriptedTrainer>,
    pub orchestrator: JobOrchestrator,
}

impl Harness {
    pub fn new(
        root: &Path,
        broker: RecordingBroker,
        storage: ScriptedStorage,
        trainer: ScriptedTrainer,
    ) -> Self {
        let broker = Arc::new(broker);
        let storage = Arc::new(storage);
        let trainer = Arc::new(trainer);
        let orchestrator = JobOrchestrator::new(
            &test_config(root),
            broker.clone(),
            storage.clone(),
            trainer.clone(),
        );
        Self {
            broker,
            storage,
            trainer,
            orchestrator,
        }
    }

    pub fn with_defaults(root: &Path) -> Self {
        Self::new(
            root,
            RecordingBroker::default(),
            ScriptedStorage::default(),
            ScriptedTrainer::default(),
        )
    }

    pub fn with_broker(root: &Path, broker: RecordingBroker) -> Self {
        Self::new(
            root,
            broker,
            ScriptedStorage::default(),
            ScriptedTrainer::default(),
        )
    }

    pub fn with_storage(root: &Path, storage: ScriptedStorage) -> Self {
        Self::new(
            root,
            RecordingBroker::default(),
            storage,
            ScriptedTrainer::default(),
        )
    }

    pub fn with_trainer(root: &Path, trainer: ScriptedTrainer) -> Self {
        Self::new(
            root,
            RecordingBroker::default(),
            ScriptedStorage::default(),
            trainer,
        )
    }

    /// Handle one delivery carrying `body` under `tag`.
    pub async fn run(&self, tag: u64, body: Vec<u8>) -> TransportResult<OutcomeStatus> {
        self.orchestrator.handle(&delivery(tag, body)).await
    }
}
