//! Kestrel Orchestrator
//!
//! Runs training jobs end to end:
//! - Pulls job messages from the broker (`Broker`, `AmqpBroker`)
//! - Downloads images from and uploads models to the storage service
//! - Drives the per-job pipeline and publishes exactly one outcome per job
//! - Loads and validates the worker configuration

pub mod broker;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod invoker;
pub mod orchestrator;
pub mod publisher;
pub mod storage;
pub mod uploader;
pub mod worker;

pub use broker::{AmqpBroker, Broker, Delivery};
pub use config::{BrokerConfig, EngineConfig, StorageConfig, WorkerConfig, WorkspaceConfig};
pub use error::{ConfigError, StorageError, TransportError, TransportResult};
pub use orchestrator::{JobOrchestrator, PipelineStage, PipelineState, StageFailure};
pub use publisher::{ModelFile, OutcomeData, OutcomeMessage, OutcomeStatus, ResultPublisher};
pub use storage::{HttpStorageClient, StorageService};
pub use worker::Worker;
