//! Training engine backed by an external command-line trainer.
//!
//! The command follows the YOLO CLI conventions:
//!
//! ```text
//! <program> train data=<manifest> model=<base> project=<runs> name=<id> \
//!     exist_ok=True [k=v ...]
//! <program> export model=<weights> format=<format>
//! ```
//!
//! Weights land in `<runs>/<id>/weights/best.pt` and each export is written
//! next to them with the format's extension.

use crate::artifacts::ArtifactKind;
use crate::error::{JobError, JobResult};
use crate::job::HyperParameters;
use crate::manifest::DatasetManifest;
use crate::trainer::{TrainedModel, Trainer, TrainingRequest};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, info};

const RESERVED_ARGS: [&str; 5] = ["data", "model", "project", "name", "exist_ok"];
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct CommandTrainer {
    program: PathBuf,
    /// Arguments placed before the subcommand, e.g. `-m ultralytics`.
    leading_args: Vec<String>,
    base_model: String,
}

impl CommandTrainer {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, base_model: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            base_model: base_model.into(),
        }
    }

    #[must_use]
    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    #[must_use]
    pub fn weights_path(run_dir: &Path) -> PathBuf {
        run_dir.join("weights").join("best.pt")
    }

    fn train_args(&self, request: &TrainingRequest) -> JobResult<Vec<String>> {
        let run_dir = &request.run_dir;
        let project = run_dir.parent().ok_or_else(|| {
            JobError::Training(format!("run folder has no parent: {}", run_dir.display()))
        })?;
        let name = run_dir
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                JobError::Training(format!("run folder has no name: {}", run_dir.display()))
            })?;

        let mut args = vec![
            "train".to_string(),
            format!("data={}", request.manifest_path.display()),
            format!("model={}", self.base_model),
            format!("project={}", project.display()),
            format!("name={name}"),
            "exist_ok=True".to_string(),
        ];
        args.extend(hyper_parameter_args(&request.hyper_parameters)?);
        Ok(args)
    }

    async fn run(&self, args: &[String]) -> JobResult<Output> {
        debug!(program = %self.program.display(), ?args, "Running training command");
        let output = Command::new(&self.program)
            .args(&self.leading_args)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                JobError::Training(format!("failed to start {}: {e}", self.program.display()))
            })?;

        if !output.status.success() {
            return Err(JobError::Training(format!(
                "{} {} exited with {}: {}",
                self.program.display(),
                args.first().map_or("", String::as_str),
                output.status,
                stderr_tail(&output.stderr)
            )));
        }
        Ok(output)
    }
}

/// Render hyperparameters as `key=value` arguments.
pub fn hyper_parameter_args(params: &HyperParameters) -> JobResult<Vec<String>> {
    params
        .iter()
        .map(|(key, value)| {
            if key.is_empty() || key.contains('=') || key.chars().any(char::is_whitespace) {
                return Err(JobError::Training(format!(
                    "hyperparameter name cannot be forwarded: {key:?}"
                )));
            }
            if RESERVED_ARGS.contains(&key.as_str()) {
                return Err(JobError::Training(format!(
                    "hyperparameter {key} is set by the worker"
                )));
            }
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Bool(true) => "True".to_string(),
                serde_json::Value::Bool(false) => "False".to_string(),
                serde_json::Value::Null => "None".to_string(),
                other => other.to_string(),
            };
            Ok(format!("{key}={rendered}"))
        })
        .collect()
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[async_trait]
impl Trainer for CommandTrainer {
    fn id(&self) -> &'static str {
        "command"
    }

    async fn train(&self, request: &TrainingRequest) -> JobResult<TrainedModel> {
        let args = self.train_args(request)?;
        let manifest = DatasetManifest::read(&request.manifest_path)?;
        info!(
            dataset_id = %request.dataset_id,
            base_model = %self.base_model,
            classes = manifest.names.len(),
            "Training started"
        );
        self.run(&args).await?;

        let weights = Self::weights_path(&request.run_dir);
        if !weights.is_file() {
            return Err(JobError::Training(format!(
                "training produced no weights at {}",
                weights.display()
            )));
        }
        info!(
            dataset_id = %request.dataset_id,
            weights = %weights.display(),
            "Training finished"
        );
        Ok(TrainedModel { weights })
    }

    async fn export(&self, model: &TrainedModel, kind: ArtifactKind) -> JobResult<PathBuf> {
        if kind == ArtifactKind::Pytorch {
            return Ok(model.weights.clone());
        }

        let args = vec![
            "export".to_string(),
            format!("model={}", model.weights.display()),
            format!("format={}", kind.as_str()),
        ];
        self.run(&args).await?;

        let exported = model.weights.with_extension(kind.extension());
        if !exported.is_file() {
            return Err(JobError::Training(format!(
                "{kind} export produced no file at {}",
                exported.display()
            )));
        }
        Ok(exported)
    }
}
