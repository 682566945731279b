use crate::error::{JobError, JobResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Export formats of a trained model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Native weights.
    Pytorch,
    /// Portable inference format.
    Torchscript,
    /// Interchange format.
    Onnx,
}

impl ArtifactKind {
    pub const ALL: [Self; 3] = [Self::Pytorch, Self::Torchscript, Self::Onnx];

    /// Name used as `modelType` in outcome messages and as the engine's
    /// export format argument.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pytorch => "pytorch",
            Self::Torchscript => "torchscript",
            Self::Onnx => "onnx",
        }
    }

    /// Natural file extension, without the dot.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Pytorch => "pt",
            Self::Torchscript => "torchscript",
            Self::Onnx => "onnx",
        }
    }

    /// Name under which the artifact is uploaded, e.g. `masks.onnx`.
    #[must_use]
    pub fn upload_file_name(self, model_name: &str) -> String {
        format!("{model_name}.{}", self.extension())
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pytorch" | "pt" => Ok(Self::Pytorch),
            "torchscript" => Ok(Self::Torchscript),
            "onnx" => Ok(Self::Onnx),
            other => Err(format!("unknown artifact kind: {other}")),
        }
    }
}

/// A file produced by an export, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

pub fn sha256_file(path: &Path) -> JobResult<String> {
    let bytes = std::fs::read(path).map_err(|e| JobError::filesystem(path, e))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub fn make_artifact(kind: ArtifactKind, path: PathBuf) -> JobResult<ExportedArtifact> {
    if !path.is_file() {
        return Err(JobError::Training(format!(
            "{kind} export did not produce a file at {}",
            path.display()
        )));
    }

    let sha256 = sha256_file(&path)?;
    Ok(ExportedArtifact { kind, path, sha256 })
}
