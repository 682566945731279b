//! Creates or resets a dataset's folder tree and writes its manifest.

use crate::error::{JobError, JobResult};
use crate::labels::LabelSpace;
use crate::layout::WorkspaceLayout;
use crate::manifest::DatasetManifest;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A dataset workspace ready to receive images.
#[derive(Debug, Clone)]
pub struct PreparedWorkspace {
    pub dataset_id: String,
    pub dataset_dir: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: DatasetManifest,
}

/// Create `path` if needed, then delete its direct file entries.
/// Nested folders are left untouched.
pub fn reset_dir(path: &Path) -> JobResult<()> {
    std::fs::create_dir_all(path).map_err(|e| JobError::filesystem(path, e))?;

    let entries = std::fs::read_dir(path).map_err(|e| JobError::filesystem(path, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| JobError::filesystem(path, e))?;
        let file_type = entry.file_type().map_err(|e| JobError::filesystem(entry.path(), e))?;
        if file_type.is_dir() {
            continue;
        }
        let file = entry.path();
        std::fs::remove_file(&file).map_err(|e| JobError::filesystem(&file, e))?;
    }
    Ok(())
}

/// Build (or rebuild) the workspace for `dataset_id`.
///
/// Folders are created parents-first from an explicit list; on failure the
/// already-created prefix stays on disk for diagnosis.
pub fn prepare_workspace(
    layout: &WorkspaceLayout,
    dataset_id: &str,
    labels: &LabelSpace,
) -> JobResult<PreparedWorkspace> {
    let folders = layout.dataset_folders(dataset_id);

    for (idx, folder) in folders.iter().enumerate() {
        if let Err(e) = reset_dir(folder) {
            warn!(
                dataset_id = %dataset_id,
                created = idx,
                total = folders.len(),
                error = %e,
                "Workspace preparation stopped part way"
            );
            return Err(e);
        }
    }
    debug!(dataset_id = %dataset_id, "Workspace tree:\n{}", render_tree(layout.root(), &folders));

    // The engine may run from another working directory.
    let dataset_dir = layout.dataset_dir(dataset_id);
    let dataset_dir =
        std::fs::canonicalize(&dataset_dir).map_err(|e| JobError::filesystem(&dataset_dir, e))?;
    let manifest_path = layout.manifest_path(dataset_id);
    let manifest = DatasetManifest::new(dataset_dir.clone(), labels);
    manifest.write(&manifest_path)?;
    debug!(path = %manifest_path.display(), labels = labels.len(), "Manifest written");

    Ok(PreparedWorkspace {
        dataset_id: dataset_id.to_string(),
        dataset_dir,
        manifest_path,
        manifest,
    })
}

/// Indented listing of `folders` relative to `root`, for debug logs.
#[must_use]
pub fn render_tree(root: &Path, folders: &[PathBuf]) -> String {
    folders
        .iter()
        .map(|folder| {
            let rel = folder.strip_prefix(root).unwrap_or(folder);
            let depth = rel.components().count().saturating_sub(1);
            let name = match rel.file_name() {
                Some(n) => n.to_string_lossy().into_owned(),
                None => rel.display().to_string(),
            };
            format!("{}├── {}", "│   ".repeat(depth), name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::DatasetPartition;
    use tempfile::TempDir;

    fn labels() -> LabelSpace {
        let mut space = LabelSpace::new();
        space.intern("mask");
        space
    }

    #[test]
    fn test_prepare_creates_tree_and_manifest() {
        let temp = TempDir::new().unwrap();
        let layout = WorkspaceLayout::new(temp.path());
        let prepared = prepare_workspace(&layout, "ds", &labels()).unwrap();

        for partition in DatasetPartition::ALL {
            assert!(layout.partition_images_dir("ds", partition).is_dir());
            assert!(layout.partition_labels_dir("ds", partition).is_dir());
        }
        assert!(prepared.manifest_path.is_file());
        assert_eq!(
            prepared.manifest.names.get(&0).map(String::as_str),
            Some("mask")
        );
    }

    #[test]
    fn test_reset_removes_files_but_keeps_subfolders() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("d");
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("stale.jpg"), b"x").unwrap();
        std::fs::write(dir.join("nested/keep.txt"), b"x").unwrap();

        reset_dir(&dir).unwrap();

        assert!(!dir.join("stale.jpg").exists());
        assert!(dir.join("nested/keep.txt").exists());
    }

    #[test]
    fn test_reset_over_a_file_is_filesystem_error() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("datasets");
        std::fs::write(&blocker, b"not a dir").unwrap();

        let layout = WorkspaceLayout::new(temp.path());
        let err = prepare_workspace(&layout, "ds", &labels()).unwrap_err();
        assert!(matches!(err, JobError::Filesystem { .. }));
    }

    #[test]
    fn test_render_tree_indents_by_depth() {
        let root = Path::new("/w");
        let folders = vec![
            PathBuf::from("/w/datasets/ds"),
            PathBuf::from("/w/datasets/ds/images"),
        ];
        let tree = render_tree(root, &folders);
        assert_eq!(tree, "│   ├── ds\n│   │   ├── images");
    }
}
