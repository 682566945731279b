//! Upload stage.

use crate::publisher::ModelFile;
use crate::storage::StorageService;
use kestrel_training::{ExportedArtifact, JobIdentity, JobResult};
use tracing::info;

/// Upload `artifacts` one after another as `<model_name>.<ext>`.
///
/// Stops at the first failure; files already uploaded stay in storage.
pub async fn upload_artifacts(
    storage: &dyn StorageService,
    identity: &JobIdentity,
    artifacts: &[ExportedArtifact],
) -> JobResult<Vec<ModelFile>> {
    let mut uploaded = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let file_name = artifact.kind.upload_file_name(&identity.model_name);
        let url = storage
            .upload_model(
                &identity.dataset_id,
                &file_name,
                &artifact.path,
                &identity.authentication,
            )
            .await
            .map_err(|e| e.into_upload())?;

        info!(
            dataset_id = %identity.dataset_id,
            %file_name,
            %url,
            "Model uploaded"
        );
        uploaded.push(ModelFile {
            url,
            model_type: artifact.kind,
        });
    }
    Ok(uploaded)
}
