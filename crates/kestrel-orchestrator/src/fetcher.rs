//! Download stage: materializes the partitioned dataset on disk.

use crate::storage::StorageService;
use futures::stream::{self, StreamExt};
use kestrel_training::{
    DatasetPartition, ImageRecord, JobError, JobResult, LabelEncoding, PartitionedDataset,
    WorkspaceLayout,
};
use tracing::{debug, info};

/// Everything the fetcher needs to know about one job.
pub struct FetchPlan<'a> {
    pub dataset_id: &'a str,
    pub credential: &'a str,
    pub dataset: &'a PartitionedDataset<'a>,
    pub labels: &'a LabelEncoding,
}

/// Download every image of `plan` into its partition folder and write the
/// matching label file. At most `concurrency` downloads are in flight; the
/// first failure cancels the rest. Returns the number of images written.
pub async fn fetch_dataset(
    storage: &dyn StorageService,
    layout: &WorkspaceLayout,
    plan: &FetchPlan<'_>,
    concurrency: usize,
) -> JobResult<usize> {
    info!(
        dataset_id = plan.dataset_id,
        images = plan.dataset.len(),
        concurrency,
        "Downloading dataset"
    );

    let mut downloads = stream::iter(plan.dataset.iter())
        .map(|(partition, image)| fetch_one(storage, layout, plan, partition, image))
        .buffer_unordered(concurrency.max(1));

    let mut written = 0;
    while let Some(result) = downloads.next().await {
        result?;
        written += 1;
    }

    info!(dataset_id = plan.dataset_id, written, "Dataset downloaded");
    Ok(written)
}

async fn fetch_one(
    storage: &dyn StorageService,
    layout: &WorkspaceLayout,
    plan: &FetchPlan<'_>,
    partition: DatasetPartition,
    image: &ImageRecord,
) -> JobResult<()> {
    let bytes = storage
        .fetch_image(plan.dataset_id, &image.name, plan.credential)
        .await
        .map_err(|e| e.into_download())?;

    let image_path = layout
        .partition_images_dir(plan.dataset_id, partition)
        .join(&image.name);
    tokio::fs::write(&image_path, &bytes)
        .await
        .map_err(|e| JobError::filesystem(&image_path, e))?;

    let label_path = layout
        .partition_labels_dir(plan.dataset_id, partition)
        .join(format!("{}.txt", image.stem()));
    tokio::fs::write(&label_path, plan.labels.label_file_contents(&image.name))
        .await
        .map_err(|e| JobError::filesystem(&label_path, e))?;

    debug!(image = %image.name, %partition, size = bytes.len(), "Image stored");
    Ok(())
}
