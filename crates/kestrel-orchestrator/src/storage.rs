//! Client for the file storage service.
//!
//! Images are fetched with `GET <base>/image/<datasetId>/<imageName>` and
//! models are uploaded with a multipart `POST <base>/upload/model/<datasetId>`.
//! Both requests authenticate with the job's credential sent as a cookie.

use crate::config::StorageConfig;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Multipart field the storage service expects the model file under.
pub const MODEL_FIELD: &str = "model";

/// Remote image and model storage.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Download the bytes of one dataset image.
    async fn fetch_image(
        &self,
        dataset_id: &str,
        image_name: &str,
        credential: &str,
    ) -> StorageResult<Vec<u8>>;

    /// Upload a model file as `file_name` and return its public URL.
    async fn upload_model(
        &self,
        dataset_id: &str,
        file_name: &str,
        path: &Path,
        credential: &str,
    ) -> StorageResult<String>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    file_url: String,
}

/// [`StorageService`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStorageClient {
    http_client: Client,
    base_url: String,
    cookie_name: String,
}

impl HttpStorageClient {
    pub fn new(config: &StorageConfig) -> StorageResult<Self> {
        let http_client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| StorageError::Request {
                url: config.base_url.clone(),
                reason: format!("failed to build client: {e}"),
            })?;
        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cookie_name: config.cookie_name.clone(),
        })
    }

    #[must_use]
    pub fn image_url(&self, dataset_id: &str, image_name: &str) -> String {
        format!("{}/image/{dataset_id}/{image_name}", self.base_url)
    }

    #[must_use]
    pub fn model_upload_url(&self, dataset_id: &str) -> String {
        format!("{}/upload/model/{dataset_id}", self.base_url)
    }

    fn cookie(&self, credential: &str) -> String {
        format!("{}={credential}", self.cookie_name)
    }
}

fn request_error(url: &str, reason: String) -> StorageError {
    StorageError::Request {
        url: url.to_string(),
        reason,
    }
}

async fn status_error(
    url: String,
    status: StatusCode,
    response: reqwest::Response,
) -> StorageError {
    StorageError::Status {
        url,
        status: status.as_u16(),
        body: error_body(response).await,
    }
}

async fn error_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|e| format!("<unreadable body: {e}>"))
}

#[async_trait]
impl StorageService for HttpStorageClient {
    async fn fetch_image(
        &self,
        dataset_id: &str,
        image_name: &str,
        credential: &str,
    ) -> StorageResult<Vec<u8>> {
        let url = self.image_url(dataset_id, image_name);
        debug!(%url, "Fetching image");

        let response = self
            .http_client
            .get(&url)
            .header(COOKIE, self.cookie(credential))
            .send()
            .await
            .map_err(|e| request_error(&url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(url, status, response).await);
        }

        let bytes = response.bytes().await.map_err(|e| StorageError::Response {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }

    async fn upload_model(
        &self,
        dataset_id: &str,
        file_name: &str,
        path: &Path,
        credential: &str,
    ) -> StorageResult<String> {
        let url = self.model_upload_url(dataset_id);
        let contents = tokio::fs::read(path)
            .await
            .map_err(|e| StorageError::LocalFile {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        debug!(%url, file_name, size = contents.len(), "Uploading model");

        let part = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| request_error(&url, e.to_string()))?;
        let form = Form::new().part(MODEL_FIELD, part);

        let response = self
            .http_client
            .post(&url)
            .header(COOKIE, self.cookie(credential))
            .multipart(form)
            .send()
            .await
            .map_err(|e| request_error(&url, e.to_string()))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            return Err(status_error(url, status, response).await);
        }

        let body: UploadResponse = response.json().await.map_err(|e| StorageError::Response {
            url: url.clone(),
            reason: format!("expected fileUrl: {e}"),
        })?;
        if body.file_url.is_empty() {
            return Err(StorageError::Response {
                url,
                reason: "empty fileUrl".to_string(),
            });
        }
        Ok(body.file_url)
    }
}
