//! Remote storage protocol client
//!
//! The upload engine only depends on the [`StorageClient`] capability:
//! create a remote upload resource, append chunks at explicit offsets,
//! query the committed offset, and abort. [`HttpStorageClient`] implements
//! it against an HTTPS endpoint speaking a tus-style resumable protocol,
//! attaching the bearer credential and API key header to every request.

use async_trait::async_trait;
use bytes::Bytes;
use color_eyre::eyre;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::model::error::TransferError;
use crate::settings::api_credentials::ApiCredential;

#[cfg(test)]
use mockall::automock;

/// Offset header used by the append and status operations
const UPLOAD_OFFSET_HEADER: &str = "Upload-Offset";

/// Metadata sent when creating a remote upload resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceMeta {
    pub name: String,
    pub size: u64,
    pub relative_path: String,
}

/// Server-issued handle for an upload resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    pub upload_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateUploadResponse {
    upload_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Capability the transfer client drives a chunked upload through
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Create a remote upload resource, returning its handle
    async fn create(&self, meta: &ResourceMeta) -> Result<ResourceHandle, TransferError>;

    /// Append one chunk at the given byte offset
    async fn append(
        &self,
        handle: &ResourceHandle,
        offset: u64,
        chunk: Bytes,
    ) -> Result<(), TransferError>;

    /// Committed byte offset as the server sees it
    async fn status(&self, handle: &ResourceHandle) -> Result<u64, TransferError>;

    /// Release a partial resource; callers treat failures as best-effort
    async fn abort(&self, handle: &ResourceHandle) -> Result<(), TransferError>;
}

/// HTTP implementation of the storage protocol over reqwest
pub struct HttpStorageClient {
    http: Client,
    endpoint: Url,
    bearer_token: String,
    api_key: String,
}

impl HttpStorageClient {
    pub fn new(
        endpoint: &str,
        credential: &ApiCredential,
        request_timeout: Duration,
    ) -> eyre::Result<Self> {
        // A trailing slash makes Url::join treat the endpoint as a base
        let normalized = if endpoint.ends_with('/') {
            endpoint.to_string()
        } else {
            format!("{}/", endpoint)
        };
        let endpoint = Url::parse(&normalized)?;
        let http = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("upq/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpStorageClient {
            http,
            endpoint,
            bearer_token: credential.bearer_token.clone(),
            api_key: credential.api_key.clone(),
        })
    }

    fn create_url(&self) -> Result<Url, TransferError> {
        self.endpoint
            .join("uploads")
            .map_err(|e| TransferError::network(format!("invalid endpoint: {}", e)))
    }

    fn resource_url(&self, handle: &ResourceHandle) -> Result<Url, TransferError> {
        self.endpoint
            .join(&format!("uploads/{}", handle.upload_id))
            .map_err(|e| TransferError::network(format!("invalid endpoint: {}", e)))
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.bearer_token)
            .header("x-api-key", &self.api_key)
    }

    async fn error_for_response(response: reqwest::Response) -> TransferError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        // Servers answer with a structured {"message": ...} body when they
        // can; fall back to the raw text otherwise
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.message)
            .unwrap_or_else(|_| {
                if body.is_empty() {
                    format!("server returned status {}", status)
                } else {
                    body
                }
            });
        TransferError::from_status(status, message)
    }
}

fn send_error(e: reqwest::Error) -> TransferError {
    match e.status() {
        Some(status) => TransferError::from_status(status.as_u16(), e.to_string()),
        None => TransferError::network(e.to_string()),
    }
}

#[async_trait]
impl StorageClient for HttpStorageClient {
    async fn create(&self, meta: &ResourceMeta) -> Result<ResourceHandle, TransferError> {
        let response = self
            .request(reqwest::Method::POST, self.create_url()?)
            .json(meta)
            .send()
            .await
            .map_err(send_error)?;

        if !response.status().is_success() {
            return Err(Self::error_for_response(response).await);
        }

        let created: CreateUploadResponse = response
            .json()
            .await
            .map_err(|e| TransferError::network(format!("malformed create response: {}", e)))?;
        tracing::debug!("created upload resource {} for {}", created.upload_id, meta.name);
        Ok(ResourceHandle {
            upload_id: created.upload_id,
        })
    }

    async fn append(
        &self,
        handle: &ResourceHandle,
        offset: u64,
        chunk: Bytes,
    ) -> Result<(), TransferError> {
        let response = self
            .request(reqwest::Method::PATCH, self.resource_url(handle)?)
            .header(UPLOAD_OFFSET_HEADER, offset)
            .header("Content-Type", "application/offset+octet-stream")
            .body(chunk)
            .send()
            .await
            .map_err(send_error)?;

        if !response.status().is_success() {
            return Err(Self::error_for_response(response).await);
        }
        Ok(())
    }

    async fn status(&self, handle: &ResourceHandle) -> Result<u64, TransferError> {
        let response = self
            .request(reqwest::Method::HEAD, self.resource_url(handle)?)
            .send()
            .await
            .map_err(send_error)?;

        if !response.status().is_success() {
            return Err(Self::error_for_response(response).await);
        }

        response
            .headers()
            .get(UPLOAD_OFFSET_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .ok_or_else(|| {
                TransferError::network("status response missing Upload-Offset header")
            })
    }

    async fn abort(&self, handle: &ResourceHandle) -> Result<(), TransferError> {
        let response = self
            .request(reqwest::Method::DELETE, self.resource_url(handle)?)
            .send()
            .await
            .map_err(send_error)?;

        if !response.status().is_success() {
            return Err(Self::error_for_response(response).await);
        }
        Ok(())
    }
}
