use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::AppConfig;

/// Largest event image the hosted service will take.
pub const MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("image uploads are not configured")]
    NotConfigured,
    #[error("unsupported content type {0:?}, expected an image")]
    NotAnImage(String),
    #[error("image is empty")]
    Empty,
    #[error("image is {0} bytes, the limit is 4MB")]
    TooLarge(usize),
    #[error("http error: {0}")]
    Http(String),
    #[error("upload service error: {0}")]
    Service(String),
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

/// Checks an incoming event image and returns the storage key for it.
pub fn image_key(content_type: &str, bytes: &[u8]) -> Result<String, UploadError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let Some(subtype) = mime.strip_prefix("image/").filter(|s| !s.is_empty()) else {
        return Err(UploadError::NotAnImage(content_type.to_string()));
    };
    if bytes.is_empty() {
        return Err(UploadError::Empty);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(UploadError::TooLarge(bytes.len()));
    }

    let extension = match subtype {
        "jpeg" | "jpg" | "pjpeg" => "jpg",
        "svg+xml" => "svg",
        other => other,
    };
    let digest = Sha256::digest(bytes);
    Ok(format!("{digest:x}.{extension}"))
}

/// Client for the hosted image service. Files are PUT under their content
/// hash and the service answers with the public URL.
pub struct ImageUploader {
    endpoint: String,
    api_key: String,
    client: Client,
}

impl ImageUploader {
    pub fn from_config(config: &AppConfig) -> Result<Self, UploadError> {
        let endpoint = config
            .upload_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or(UploadError::NotConfigured)?
            .trim_end_matches('/')
            .to_string();
        let api_key = config
            .upload_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(UploadError::NotConfigured)?
            .to_string();

        Ok(Self {
            endpoint,
            api_key,
            client: Client::new(),
        })
    }

    pub async fn upload(
        &self,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, UploadError> {
        let key = image_key(content_type, &bytes)?;
        let url = format!("{}/{}", self.endpoint, key);

        let response = self
            .client
            .put(url)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await
            .map_err(|err| UploadError::Http(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| UploadError::Http(err.to_string()))?;
        if !status.is_success() {
            return Err(UploadError::Service(format!("{status}: {body}")));
        }

        let parsed: UploadResponse = serde_json::from_str(&body)
            .map_err(|err| UploadError::Service(format!("unexpected response: {err}")))?;
        Ok(parsed.url)
    }
}
