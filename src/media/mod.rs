//! Story media upload.
//!
//! Files go to Cloudinary's upload API as base64 data URIs; the hosted
//! `secure_url` is what stories store as `media_url`.

use actix_web::{http::header, web, HttpRequest, HttpResponse};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt::Write;
use crate::auth::CurrentUser;
use crate::config::MediaConfig;
use crate::error::AppError;
use crate::AppState;
use tracing::{error, info};

pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadErrorResponse {
    error: UploadErrorBody,
}

#[derive(Debug, Deserialize)]
struct UploadErrorBody {
    message: String,
}

pub struct MediaUploader {
    client: reqwest::Client,
    config: MediaConfig,
}

impl MediaUploader {
    pub fn new(config: MediaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn upload_url(&self) -> String {
        format!(
            "{}/v1_1/{}/auto/upload",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.cloud_name
        )
    }

    /// Cloudinary request signature: the signed parameters sorted by name,
    /// joined as `k=v&k=v`, with the API secret appended, SHA-256 hex encoded.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let digest = Sha256::digest(format!("{}{}", joined, self.config.api_secret).as_bytes());
        digest.iter().fold(String::with_capacity(64), |mut hex, byte| {
            let _ = write!(hex, "{:02x}", byte);
            hex
        })
    }

    /// Uploads `bytes` and returns the hosted URL.
    pub async fn upload(&self, bytes: &[u8], content_type: &str) -> Result<String, AppError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = self.sign(&[
            ("folder", self.config.folder.as_str()),
            ("timestamp", timestamp.as_str()),
        ]);
        let file = format!("data:{};base64,{}", content_type, BASE64.encode(bytes));

        let response = self
            .client
            .post(self.upload_url())
            .form(&[
                ("file", file.as_str()),
                ("api_key", self.config.api_key.as_str()),
                ("folder", self.config.folder.as_str()),
                ("timestamp", timestamp.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response
                .json::<UploadErrorResponse>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(AppError::ExternalError(format!("media upload rejected: {}", message)));
        }

        let uploaded: UploadResponse = response.json().await?;
        Ok(uploaded.secure_url)
    }
}

pub async fn upload(
    current: CurrentUser,
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let uploader = state
        .media
        .as_ref()
        .ok_or_else(|| AppError::ConfigError("media storage is not configured".into()))?;

    if body.is_empty() {
        return Err(AppError::ValidationError("upload body is empty".into()));
    }

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");
    if !(content_type.starts_with("image/") || content_type.starts_with("video/")) {
        return Err(AppError::ValidationError("only image and video uploads are accepted".into()));
    }

    match uploader.upload(&body, content_type).await {
        Ok(media_url) => {
            info!("Media uploaded by {}: {}", current.user().username, media_url);
            Ok(HttpResponse::Created().json(serde_json::json!({ "media_url": media_url })))
        }
        Err(e) => {
            error!("Media upload failed for {}: {}", current.user().username, e);
            Err(e)
        }
    }
}

/// Mounted under `/api/v1/media`.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_UPLOAD_BYTES))
        .route("", web::post().to(upload));
}
