//! Cloudinary upload API client.
//!
//! Requests are signed the way the provider's SDKs do it: every signed
//! parameter except `file`, `api_key`, `resource_type` and `cloud_name` is
//! sorted by name, joined as `k=v` pairs with `&`, suffixed with the API secret
//! and hashed (SHA-1 by default, SHA-256 when the account is configured for it).

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Digest, Sha256};
use tracing::{debug, error};

use super::{MediaError, MediaProvider, ResourceType, UploadOptions, UploadResult};
use crate::config::{CloudinaryConfig, SignatureAlgorithm};

const UNSIGNED_PARAMS: [&str; 4] = ["file", "api_key", "resource_type", "cloud_name"];

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct DestroyBody {
    result: String,
}

#[derive(Clone)]
pub struct CloudinaryClient {
    http: Client,
    cfg: CloudinaryConfig,
}

impl CloudinaryClient {
    pub fn new(cfg: CloudinaryConfig) -> Self {
        Self { http: Client::new(), cfg }
    }

    fn endpoint(&self, resource_type: &str, action: &str) -> String {
        format!("{}/v1_1/{}/{}/{}", self.cfg.api_base, self.cfg.cloud_name, resource_type, action)
    }

    /// Add `api_key`, `timestamp` and `signature` to `params`.
    fn signed(&self, mut params: BTreeMap<String, String>) -> BTreeMap<String, String> {
        params.insert("timestamp".into(), chrono::Utc::now().timestamp().to_string());
        let signature = sign(&params, &self.cfg.api_secret, self.cfg.signature_algorithm);
        params.insert("signature".into(), signature);
        params.insert("api_key".into(), self.cfg.api_key.clone());
        params
    }

    async fn post(&self, url: &str, form: &BTreeMap<String, String>) -> Result<reqwest::Response, MediaError> {
        let resp = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| MediaError::Transport(e.to_string()))?;
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .map(|b| b.error.message)
            .unwrap_or(text);
        error!(target: "media", status, %message, "cloudinary error");
        if status == 404 {
            return Err(MediaError::NotFound);
        }
        Err(MediaError::Api { status, message })
    }
}

/// Compute the request signature over the signable subset of `params`.
pub fn sign(params: &BTreeMap<String, String>, secret: &str, algorithm: SignatureAlgorithm) -> String {
    let to_sign = params
        .iter()
        .filter(|(k, v)| !UNSIGNED_PARAMS.contains(&k.as_str()) && *k != "signature" && !v.is_empty())
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    let payload = format!("{to_sign}{secret}");
    match algorithm {
        SignatureAlgorithm::Sha1 => hex::encode(Sha1::digest(payload.as_bytes())),
        SignatureAlgorithm::Sha256 => hex::encode(Sha256::digest(payload.as_bytes())),
    }
}

#[async_trait]
impl MediaProvider for CloudinaryClient {
    async fn upload(&self, payload: &str, options: &UploadOptions) -> Result<UploadResult, MediaError> {
        let mut params = BTreeMap::new();
        params.insert("public_id".to_string(), options.public_id.clone());
        let mut form = self.signed(params);
        form.insert("file".into(), payload.to_string());
        let url = self.endpoint(options.resource_type.as_str(), "upload");
        let resp = self.post(&url, &form).await?;
        let result: UploadResult = resp.json().await.map_err(|e| MediaError::Decode(e.to_string()))?;
        debug!(target: "media", public_id = %result.public_id, url = %result.secure_url, "uploaded");
        Ok(result)
    }

    async fn destroy(&self, public_id: &str) -> Result<(), MediaError> {
        let mut params = BTreeMap::new();
        params.insert("public_id".to_string(), public_id.to_string());
        let form = self.signed(params);
        let url = self.endpoint(ResourceType::Image.as_str(), "destroy");
        let resp = self.post(&url, &form).await?;
        let body: DestroyBody = resp.json().await.map_err(|e| MediaError::Decode(e.to_string()))?;
        match body.result.as_str() {
            "ok" => Ok(()),
            "not found" => Err(MediaError::NotFound),
            other => Err(MediaError::Rejected(other.to_string())),
        }
    }
}
