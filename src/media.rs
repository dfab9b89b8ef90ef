//! Media provider seam.
//!
//! The gateway never stores media itself. `MediaProvider` is the interface the
//! REST endpoints call; `cloudinary::CloudinaryClient` is the production
//! implementation and tests substitute stubs.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod cloudinary;

pub use cloudinary::CloudinaryClient;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("media provider unreachable: {0}")]
    Transport(String),
    #[error("media provider returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("not found")]
    NotFound,
    #[error("media provider refused the request: {0}")]
    Rejected(String),
    #[error("unexpected media provider response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResourceType {
    /// Let the provider detect image/video/raw.
    #[default]
    Auto,
    /// Destroy calls always target images.
    Image,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Auto => "auto",
            ResourceType::Image => "image",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub public_id: String,
    pub resource_type: ResourceType,
}

/// The subset of the provider's upload response the gateway relays.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadResult {
    pub secure_url: String,
    pub public_id: String,
}

/// `{url, public_id}` handed back to the caller after an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    pub url: String,
    pub public_id: String,
}

impl From<UploadResult> for MediaReference {
    fn from(r: UploadResult) -> Self {
        MediaReference { url: r.secure_url, public_id: r.public_id }
    }
}

#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Store `payload` (a remote URL or a data URI) under the given options.
    async fn upload(&self, payload: &str, options: &UploadOptions) -> Result<UploadResult, MediaError>;

    async fn destroy(&self, public_id: &str) -> Result<(), MediaError>;
}

/// Timestamp-derived public ids, strictly increasing within the process.
#[derive(Debug, Default)]
pub struct PublicIdGenerator {
    last: AtomicI64,
}

impl PublicIdGenerator {
    pub fn next(&self) -> String {
        self.next_at(chrono::Utc::now().timestamp_millis())
    }

    fn next_at(&self, now_ms: i64) -> String {
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now_ms.max(prev + 1);
            match self.last.compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return candidate.to_string(),
                Err(actual) => prev = actual,
            }
        }
    }
}
