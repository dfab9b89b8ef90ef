//! REST side endpoints. Each handler is a thin axum adapter over a core
//! function that takes a typed payload and returns an [`ApiReply`], so the
//! relay logic is testable without a router.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::Principal;
use crate::media::{MediaError, MediaProvider, MediaReference, PublicIdGenerator, ResourceType, UploadOptions};

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    Json(Value),
    Text(&'static str),
}

/// Status and body of a REST reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: StatusCode,
    pub body: ReplyBody,
}

impl ApiReply {
    pub fn json(status: StatusCode, body: Value) -> Self {
        Self { status, body: ReplyBody::Json(body) }
    }

    pub fn text(status: StatusCode, body: &'static str) -> Self {
        Self { status, body: ReplyBody::Text(body) }
    }

    fn provider_error(status: StatusCode, err: &MediaError) -> Self {
        Self::json(status, json!({"success": false, "error": err.to_string()}))
    }
}

impl IntoResponse for ApiReply {
    fn into_response(self) -> Response {
        match self.body {
            ReplyBody::Json(v) => (self.status, Json(v)).into_response(),
            ReplyBody::Text(t) => (self.status, t).into_response(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadRequest {
    /// Remote URL or data URI.
    pub image: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoveRequest {
    pub public_id: String,
}

pub async fn upload(provider: &dyn MediaProvider, ids: &PublicIdGenerator, req: UploadRequest) -> AppResult<ApiReply> {
    if req.image.trim().is_empty() {
        return Err(AppError::user("invalid_body", "image must not be empty"));
    }
    let options = UploadOptions { public_id: ids.next(), resource_type: ResourceType::Auto };
    match provider.upload(&req.image, &options).await {
        Ok(result) => {
            let reference = MediaReference::from(result);
            debug!(target: "media", public_id = %reference.public_id, "upload relayed");
            let body = serde_json::to_value(&reference).map_err(anyhow::Error::from)?;
            Ok(ApiReply::json(StatusCode::OK, body))
        }
        Err(e) => {
            warn!(target: "media", public_id = %options.public_id, error = %e, "upload failed");
            Ok(ApiReply::provider_error(StatusCode::BAD_GATEWAY, &e))
        }
    }
}

pub async fn remove(provider: &dyn MediaProvider, req: RemoveRequest) -> AppResult<ApiReply> {
    if req.public_id.trim().is_empty() {
        return Err(AppError::user("invalid_body", "public_id must not be empty"));
    }
    match provider.destroy(&req.public_id).await {
        Ok(()) => Ok(ApiReply::text(StatusCode::OK, "ok")),
        Err(e) => {
            warn!(target: "media", public_id = %req.public_id, error = %e, "delete failed");
            let status = if e == MediaError::NotFound { StatusCode::NOT_FOUND } else { StatusCode::BAD_GATEWAY };
            Ok(ApiReply::provider_error(status, &e))
        }
    }
}

fn media_provider(state: &AppState) -> AppResult<&dyn MediaProvider> {
    state
        .media
        .as_deref()
        .ok_or_else(|| AppError::not_found("media_disabled", "media endpoints are disabled"))
}

pub async fn upload_image(
    State(state): State<AppState>,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> AppResult<ApiReply> {
    let Json(req) = payload?;
    upload(media_provider(&state)?, &state.public_ids, req).await
}

pub async fn remove_image(
    State(state): State<AppState>,
    payload: Result<Json<RemoveRequest>, JsonRejection>,
) -> AppResult<ApiReply> {
    let Json(req) = payload?;
    remove(media_provider(&state)?, req).await
}

pub async fn rest_example(Extension(principal): Extension<Principal>) -> Json<Value> {
    debug!(target: "auth", user = %principal.user_id, "rest endpoint");
    Json(json!({"data": "you hit rest endpoint great!"}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::UploadResult;
    use async_trait::async_trait;

    struct Fixed(Result<(), MediaError>);

    #[async_trait]
    impl MediaProvider for Fixed {
        async fn upload(&self, _payload: &str, options: &UploadOptions) -> Result<UploadResult, MediaError> {
            self.0.clone().map(|_| UploadResult {
                secure_url: format!("https://cdn.test/{}.png", options.public_id),
                public_id: options.public_id.clone(),
            })
        }

        async fn destroy(&self, _public_id: &str) -> Result<(), MediaError> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn upload_relays_reference() {
        let ids = PublicIdGenerator::default();
        let reply = upload(&Fixed(Ok(())), &ids, UploadRequest { image: "data:image/png;base64,AAAA".into() }).await.unwrap();
        assert_eq!(reply.status, StatusCode::OK);
        let ReplyBody::Json(body) = reply.body else { panic!("expected json") };
        let id = body["public_id"].as_str().unwrap().to_string();
        assert_eq!(body, json!({"url": format!("https://cdn.test/{id}.png"), "public_id": id}));
    }

    #[tokio::test]
    async fn upload_failure_is_bad_gateway() {
        let ids = PublicIdGenerator::default();
        let err = MediaError::Api { status: 400, message: "Invalid image file".into() };
        let reply = upload(&Fixed(Err(err.clone())), &ids, UploadRequest { image: "x".into() }).await.unwrap();
        assert_eq!(reply, ApiReply::json(StatusCode::BAD_GATEWAY, json!({"success": false, "error": err.to_string()})));
    }

    #[tokio::test]
    async fn empty_payloads_are_user_errors() {
        let ids = PublicIdGenerator::default();
        let e = upload(&Fixed(Ok(())), &ids, UploadRequest { image: " ".into() }).await.unwrap_err();
        assert_eq!(e.http_status(), 400);
        let e = remove(&Fixed(Ok(())), RemoveRequest { public_id: String::new() }).await.unwrap_err();
        assert_eq!(e.http_status(), 400);
    }

    #[tokio::test]
    async fn remove_statuses() {
        let ok = remove(&Fixed(Ok(())), RemoveRequest { public_id: "1".into() }).await.unwrap();
        assert_eq!(ok, ApiReply::text(StatusCode::OK, "ok"));
        let missing = remove(&Fixed(Err(MediaError::NotFound)), RemoveRequest { public_id: "1".into() }).await.unwrap();
        assert_eq!(missing, ApiReply::json(StatusCode::NOT_FOUND, json!({"success": false, "error": "not found"})));
        let down = remove(&Fixed(Err(MediaError::Transport("refused".into()))), RemoveRequest { public_id: "1".into() })
            .await
            .unwrap();
        assert_eq!(down.status, StatusCode::BAD_GATEWAY);
    }
}
