//! GraphQL endpoint and IDE page.
//!
//! The endpoint is not gated. When request context is enabled each request
//! carries a `RequestContext` (with the principal if a valid bearer token was
//! sent) into resolver execution, and headers resolvers set on its sink are
//! copied onto the response.

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::extract::State;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{Html, IntoResponse, Response};
use tracing::debug;

use super::AppState;
use crate::identity::RequestContext;

pub async fn graphql_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> Response {
    let request = req.into_inner();
    if !state.config.enable_request_context {
        return GraphQLResponse::from(state.schema.execute(request).await).into_response();
    }

    let principal = state.gate.identify(&headers).await;
    let ctx = RequestContext::new(method, uri, headers).with_principal(principal);
    let sink = ctx.response.clone();
    debug!(
        target: "graphql",
        request_id = %ctx.request_id,
        user = ctx.principal.as_ref().map(|p| p.user_id.as_str()).unwrap_or("-"),
        operation = request.operation_name.as_deref().unwrap_or("-"),
        "executing"
    );
    let resp = state.schema.execute(request.data(ctx)).await;
    let mut out = GraphQLResponse::from(resp).into_response();
    out.headers_mut().extend(sink.take());
    out
}

pub async fn graphiql(State(state): State<AppState>) -> impl IntoResponse {
    Html(GraphiQLSource::build().endpoint(&state.config.graphql_path).finish())
}
