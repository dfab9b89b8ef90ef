//!
//! gqlgate HTTP server
//! -------------------
//! Wires the composed GraphQL schema, the REST side endpoints and the auth gate
//! into one axum router and serves it.
//!
//! Responsibilities:
//! - Startup sequence: database connection (awaited or backgrounded per the
//!   fail-open policy), schema composition, verifier and media provider setup.
//! - Route table: GraphQL endpoint and IDE, `/health`, and the protected
//!   `/rest`, `/uploadimages` and `/removeimage` routes.
//! - Graceful shutdown that closes the database client.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::{DefaultBodyLimit, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware, Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::{DatabaseProvider, IndexSpec};
use crate::identity::{auth_gate, AuthGate, DenyAllVerifier, JwtVerifier, TokenVerifier};
use crate::media::{CloudinaryClient, MediaProvider, PublicIdGenerator};
use crate::schema::{self, BuildOptions, ResolverSource, TypeDefSource};

pub mod graphql;
pub mod rest;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub database: DatabaseProvider,
    pub schema: async_graphql::dynamic::Schema,
    pub gate: AuthGate,
    /// `None` when media endpoints are disabled.
    pub media: Option<Arc<dyn MediaProvider>>,
    pub public_ids: Arc<PublicIdGenerator>,
}

/// Startup builder. Fragments added here are merged after the built-in
/// fragment and the ones found in `TYPEDEFS_DIR`.
pub struct Gateway {
    config: Config,
    type_defs: Vec<TypeDefSource>,
    resolvers: Vec<ResolverSource>,
    media: Option<Arc<dyn MediaProvider>>,
    verifier: Option<Arc<dyn TokenVerifier>>,
    indexes: Vec<IndexSpec>,
}

impl Gateway {
    pub fn new(config: Config) -> Self {
        Self { config, type_defs: Vec::new(), resolvers: Vec::new(), media: None, verifier: None, indexes: Vec::new() }
    }

    pub fn with_type_defs(mut self, source: TypeDefSource) -> Self {
        self.type_defs.push(source);
        self
    }

    pub fn with_resolvers(mut self, source: ResolverSource) -> Self {
        self.resolvers.push(source);
        self
    }

    /// Replace the provider built from the Cloudinary credentials.
    pub fn with_media_provider(mut self, provider: Arc<dyn MediaProvider>) -> Self {
        self.media = Some(provider);
        self
    }

    /// Replace the verifier built from the `AUTH_JWT_*` settings.
    pub fn with_token_verifier(mut self, verifier: Arc<dyn TokenVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_indexes(mut self, indexes: Vec<IndexSpec>) -> Self {
        self.indexes.extend(indexes);
        self
    }

    /// Run the startup sequence up to (not including) binding the listener.
    pub async fn build(self) -> anyhow::Result<AppState> {
        let Gateway { config, type_defs, resolvers, media, verifier, indexes } = self;

        let database = DatabaseProvider::new(config.database_url.clone(), Duration::from_millis(config.db_connect_timeout_ms))
            .with_indexes(indexes);
        if config.fail_open_on_db_error {
            database.spawn_connect();
        } else {
            database.connect().await.context("database connection failed")?;
        }

        let mut fragments = vec![schema::builtin_type_defs()];
        fragments.extend(schema::load_type_defs(&config.type_defs_dir)?);
        fragments.extend(type_defs);
        let mut resolver_sources = vec![schema::builtin_resolvers()];
        resolver_sources.extend(resolvers);
        let composed = schema::compose(&fragments, &resolver_sources).context("schema composition failed")?;
        let executable = composed
            .build(database.clone(), BuildOptions { enable_request_context: config.enable_request_context })
            .context("schema composition failed")?;

        let verifier: Arc<dyn TokenVerifier> = match verifier {
            Some(v) => v,
            None => match JwtVerifier::from_config(&config.auth)? {
                Some(jwt) => Arc::new(jwt),
                None => {
                    warn!(target: "startup", "no AUTH_JWT_SECRET or AUTH_JWT_PUBLIC_KEY_PATH configured; protected routes will reject every request");
                    Arc::new(DenyAllVerifier)
                }
            },
        };

        let media = if config.enable_media_endpoints {
            media.or_else(|| {
                config
                    .cloudinary
                    .clone()
                    .map(|c| Arc::new(CloudinaryClient::new(c)) as Arc<dyn MediaProvider>)
            })
        } else {
            None
        };
        if config.enable_media_endpoints && media.is_none() {
            anyhow::bail!("media endpoints are enabled but no media provider is configured");
        }

        Ok(AppState {
            config: Arc::new(config),
            database,
            schema: executable,
            gate: AuthGate::new(verifier),
            media,
            public_ids: Arc::new(PublicIdGenerator::default()),
        })
    }

    pub async fn bind(self) -> anyhow::Result<BoundGateway> {
        let state = self.build().await?;
        let addr = state.config.listen_addr();
        let listener = TcpListener::bind(&addr).await.with_context(|| format!("failed to bind {addr}"))?;
        let local_addr = listener.local_addr()?;
        info!(
            target: "startup",
            addr = %local_addr,
            graphql = %state.config.graphql_path,
            media = state.media.is_some(),
            "gqlgate listening"
        );
        let database = state.database.clone();
        Ok(BoundGateway { listener, router: router(state), database, local_addr })
    }
}

/// A gateway whose listener is bound but not yet accepting connections.
pub struct BoundGateway {
    listener: TcpListener,
    router: Router,
    database: DatabaseProvider,
    local_addr: SocketAddr,
}

impl BoundGateway {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> anyhow::Result<()> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    pub async fn serve_with_shutdown<F>(self, signal: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let BoundGateway { listener, router, database, .. } = self;
        let served = axum::serve(listener, router).with_graceful_shutdown(signal).await;
        database.shutdown().await;
        info!(target: "startup", "server shutdown complete");
        served.context("server error")
    }
}

/// Build the route table for an already constructed state.
pub fn router(state: AppState) -> Router {
    let mut protected = Router::new().route("/rest", get(rest::rest_example));
    if state.media.is_some() {
        protected = protected
            .route("/uploadimages", post(rest::upload_image))
            .route("/removeimage", post(rest::remove_image));
    }
    let protected = protected.route_layer(middleware::from_fn_with_state(state.gate.clone(), auth_gate));

    Router::new()
        .route(&state.config.graphql_path, get(graphql::graphiql).post(graphql::graphql_handler))
        .route("/health", get(health))
        .merge(protected)
        .layer(DefaultBodyLimit::max(state.config.body_limit_bytes))
        // the GraphQL extractor reads the raw stream and ignores DefaultBodyLimit
        .layer(RequestBodyLimitLayer::new(state.config.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = if state.database.is_connected().await { "connected" } else { "disconnected" };
    Json(serde_json::json!({"status": "ok", "database": database}))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(target: "startup", error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!(target: "startup", "shutdown signal received");
}

/// Load nothing beyond the built-ins and the fragment directory, then serve.
pub async fn run(config: Config) -> anyhow::Result<()> {
    Gateway::new(config).bind().await?.serve().await
}
