use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = gqlgate::Config::from_env().context("invalid configuration")?;

    // Init logging: RUST_LOG wins, LOG_LEVEL is the fallback
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "gqlgate",
        "gqlgate starting: RUST_LOG='{}', port={}, graphql_path={}, typedefs_dir='{}', fail_open_on_db_error={}, media_endpoints={}",
        rust_log,
        config.port,
        config.graphql_path,
        config.type_defs_dir.display(),
        config.fail_open_on_db_error,
        config.enable_media_endpoints
    );

    gqlgate::server::run(config).await
}
