use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use headgate::identity::StaticDirectory;
use headgate::server::{run_with_config, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let config = ServerConfig::from_env();
    info!(
        target: "headgate",
        "headgate starting: RUST_LOG='{}', http_port={}, trusted_header='{}', session_policy={:?}, session_ttl_secs={}",
        rust_log, config.http_port, config.trusted_header, config.session_policy, config.session_ttl_secs
    );

    run_with_config(config, Arc::new(StaticDirectory::demo())).await
}
