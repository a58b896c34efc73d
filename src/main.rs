use std::sync::Arc;

use stytch_mcp_server::{
    build_app,
    config::Config,
    domain::metadata::AuthorizationServerMetadata,
    identity::IntrospectionClient,
    logging, AppState,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::from_filename(".env.local").ok();
    logging::init_logging();

    let config = Config::from_env()?;
    if !config.has_project() {
        warn!("STYTCH_PROJECT_ID is not set; every bearer token will be rejected");
    }

    let verifier = Arc::new(IntrospectionClient::from_config(&config)?);
    let bind_socket = config.bind_socket()?;
    let state = AppState::new(verifier, AuthorizationServerMetadata::from_config(&config));
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        "stateless MCP server listening"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
