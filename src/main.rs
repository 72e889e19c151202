use std::sync::Arc;

use anyhow::Result;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use studio_vision::{build_studio, config::StudioConfig, mcp_server::StudioToolServer, web_pages};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("studio_vision=info")),
        )
        .init();

    let config = StudioConfig::from_env()?;
    let studio = build_studio(&config);

    let ready = studio.keys().is_ready().await;
    info!(
        ready,
        mode = ?studio.keys().mode(),
        data_dir = %config.data_dir.display(),
        "engine {}",
        if ready { "active" } else { "offline, waiting for an API key" }
    );

    let studio_for_service = Arc::clone(&studio);
    let service = StreamableHttpService::new(
        move || Ok(StudioToolServer::new(studio_for_service.clone())),
        LocalSessionManager::default().into(),
        Default::default(),
    );
    let mcp_path = config.mcp_path();
    let router = web_pages::router(studio).nest_service(&mcp_path, service);

    let bind_address = config.bind_address();
    let tcp_listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Studio Vision started at http://{bind_address} (MCP at {mcp_path})");

    axum::serve(tcp_listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
