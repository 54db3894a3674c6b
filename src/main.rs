//! Server binary: starts the Axum HTTP surface binding the Task Bus (C3)
//! agent protocol and the crawl-session REST surface to the Budget Gate
//! (C1), AI Broker (C2), and Mapper Orchestrator (C5).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::info;

use form_mapper_control_plane::{router, AppStateInner, ReqwestAiProvider};
use form_mapper_control_plane::store::MemoryStore;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let bind_addr: SocketAddr = env_or("BIND_ADDR", "0.0.0.0:8080")
        .parse()
        .context("BIND_ADDR must be a valid socket address")?;
    let jwt_secret = env_or("JWT_SECRET", "dev-only-insecure-secret");
    let ai_endpoint = env_or("AI_PROVIDER_ENDPOINT", "https://api.anthropic.com/v1/messages");
    let ai_api_key = std::env::var("AI_PROVIDER_API_KEY").unwrap_or_default();
    let ai_model = env_or("AI_PROVIDER_MODEL", "claude-3-5-sonnet-latest");

    let store = Arc::new(MemoryStore::new());
    let provider = ReqwestAiProvider::new(ai_endpoint, ai_api_key, ai_model);
    let state: Arc<AppStateInner> = Arc::new(AppStateInner::new(store, provider, jwt_secret));

    let app = router(state);

    info!("form-mapper-server listening on {bind_addr}");
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    axum::serve(listener, app)
        .await
        .context("server exited with an error")?;
    Ok(())
}
