//! HTTP front-end: one catch-all proxy handler plus the small local API
//! (`/health`, `/stats`, `/ws`, `/transformers`).

mod handler;
mod ws;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use relayhub_core::ProxyEngine;

#[derive(Clone)]
pub struct ServerState {
    pub engine: Arc<ProxyEngine>,
    /// Shared secret for proxied requests; `None` disables auth.
    pub auth_secret: Option<String>,
    pub port: u16,
}

impl ServerState {
    pub fn new(engine: Arc<ProxyEngine>, auth_secret: Option<String>, port: u16) -> Self {
        Self {
            engine,
            auth_secret,
            port,
        }
    }
}

pub fn build_router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(handler::health))
        .route("/stats", get(handler::stats))
        .route("/transformers", get(handler::transformers))
        .route("/ws", get(ws::upgrade))
        .fallback(handler::proxy)
        .with_state(state)
}
