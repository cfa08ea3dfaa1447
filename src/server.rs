use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::analysis::PreviewAnalyzer;
use crate::api;
use crate::config::AppConfig;
use crate::llm::{ChatCompletionsDriver, ImageGenerator, ImagesClient, LlmDriver, LlmSettings};
use crate::resilience::rate_limit_middleware;
use crate::session::{InMemorySessionStore, SessionStore};

/// Build the shared state from configuration.
///
/// Without provider settings the server still runs; chat turns and image
/// requests report the provider as unavailable.
#[must_use]
pub fn build_state(config: Arc<AppConfig>, settings: Option<LlmSettings>) -> AppState {
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::with_policy(
        config.sessions.eviction_policy(),
    ));

    let (driver, images) = match settings {
        Some(settings) => {
            info!(
                name: "llm.config.loaded",
                base_url = %settings.base_url,
                model = %settings.model,
                provider = ?settings.provider,
                "LLM configuration loaded"
            );
            let http = reqwest::Client::new();
            let driver: Arc<dyn LlmDriver> = Arc::new(ChatCompletionsDriver::with_client(
                http.clone(),
                settings.clone(),
            ));
            let images: Arc<dyn ImageGenerator> = Arc::new(ImagesClient::new(
                http,
                settings,
                config.images.size.clone(),
            ));
            (Some(driver), Some(images))
        }
        None => (None, None),
    };

    AppState::new(
        config,
        sessions,
        driver,
        images,
        Arc::new(PreviewAnalyzer::new()),
    )
}

/// Assemble routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.resilience.body_limit_bytes;

    Router::new()
        .route("/ws/{session_id}", get(api::chat::chat_socket))
        .route("/api/chat/mode", post(api::chat::set_mode))
        .route("/api/chat/export/{session_id}", get(api::chat::export_chat))
        .route("/upload", post(api::upload::upload_file))
        .route("/image", post(api::image::create_image))
        .route("/health", get(api::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodically drop sessions idle past the store's timeout.
pub fn spawn_session_sweeper(sessions: Arc<dyn SessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = sessions.evict_expired();
            if removed > 0 {
                info!(
                    name: "session.sweep",
                    removed,
                    remaining = sessions.len(),
                    "Expired sessions evicted"
                );
            }
        }
    })
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(
    config: Arc<AppConfig>,
    settings: Option<LlmSettings>,
) -> anyhow::Result<()> {
    let state = build_state(Arc::clone(&config), settings);

    let sweeper = config.sessions.eviction_policy().idle_timeout.map(|_| {
        spawn_session_sweeper(
            Arc::clone(&state.sessions),
            config.sessions.sweep_interval(),
        )
    });

    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
