//! Mode Chat
//!
//! A small chat backend over an OpenAI-compatible API. Clients hold a
//! WebSocket per conversation and receive the assistant's reply as it is
//! generated; each conversation runs under a "mode" that selects its system
//! prompt.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server with a WebSocket chat route
//! - **Gateway**: per-connection turn state machine relaying streamed replies
//! - **Sessions**: in-memory conversation logs with per-session locking
//! - **Provider**: streaming Chat Completions and image generation clients
//!
//! # Modules
//!
//! - [`prompts`]: mode name to system prompt registry
//! - [`session`]: conversation storage
//! - [`gateway`]: chat protocol
//! - [`llm`]: provider clients
//! - [`api`]: HTTP handlers
//! - [`analysis`]: upload validation and dataset summaries

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::unused_async)]

pub mod analysis;
pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
pub mod llm;
pub mod prompts;
pub mod resilience;
pub mod server;
pub mod session;
pub mod telemetry;

use std::sync::Arc;

use crate::analysis::DatasetAnalyzer;
use crate::config::AppConfig;
use crate::gateway::ChatGateway;
use crate::llm::{ImageGenerator, LlmDriver};
use crate::resilience::TokenBucket;
use crate::session::SessionStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Conversation storage.
    pub sessions: Arc<dyn SessionStore>,
    /// Chat protocol driver, sharing `sessions`.
    pub gateway: ChatGateway,
    /// Image generation client, absent when the provider is not configured.
    pub images: Option<Arc<dyn ImageGenerator>>,
    /// Analyzer for tabular uploads.
    pub analyzer: Arc<dyn DatasetAnalyzer>,
    /// Global Rate Limiter
    pub rate_limiter: Arc<TokenBucket>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("sessions", &self.sessions.len())
            .field("gateway", &self.gateway)
            .field("images", &self.images.is_some())
            .field("analyzer", &self.analyzer)
            .finish()
    }
}

impl AppState {
    /// Wire the shared state together.
    ///
    /// `driver` and `images` are `None` when no provider credentials are set;
    /// chat and image requests then report the service as unavailable.
    #[must_use]
    pub fn new(
        config: Arc<AppConfig>,
        sessions: Arc<dyn SessionStore>,
        driver: Option<Arc<dyn LlmDriver>>,
        images: Option<Arc<dyn ImageGenerator>>,
        analyzer: Arc<dyn DatasetAnalyzer>,
    ) -> Self {
        let rate_limiter = Arc::new(TokenBucket::new(
            config.resilience.requests_per_second,
            config.resilience.burst_size,
        ));
        Self {
            gateway: ChatGateway::new(Arc::clone(&sessions), driver),
            sessions,
            images,
            analyzer,
            rate_limiter,
            config,
        }
    }
}
