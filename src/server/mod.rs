//! Companion HTTP server: sense lookup and card generation for clients that
//! keep their drafts locally, behind a per-client sliding-window limiter.

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use tracing::info;

use crate::api::CompletionService;
use crate::config::Config;
use crate::error::Result;

mod errors;
mod rate_limit;
mod routes;

pub use errors::{ApiError, EndpointResult, ErrorResponse, RateLimitedResponse};
pub use rate_limit::{RateLimitDecision, RateLimiter, client_ip, format_rate_limit_message};
pub use routes::{CardGenerationBody, DraftPayload, TranslationRequestBody};

/// Shared by every worker through `web::Data`.
pub struct AppState {
    /// `None` when no API key is configured; completion routes answer 500.
    pub completion: Option<Arc<dyn CompletionService>>,
    pub model: String,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        completion: Option<Arc<dyn CompletionService>>,
        model: impl Into<String>,
        limiter: RateLimiter,
    ) -> Self {
        Self {
            completion,
            model: model.into(),
            limiter,
        }
    }

    pub fn from_config(config: &Config, completion: Option<Arc<dyn CompletionService>>) -> Self {
        Self::new(
            completion,
            config.api.model.clone(),
            RateLimiter::new(
                config.server.rate_limit_requests,
                Duration::from_secs(config.server.rate_limit_window_seconds),
            ),
        )
    }
}

/// Registers every route; shared by [`run_server`] and tests.
pub fn configure(service: &mut web::ServiceConfig) {
    service
        .service(routes::health)
        .service(routes::translations)
        .service(routes::generate_card);
}

/// Any origin when `allowed_origins` is empty.
pub fn build_cors(allowed_origins: &[String]) -> Cors {
    let exposed = vec![
        "X-RateLimit-Limit",
        "X-RateLimit-Remaining",
        "X-RateLimit-Reset",
        "Retry-After",
    ];

    if allowed_origins.is_empty() {
        return Cors::permissive().expose_headers(exposed);
    }

    allowed_origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allow_any_method()
        .allow_any_header()
        .expose_headers(exposed)
}

pub async fn run_server(config: &Config, completion: Option<Arc<dyn CompletionService>>) -> Result<()> {
    let state = web::Data::new(AppState::from_config(config, completion));
    let allowed_origins = config.server.allowed_origins.clone();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&allowed_origins))
            .wrap(tracing_actix_web::TracingLogger::default())
            .app_data(web::PayloadConfig::new(2 * 1024 * 1024))
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.server.host.as_str(), config.server.port))?;

    info!(
        host = config.server.host.as_str(),
        port = config.server.port,
        "HTTP server initialized and running."
    );

    server.run().await?;
    Ok(())
}
