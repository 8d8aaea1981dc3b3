use actix_web::body::BoxBody;
use actix_web::http::StatusCode;
use actix_web::http::header::RETRY_AFTER;
use actix_web::{HttpResponse, HttpResponseBuilder, ResponseError};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::error;

use super::rate_limit::{RateLimitDecision, format_rate_limit_message};
use crate::error::CompanionError;

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitedResponse {
    pub error: String,
    pub retry_after_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body failed validation; `details` lists field and form errors.
    #[error("{message}")]
    InvalidRequest {
        message: &'static str,
        details: Value,
    },

    #[error("Server missing OPENAI_API_KEY")]
    MissingApiKey,

    #[error("Rate limit exceeded")]
    RateLimited(RateLimitDecision),

    #[error(transparent)]
    Companion(#[from] CompanionError),
}

impl ApiError {
    pub fn invalid_request(message: &'static str, details: Value) -> Self {
        Self::InvalidRequest { message, details }
    }

    /// `{fieldErrors: {<field>: [<reason>]}, formErrors: []}`
    pub fn field_error(message: &'static str, field: &str, reason: impl Into<String>) -> Self {
        Self::invalid_request(
            message,
            json!({ "fieldErrors": { field: [reason.into()] }, "formErrors": [] }),
        )
    }

    /// `{fieldErrors: {}, formErrors: [<reason>]}`
    pub fn form_error(message: &'static str, reason: impl Into<String>) -> Self {
        Self::invalid_request(
            message,
            json!({ "fieldErrors": {}, "formErrors": [reason.into()] }),
        )
    }
}

/// Adds `X-RateLimit-*` headers describing the caller's window.
pub fn apply_rate_limit_headers(builder: &mut HttpResponseBuilder, decision: &RateLimitDecision) {
    let reset_at = chrono::Utc::now().timestamp() + decision.retry_after_seconds() as i64;

    builder
        .insert_header(("X-RateLimit-Limit", decision.limit.to_string()))
        .insert_header(("X-RateLimit-Remaining", decision.remaining.to_string()))
        .insert_header(("X-RateLimit-Reset", reset_at.to_string()));
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::MissingApiKey => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Companion(error) => error
                .upstream_status()
                .and_then(|status| StatusCode::from_u16(status).ok())
                .filter(|status| status.is_client_error() || status.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        match self {
            Self::InvalidRequest { message, details } => {
                HttpResponse::BadRequest().json(ErrorResponse {
                    error: message.to_string(),
                    details: Some(details.clone()),
                })
            }
            Self::MissingApiKey => {
                error!("Completion request rejected, no API key configured.");

                HttpResponse::InternalServerError().json(ErrorResponse {
                    error: self.to_string(),
                    details: None,
                })
            }
            Self::RateLimited(decision) => {
                let retry_after_seconds = decision.retry_after_seconds();

                let mut builder = HttpResponse::TooManyRequests();
                apply_rate_limit_headers(&mut builder, decision);
                builder
                    .insert_header((RETRY_AFTER, retry_after_seconds.to_string()))
                    .json(RateLimitedResponse {
                        error: format_rate_limit_message(Some(retry_after_seconds as f64)),
                        retry_after_seconds,
                    })
            }
            Self::Companion(companion_error) => {
                error!(error = %companion_error, "Completion request failed.");

                HttpResponse::build(self.status_code()).json(ErrorResponse {
                    error: companion_error.to_string(),
                    details: None,
                })
            }
        }
    }
}

pub type EndpointResult = Result<HttpResponse, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn upstream_status_is_passed_through() {
        let error = ApiError::from(CompanionError::UpstreamStatus {
            status: 401,
            body: "bad key".to_string(),
        });
        assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);

        let error = ApiError::from(CompanionError::EmptyResponse);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rate_limited_response_carries_retry_headers() {
        let error = ApiError::RateLimited(RateLimitDecision {
            allowed: false,
            limit: 20,
            remaining: 0,
            reset_after: Duration::from_millis(12_300),
        });

        let response = error.error_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "13");
        assert_eq!(response.headers().get("X-RateLimit-Limit").unwrap(), "20");
        assert_eq!(response.headers().get("X-RateLimit-Remaining").unwrap(), "0");
        assert!(response.headers().contains_key("X-RateLimit-Reset"));
    }
}
