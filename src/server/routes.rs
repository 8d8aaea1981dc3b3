use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, get, post, web};
use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use super::AppState;
use super::errors::{ApiError, EndpointResult, apply_rate_limit_headers};
use super::rate_limit::{RateLimitDecision, client_ip};
use crate::api::CompletionService;
use crate::generator::CardGenerator;
use crate::models::{CardRequest, Language, NoteType, Sense};
use crate::senses::SenseResolver;

const INVALID_TRANSLATION_REQUEST: &str = "Invalid translation request";
const INVALID_CARD_REQUEST: &str = "Invalid card generation request";

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Lookups name the language in lower case (`pl`, `en`).
fn lowercase_language<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Language, D::Error> {
    match String::deserialize(deserializer)?.as_str() {
        "pl" => Ok(Language::Pl),
        "en" => Ok(Language::En),
        other => Err(de::Error::invalid_value(Unexpected::Str(other), &"`pl` or `en`")),
    }
}

/// Drafts carry the stored upper-case form (`PL`, `EN`).
fn uppercase_language<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Language, D::Error> {
    match String::deserialize(deserializer)?.as_str() {
        "PL" => Ok(Language::Pl),
        "EN" => Ok(Language::En),
        other => Err(de::Error::invalid_value(Unexpected::Str(other), &"`PL` or `EN`")),
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRequestBody {
    pub raw_input: String,
    #[serde(deserialize_with = "lowercase_language")]
    pub source_language: Language,
}

#[derive(Deserialize, Debug)]
pub struct CardGenerationBody {
    pub draft: DraftPayload,
}

/// Draft as sent by a client that keeps its own store.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DraftPayload {
    pub term: String,
    #[serde(deserialize_with = "uppercase_language")]
    pub language: Language,
    pub note_type: NoteType,
    pub sense: Sense,
}

impl DraftPayload {
    fn validate(&self) -> Result<(), ApiError> {
        let required = [
            ("term", self.term.as_str()),
            ("sense.id", self.sense.id.as_str()),
            ("sense.translationRU", self.sense.translation_ru.as_str()),
        ];

        match required.iter().find(|(_, value)| value.is_empty()) {
            Some((field, _)) => Err(ApiError::field_error(
                INVALID_CARD_REQUEST,
                field,
                format!("{field} is required"),
            )),
            None => Ok(()),
        }
    }

    fn as_card_request(&self) -> CardRequest<'_> {
        CardRequest {
            term: &self.term,
            language: self.language,
            note_type: self.note_type,
            sense: &self.sense,
        }
    }
}

fn enforce_rate_limit(state: &AppState, request: &HttpRequest) -> Result<RateLimitDecision, ApiError> {
    let client = client_ip(request);
    let decision = state.limiter.check(&client);

    if !decision.allowed {
        debug!(client = client.as_str(), "Rate limit exceeded.");
        return Err(ApiError::RateLimited(decision));
    }

    Ok(decision)
}

fn require_completion(state: &AppState) -> Result<Arc<dyn CompletionService>, ApiError> {
    state.completion.clone().ok_or(ApiError::MissingApiKey)
}

fn parse_body<'de, T: Deserialize<'de>>(body: &'de [u8], message: &'static str) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|error| ApiError::form_error(message, error.to_string()))
}

fn json_ok<T: Serialize>(decision: &RateLimitDecision, payload: &T) -> HttpResponse {
    let mut builder = HttpResponse::Ok();
    apply_rate_limit_headers(&mut builder, decision);
    builder.json(payload)
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse { status: "ok" })
}

/// Returns the raw translation entry; clients normalise it into senses.
#[post("/api/translations")]
pub async fn translations(
    state: web::Data<AppState>,
    request: HttpRequest,
    body: web::Bytes,
) -> EndpointResult {
    let decision = enforce_rate_limit(&state, &request)?;
    let completion = require_completion(&state)?;

    let payload: TranslationRequestBody = parse_body(&body, INVALID_TRANSLATION_REQUEST)?;
    let raw_input = payload.raw_input.trim();
    if raw_input.is_empty() {
        return Err(ApiError::field_error(
            INVALID_TRANSLATION_REQUEST,
            "rawInput",
            "rawInput is required",
        ));
    }

    let resolver = SenseResolver::new(completion, state.model.clone());
    let entry = resolver
        .request_translation(raw_input, payload.source_language)
        .await?;

    Ok(json_ok(&decision, &entry))
}

#[post("/api/cards/generate")]
pub async fn generate_card(
    state: web::Data<AppState>,
    request: HttpRequest,
    body: web::Bytes,
) -> EndpointResult {
    let decision = enforce_rate_limit(&state, &request)?;
    let completion = require_completion(&state)?;

    let payload: CardGenerationBody = parse_body(&body, INVALID_CARD_REQUEST)?;
    payload.draft.validate()?;

    let generator = CardGenerator::new(completion, state.model.clone());
    let card = generator
        .generate_card(payload.draft.as_card_request())
        .await?;

    Ok(json_ok(&decision, &card))
}
