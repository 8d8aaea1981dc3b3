use thiserror::Error;

use crate::models::{Language, NoteType};

pub type Result<T, E = CompanionError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CompanionError {
    /// The provider could not be reached (includes client-side timeouts).
    #[error("Completion service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Completion service request failed: {status} {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Completion service returned an empty response")]
    EmptyResponse,

    #[error("Unable to parse completion service response: {0}")]
    ResponseParse(#[source] serde_json::Error),

    #[error("Invalid value at `{path}`: {reason}")]
    Validation { path: String, reason: String },

    #[error("Unsupported note type: {0}")]
    UnsupportedNoteType(String),

    #[error("Note type {note_type} is not available for language {language}")]
    NoteTypeNotAllowed {
        note_type: NoteType,
        language: Language,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Select at least one draft to export")]
    EmptySelection,

    #[error("No generated cards to export")]
    NoReadyCards,

    #[error("No drafts to export")]
    EmptyDraftList,

    #[error("Draft {0} is missing generated card")]
    MissingCard(i64),

    #[error("Completion service is not configured (missing OPENAI_API_KEY)")]
    NotConfigured,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Stored record {table}#{id} could not be decoded: {reason}")]
    CorruptRecord {
        table: &'static str,
        id: i64,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV encoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompanionError {
    pub fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn draft_not_found(id: i64) -> Self {
        Self::NotFound { entity: "Draft", id }
    }

    /// Network failures and non-success provider statuses.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::UpstreamStatus { .. })
    }

    /// Status reported by the provider, if the failure carried one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::UpstreamStatus { status, .. } => Some(*status),
            Self::Transport(error) => error.status().map(|status| status.as_u16()),
            _ => None,
        }
    }
}
