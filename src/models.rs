use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CompanionError;

/// Source side of the language pair; the target is always Russian.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    #[serde(rename = "EN", alias = "en")]
    En,
    #[serde(rename = "PL", alias = "pl")]
    Pl,
}

impl Language {
    pub const fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Pl => "pl",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Language::En => "EN",
            Language::Pl => "PL",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Pl => "Polish",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "pl" => Ok(Language::Pl),
            other => Err(format!("unknown language `{other}` (expected en or pl)")),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteType {
    #[serde(rename = "EN: Default")]
    EnDefault,
    #[serde(rename = "PL: Default")]
    PlDefault,
    #[serde(rename = "PL: Verb")]
    PlVerb,
}

impl NoteType {
    pub const ALL: [NoteType; 3] = [NoteType::EnDefault, NoteType::PlDefault, NoteType::PlVerb];

    pub const fn label(self) -> &'static str {
        match self {
            NoteType::EnDefault => "EN: Default",
            NoteType::PlDefault => "PL: Default",
            NoteType::PlVerb => "PL: Verb",
        }
    }

    pub const fn language(self) -> Language {
        match self {
            NoteType::EnDefault => Language::En,
            NoteType::PlDefault | NoteType::PlVerb => Language::Pl,
        }
    }
}

impl fmt::Display for NoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for NoteType {
    type Err = CompanionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NoteType::ALL
            .into_iter()
            .find(|note_type| note_type.label() == value)
            .ok_or_else(|| CompanionError::UnsupportedNoteType(value.to_string()))
    }
}

/// First entry is the default for new drafts.
pub const fn note_types_for_language(language: Language) -> &'static [NoteType] {
    match language {
        Language::En => &[NoteType::EnDefault],
        Language::Pl => &[NoteType::PlDefault, NoteType::PlVerb],
    }
}

pub fn default_note_type(language: Language) -> NoteType {
    note_types_for_language(language)
        .first()
        .copied()
        .unwrap_or(NoteType::EnDefault)
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UsageLevel {
    Low,
    Medium,
    High,
}

impl UsageLevel {
    pub const fn description(self) -> &'static str {
        match self {
            UsageLevel::Low => "Rarely used",
            UsageLevel::Medium => "Moderately common",
            UsageLevel::High => "Very common",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sense {
    pub id: String,
    #[serde(rename = "translationRU")]
    pub translation_ru: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_of_speech: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_level: Option<UsageLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_notes: Option<String>,
    #[serde(default)]
    pub examples: Vec<String>,
}

/// Field name to value, kept in schema order.
pub type CardFields = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedCard {
    pub note_type: NoteType,
    pub fields: CardFields,
    pub schema_name: String,
    pub generated_at: String,
}

impl GeneratedCard {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|value| value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftState {
    Pending,
    Ready,
    Exported,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub id: i64,
    pub term: String,
    pub language: Language,
    pub note_type: NoteType,
    pub sense: Sense,
    pub card: Option<GeneratedCard>,
    pub exported: bool,
    pub exported_at: Option<String>,
}

impl Draft {
    pub fn state(&self) -> DraftState {
        match (&self.card, self.exported) {
            (None, _) => DraftState::Pending,
            (Some(_), false) => DraftState::Ready,
            (Some(_), true) => DraftState::Exported,
        }
    }

    pub fn card_request(&self) -> CardRequest<'_> {
        CardRequest {
            term: &self.term,
            language: self.language,
            note_type: self.note_type,
            sense: &self.sense,
        }
    }
}

/// The only draft context that reaches the card generator.
#[derive(Debug, Clone, Copy)]
pub struct CardRequest<'a> {
    pub term: &'a str,
    pub language: Language,
    pub note_type: NoteType,
    pub sense: &'a Sense,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFile {
    pub note_type: NoteType,
    pub file_name: String,
    pub created_at: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportGroup {
    pub id: i64,
    pub created_at: String,
    pub draft_ids: Vec<i64>,
    pub words: Vec<String>,
    pub files: Vec<ExportedFile>,
}

/// ISO-8601 in UTC with millisecond precision, e.g. `2024-01-01T00:00:00.000Z`.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
