use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anki_companion::api::{CompletionRequest, CompletionService};
use anki_companion::database::DatabaseManager;
use anki_companion::drafts::DraftStore;
use anki_companion::error::{CompanionError, Result};
use anki_companion::generator::CardGenerator;
use anki_companion::models::{NoteType, Sense, UsageLevel};
use anki_companion::schemas::card_schema;
use async_trait::async_trait;
use serde_json::{Map, Value, json};

pub const TEST_MODEL: &str = "test-model";

/// Completion service answering from a queue of scripted replies and
/// recording every request it receives.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

#[allow(dead_code)]
impl ScriptedCompletion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_reply(&self, content: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(content.into()));
    }

    pub fn push_error(&self, error: CompanionError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(CompanionError::EmptyResponse))
    }
}

/// In-memory database plus a store wired to the scripted completion.
#[allow(dead_code)]
pub async fn test_store(completion: Arc<ScriptedCompletion>) -> DraftStore {
    let database = DatabaseManager::in_memory()
        .await
        .expect("in-memory database should open");
    DraftStore::new(database, Some(CardGenerator::new(completion, TEST_MODEL)))
}

#[allow(dead_code)]
pub fn sense(id: &str, translation_ru: &str) -> Sense {
    Sense {
        id: id.to_string(),
        translation_ru: translation_ru.to_string(),
        notes: Some("lock on a door".to_string()),
        part_of_speech: Some("noun".to_string()),
        usage_level: Some(UsageLevel::High),
        frequency_notes: Some("Very common: everyday word".to_string()),
        examples: vec!["Zamek się zaciął. — Замок заел.".to_string()],
    }
}

/// Valid card reply for `note_type`: every field filled with `<Field> value`,
/// except the overrides.
#[allow(dead_code)]
pub fn card_reply(note_type: NoteType, overrides: &[(&str, &str)]) -> String {
    let mut fields = Map::new();
    for name in card_schema(note_type).field_names() {
        let value = overrides
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value.to_string())
            .unwrap_or_else(|| format!("{name} value"));
        fields.insert(name.to_string(), Value::String(value));
    }
    Value::Object(fields).to_string()
}

/// Translation entry for `zamek [do drzwi]` with two senses.
#[allow(dead_code)]
pub fn zamek_translation_reply() -> String {
    json!({
        "raw_input": "zamek [do drzwi]",
        "source_word": "zamek",
        "source_language": "pl",
        "target_language": "ru",
        "senses": [
            {
                "translation": "замок",
                "part_of_speech": "noun",
                "sense_note": "device for locking a door",
                "usage_frequency": { "level": "high", "comment": "everyday word" },
                "examples": [
                    { "pl": "Zamek w drzwiach się zaciął.", "ru": "Замок в двери заел." }
                ]
            },
            {
                "translation": "дворец",
                "part_of_speech": "noun",
                "sense_note": "castle",
                "usage_frequency": { "level": "medium" },
                "examples": []
            }
        ]
    })
    .to_string()
}
