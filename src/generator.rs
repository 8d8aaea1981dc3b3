use std::sync::Arc;

use tracing::{debug, info};

use crate::api::{CompletionRequest, CompletionService, RequestMessage, parse_completion_json};
use crate::error::Result;
use crate::models::{CardRequest, GeneratedCard, NoteType, now_timestamp};
use crate::schemas::card_schema;

pub struct CardGenerator {
    completion: Arc<dyn CompletionService>,
    model: String,
}

impl CardGenerator {
    pub fn new(completion: Arc<dyn CompletionService>, model: impl Into<String>) -> Self {
        Self {
            completion,
            model: model.into(),
        }
    }

    pub fn build_request(&self, draft: CardRequest<'_>) -> CompletionRequest {
        let schema = card_schema(draft.note_type);

        CompletionRequest::new(
            self.model.clone(),
            vec![
                RequestMessage::system(build_card_system_prompt(
                    draft.note_type,
                    &schema.system_prompt(),
                )),
                RequestMessage::user(build_card_user_prompt(draft)),
            ],
            schema.json_schema(),
        )
    }

    /// Validation failures are returned as-is; nothing here retries.
    pub async fn generate_card(&self, draft: CardRequest<'_>) -> Result<GeneratedCard> {
        let schema = card_schema(draft.note_type);
        let request = self.build_request(draft);

        let content = self.completion.complete(&request).await?;
        debug!(bytes = content.len(), "Card completion received.");

        let parsed = parse_completion_json(&content)?;
        let fields = schema.validate(&parsed)?;

        info!(
            term = draft.term,
            note_type = %draft.note_type,
            schema = schema.name,
            "Card generated."
        );

        Ok(GeneratedCard {
            note_type: draft.note_type,
            fields,
            schema_name: schema.name.to_string(),
            generated_at: now_timestamp(),
        })
    }
}

fn build_card_system_prompt(note_type: NoteType, guidance: &str) -> String {
    format!(
        "You are an assistant that prepares structured Anki notes.\n\
         Note type: {note_type}.\n\
         Goal: Fill every field from the schema provided to you while staying faithful to the selected sense.\n\
         Guidance: {guidance}\n\
         Rules:\n\
         1. Never invent meanings outside the supplied translation or sense note.\n\
         2. Always output valid JSON only (no markdown or extra commentary).\n\
         3. Use concise, natural sentences and keep languages consistent."
    )
}

/// Term, language, translation, note and part of speech; nothing else from the sense is sent.
fn build_card_user_prompt(draft: CardRequest<'_>) -> String {
    format!(
        "Source word: {}\n\
         Language: {}\n\
         Sense translation (Ru): {}\n\
         Sense note: {}\n\
         Part of speech: {}\n",
        draft.term,
        draft.language.name(),
        draft.sense.translation_ru,
        draft.sense.notes.as_deref().unwrap_or("Not provided"),
        draft.sense.part_of_speech.as_deref().unwrap_or("Unknown"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Language, Sense, UsageLevel};

    fn sense() -> Sense {
        Sense {
            id: "zamek-1".to_string(),
            translation_ru: "замок".to_string(),
            notes: None,
            part_of_speech: None,
            usage_level: Some(UsageLevel::High),
            frequency_notes: Some("Very common: основное значение".to_string()),
            examples: vec!["Zamek się zaciął. — Замок заел.".to_string()],
        }
    }

    #[test]
    fn user_prompt_only_carries_the_allowed_context() {
        let sense = sense();
        let prompt = build_card_user_prompt(CardRequest {
            term: "zamek",
            language: Language::Pl,
            note_type: NoteType::PlDefault,
            sense: &sense,
        });

        assert_eq!(
            prompt,
            "Source word: zamek\nLanguage: Polish\nSense translation (Ru): замок\nSense note: Not provided\nPart of speech: Unknown\n"
        );
        assert!(!prompt.contains("основное"));
        assert!(!prompt.contains("Zamek się"));
    }

    #[test]
    fn system_prompt_names_the_note_type() {
        let prompt = build_card_system_prompt(NoteType::PlVerb, "conjugate");
        assert!(prompt.contains("Note type: PL: Verb."));
        assert!(prompt.contains("Guidance: conjugate"));
    }
}
