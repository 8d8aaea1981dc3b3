use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::api::{
    CompletionRequest, CompletionService, JsonSchemaFormat, RequestMessage, parse_completion_json,
};
use crate::error::{CompanionError, Result};
use crate::models::{Language, Sense, UsageLevel};

/// Joins an example sentence with its Russian translation.
pub const EXAMPLE_SEPARATOR: &str = " — ";

static BRACKET_HINT: LazyLock<Regex> = LazyLock::new(|| {
    // An unterminated `[` swallows the rest of the input.
    Regex::new(r"\[([^\]]*)(?:\]|$)").expect("bracket hint pattern is valid")
});

/// User input split into the lemma and the disambiguation hint(s) in square brackets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketedInput {
    pub lemma: String,
    pub hint: Option<String>,
}

pub fn strip_bracket_hint(raw_input: &str) -> BracketedInput {
    let hints: Vec<&str> = BRACKET_HINT
        .captures_iter(raw_input)
        .filter_map(|captures| captures.get(1))
        .map(|hint| hint.as_str().trim())
        .filter(|hint| !hint.is_empty())
        .collect();

    let without_hints = BRACKET_HINT.replace_all(raw_input, " ");
    let lemma = without_hints.split_whitespace().collect::<Vec<_>>().join(" ");

    BracketedInput {
        lemma,
        hint: (!hints.is_empty()).then(|| hints.join("; ")),
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UsageFrequency {
    pub level: UsageLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum TranslatedExample {
    Polish { pl: String, ru: String },
    English { en: String, ru: String },
}

impl TranslatedExample {
    pub fn source(&self) -> &str {
        match self {
            TranslatedExample::Polish { pl, .. } => pl,
            TranslatedExample::English { en, .. } => en,
        }
    }

    pub fn russian(&self) -> &str {
        match self {
            TranslatedExample::Polish { ru, .. } | TranslatedExample::English { ru, .. } => ru,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TranslationSense {
    pub translation: String,
    #[serde(default)]
    pub part_of_speech: Option<String>,
    #[serde(default)]
    pub sense_note: Option<String>,
    #[serde(default)]
    pub usage_frequency: Option<UsageFrequency>,
    #[serde(default)]
    pub examples: Vec<TranslatedExample>,
}

/// The lookup payload exactly as the completion service shapes it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TranslationEntry {
    pub raw_input: String,
    pub source_word: String,
    pub source_language: String,
    pub target_language: String,
    #[serde(default)]
    pub senses: Vec<TranslationSense>,
}

/// Result of one lookup, normalised into [`Sense`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct SenseResolution {
    pub raw_input: String,
    pub term: String,
    pub language: Language,
    pub hint: Option<String>,
    pub senses: Vec<Sense>,
}

pub struct SenseResolver {
    completion: Arc<dyn CompletionService>,
    model: String,
}

impl SenseResolver {
    pub fn new(completion: Arc<dyn CompletionService>, model: impl Into<String>) -> Self {
        Self {
            completion,
            model: model.into(),
        }
    }

    pub fn build_request(&self, raw_input: &str, language: Language) -> CompletionRequest {
        CompletionRequest::new(
            self.model.clone(),
            vec![
                RequestMessage::system(build_system_prompt(language)),
                RequestMessage::user(raw_input),
            ],
            translation_schema(language),
        )
    }

    /// Runs the lookup and checks the reply against the translation entry shape.
    pub async fn request_translation(
        &self,
        raw_input: &str,
        language: Language,
    ) -> Result<TranslationEntry> {
        let request = self.build_request(raw_input, language);
        let content = self.completion.complete(&request).await?;

        let value = parse_completion_json(&content)?;
        let entry: TranslationEntry = serde_json::from_value(value)
            .map_err(|error| CompanionError::validation("$", error.to_string()))?;

        if entry.target_language != "ru" {
            return Err(CompanionError::validation(
                "$.target_language",
                format!("expected `ru`, got `{}`", entry.target_language),
            ));
        }
        if entry.source_language.parse::<Language>().is_err() {
            return Err(CompanionError::validation(
                "$.source_language",
                format!("expected `pl` or `en`, got `{}`", entry.source_language),
            ));
        }

        debug!(
            source_word = entry.source_word.as_str(),
            senses = entry.senses.len(),
            "Translation entry received."
        );
        Ok(entry)
    }

    /// An empty sense list means the input was not recognised as a word; that is not an error.
    pub async fn resolve_senses(
        &self,
        raw_input: &str,
        language: Language,
    ) -> Result<SenseResolution> {
        let bracketed = strip_bracket_hint(raw_input);
        let entry = self.request_translation(raw_input, language).await?;
        let resolution = normalize_entry(entry, language, bracketed);

        info!(
            term = resolution.term.as_str(),
            language = %language,
            senses = resolution.senses.len(),
            "Senses resolved."
        );
        Ok(resolution)
    }
}

fn normalize_entry(
    entry: TranslationEntry,
    language: Language,
    bracketed: BracketedInput,
) -> SenseResolution {
    // The model is asked for a clean lemma; strip again in case it echoed the hint.
    let model_lemma = strip_bracket_hint(&entry.source_word).lemma;
    let term = if model_lemma.is_empty() {
        bracketed.lemma
    } else {
        model_lemma
    };

    let senses = entry
        .senses
        .into_iter()
        .enumerate()
        .map(|(index, sense)| to_sense(&term, index, sense))
        .collect();

    SenseResolution {
        raw_input: entry.raw_input,
        term,
        language,
        hint: bracketed.hint,
        senses,
    }
}

fn to_sense(term: &str, index: usize, sense: TranslationSense) -> Sense {
    Sense {
        id: format!("{}-{}", term, index + 1),
        translation_ru: sense.translation,
        notes: non_empty(sense.sense_note),
        part_of_speech: non_empty(sense.part_of_speech),
        usage_level: sense.usage_frequency.as_ref().map(|frequency| frequency.level),
        frequency_notes: sense.usage_frequency.as_ref().map(frequency_notes),
        examples: sense
            .examples
            .iter()
            .map(|example| format!("{}{}{}", example.source(), EXAMPLE_SEPARATOR, example.russian()))
            .collect(),
    }
}

pub fn frequency_notes(frequency: &UsageFrequency) -> String {
    match frequency.comment.as_deref().map(str::trim) {
        Some(comment) if !comment.is_empty() => {
            format!("{}: {}", frequency.level.description(), comment)
        }
        _ => frequency.level.description().to_string(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

fn build_system_prompt(language: Language) -> String {
    let name = language.name();
    format!(
        "You are a bilingual lexicographer ({name} -> Russian).\n\
         \n\
         The input may carry a hint in square brackets, e.g. 'zamek [do drzwi]' or 'zamek [warownia]'.\n\
         Everything inside square brackets is disambiguation context ONLY: use it to pick the right sense, \
         never echo it in any field. source_word MUST be the clean {name} lemma without brackets or their content.\n\
         \n\
         Task:\n\
         Given one {name} word or short phrase, produce Russian translations.\n\
         Return one sense entry per distinct meaning.\n\
         If the input is not a valid {name} word or phrase, return an empty senses array.\n\
         Give 2 example sentences in {name} with Russian translations for every sense.\n\
         Output MUST be valid JSON ONLY, matching the schema exactly. No prose, no markdown."
    )
}

pub fn translation_schema(language: Language) -> JsonSchemaFormat {
    let code = language.code();
    let name = language.name();

    JsonSchemaFormat {
        name: format!("simple_translation_entry_{code}"),
        strict: true,
        schema: json!({
            "type": "object",
            "properties": {
                "raw_input": {
                    "type": "string",
                    "description": "Original user text exactly as entered, including brackets and context."
                },
                "source_word": {
                    "type": "string",
                    "description": format!("{name} lemma stripped of brackets and bracketed hints.")
                },
                "source_language": {
                    "type": "string",
                    "enum": [code],
                    "description": format!("Source language code ({name}).")
                },
                "target_language": {
                    "type": "string",
                    "enum": ["ru"],
                    "description": "Target language code (Russian)."
                },
                "senses": {
                    "type": "array",
                    "description": "List of sense entries with Russian translations.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "translation": {
                                "type": "string",
                                "description": "Russian translation for this sense."
                            },
                            "part_of_speech": {
                                "type": ["string", "null"],
                                "description": format!("Part of speech label (e.g. noun, verb, adj) in {name}.")
                            },
                            "sense_note": {
                                "type": ["string", "null"],
                                "description": "Short Russian gloss clarifying nuance."
                            },
                            "usage_frequency": {
                                "type": "object",
                                "description": "Frequency metadata describing sense prevalence.",
                                "properties": {
                                    "level": {
                                        "type": "string",
                                        "enum": ["low", "medium", "high"],
                                        "description": "Relative frequency bucket."
                                    },
                                    "comment": {
                                        "type": "string",
                                        "description": "Russian remark elaborating on usage frequency."
                                    }
                                },
                                "required": ["level", "comment"],
                                "additionalProperties": false
                            },
                            "examples": {
                                "type": "array",
                                "description": "Example sentences with translations.",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        code: {
                                            "type": "string",
                                            "description": format!("Sentence in {name}.")
                                        },
                                        "ru": {
                                            "type": "string",
                                            "description": "Russian translation of the sentence."
                                        }
                                    },
                                    "required": [code, "ru"],
                                    "additionalProperties": false
                                }
                            }
                        },
                        "required": ["translation", "part_of_speech", "sense_note", "usage_frequency", "examples"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["raw_input", "source_word", "source_language", "target_language", "senses"],
            "additionalProperties": false
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bracket_hint_is_split_from_lemma() {
        assert_eq!(
            strip_bracket_hint("zamek [do drzwi]"),
            BracketedInput {
                lemma: "zamek".to_string(),
                hint: Some("do drzwi".to_string()),
            }
        );
        assert_eq!(strip_bracket_hint("  break   up ").lemma, "break up");
        assert_eq!(strip_bracket_hint("break up").hint, None);
        assert_eq!(strip_bracket_hint("[hint] bank [river]").hint.as_deref(), Some("hint; river"));
        assert_eq!(strip_bracket_hint("zamek [do drz").lemma, "zamek");
    }

    #[test]
    fn frequency_notes_relabel_level_and_append_comment() {
        let with_comment = UsageFrequency {
            level: UsageLevel::High,
            comment: Some("основное значение".to_string()),
        };
        assert_eq!(frequency_notes(&with_comment), "Very common: основное значение");

        let bare = UsageFrequency {
            level: UsageLevel::Low,
            comment: Some("  ".to_string()),
        };
        assert_eq!(frequency_notes(&bare), "Rarely used");
    }

    #[test]
    fn entry_is_normalised_into_senses() {
        let entry: TranslationEntry = serde_json::from_value(json!({
            "raw_input": "zamek [do drzwi]",
            "source_word": "zamek",
            "source_language": "pl",
            "target_language": "ru",
            "senses": [{
                "translation": "замок",
                "part_of_speech": "rzeczownik",
                "sense_note": "",
                "usage_frequency": { "level": "medium", "comment": "" },
                "examples": [{ "pl": "Zamek się zaciął.", "ru": "Замок заел." }]
            }]
        }))
        .unwrap();

        let resolution = normalize_entry(entry, Language::Pl, strip_bracket_hint("zamek [do drzwi]"));
        assert_eq!(resolution.term, "zamek");
        assert_eq!(resolution.hint.as_deref(), Some("do drzwi"));

        let sense = &resolution.senses[0];
        assert_eq!(sense.id, "zamek-1");
        assert_eq!(sense.translation_ru, "замок");
        assert_eq!(sense.notes, None);
        assert_eq!(sense.part_of_speech.as_deref(), Some("rzeczownik"));
        assert_eq!(sense.usage_level, Some(UsageLevel::Medium));
        assert_eq!(sense.frequency_notes.as_deref(), Some("Moderately common"));
        assert_eq!(sense.examples, vec!["Zamek się zaciął. — Замок заел.".to_string()]);
    }

    #[test]
    fn echoed_hint_in_source_word_is_stripped() {
        let entry = TranslationEntry {
            raw_input: "bank [river]".to_string(),
            source_word: "bank [river]".to_string(),
            source_language: "en".to_string(),
            target_language: "ru".to_string(),
            senses: vec![],
        };

        let resolution = normalize_entry(entry, Language::En, strip_bracket_hint("bank [river]"));
        assert_eq!(resolution.term, "bank");
        assert!(resolution.senses.is_empty());
    }

    #[test]
    fn schema_is_language_specific() {
        let schema = translation_schema(Language::En);
        assert_eq!(schema.name, "simple_translation_entry_en");
        let example_required =
            &schema.schema["properties"]["senses"]["items"]["properties"]["examples"]["items"]["required"];
        assert_eq!(example_required, &json!(["en", "ru"]));
    }
}
