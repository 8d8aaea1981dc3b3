//! Per-note-type field sets, the JSON schema sent to the completion
//! service and the validator applied to whatever comes back.

use serde_json::{Map, Value, json};

use crate::api::JsonSchemaFormat;
use crate::error::{CompanionError, Result};
use crate::models::{CardFields, NoteType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub description: &'static str,
}

const fn field(name: &'static str, description: &'static str) -> FieldSpec {
    FieldSpec { name, description }
}

#[derive(Debug)]
pub struct CardSchema {
    pub note_type: NoteType,
    /// Stable identity, reported as `schemaName` on generated cards.
    pub name: &'static str,
    /// Note-type specific instructions embedded in the system prompt.
    pub guidance: &'static str,
    pub fields: &'static [FieldSpec],
}

const MASKING_RULES: &str = "\
For EACH example also produce a masked copy in which EVERY standalone occurrence of the exact Source word is replaced by underscores:
  - one underscore per character of the Source word;
  - a multi-word Source word is masked word by word, keeping single spaces between the groups (\"break up\" -> \"_____ __\", \"Masz rację\" -> \"____ _____\");
  - all punctuation and spacing outside the masked tokens stays untouched.";

const EN_DEFAULT_GUIDANCE: &str = concat!(
    "You are a bilingual lexicographer (English -> Russian) working on ONE specific sense.\n",
    "Use ONLY the supplied context (Source word, Language, Sense translation (Ru), Sense note, Part of speech) and mirror that meaning in every field. ",
    "When a value cannot be supported without guessing, emit an empty string.\n",
    "1) Write EXACTLY TWO natural English example sentences that unambiguously express THIS sense, each with a faithful Russian translation.\n",
    "2) ",
);

const PL_DEFAULT_GUIDANCE: &str = concat!(
    "You are a bilingual lexicographer (Polish -> Russian) working on ONE specific sense.\n",
    "Use ONLY the supplied context (Source word, Language, Sense translation (Ru), Sense note, Part of speech) and mirror that meaning in every field. ",
    "When a value cannot be supported without guessing, emit an empty string.\n",
    "1) Write EXACTLY TWO natural Polish example sentences that unambiguously express THIS sense, each with a faithful Russian translation. Verbs stay in the infinitive as supplied.\n",
    "2) ",
);

const PL_VERB_GUIDANCE: &str = concat!(
    "You are a bilingual lexicographer (Polish -> Russian) producing the conjugation paradigm of ONE specific verb sense.\n",
    "Use ONLY the supplied context (Source word, Language, Sense translation (Ru), Sense note, Part of speech). ",
    "If the word is not a conjugable Polish verb, leave the form fields empty instead of inventing forms.\n",
    "1) Fill every present-tense and past-tense slot of the schema using standard Polish conjugation, orthography and diacritics, keeping to THIS sense.\n",
    "2) For EACH form write EXACTLY ONE natural Polish sentence that uses that exact form.\n",
    "Output MUST be valid JSON ONLY, matching the requested schema exactly. No prose, no markdown.",
);

static EN_DEFAULT_FIELDS: [FieldSpec; 12] = [
    field("Word", "Source English word or phrase."),
    field(
        "IPA",
        "US IPA transcription wrapped in slashes, for example /ˈskedʒ.uːl/.",
    ),
    field("Definition", "English definition matching the provided sense."),
    field("Translation", "Russian translation of the word."),
    field("Example1", "English sentence using the lemma exactly as supplied."),
    field(
        "Example1Spaces",
        "Example1 with the lemma replaced by underscores (one per character, separate groups for each word of a phrase).",
    ),
    field("Example1RU", "Russian translation of Example1."),
    field("Example2", "Another English sentence under the same constraints as Example1."),
    field(
        "Example2Spaces",
        "Example2 with the lemma replaced by underscores (one per character, separate groups for each word of a phrase).",
    ),
    field("Example2RU", "Russian translation of Example2."),
    field("Synonym", "Comma-separated English synonyms, or an empty string."),
    field("Antonym", "Comma-separated English antonyms, or an empty string."),
];

static PL_DEFAULT_FIELDS: [FieldSpec; 11] = [
    field("Word", "Source Polish word or phrase."),
    field("Definition", "Polish definition matching the provided sense."),
    field("Translation", "Russian translation of the word or phrase."),
    field(
        "Example1",
        "Polish sentence using the lemma exactly as supplied; verbs keep the infinitive.",
    ),
    field(
        "Example1Spaces",
        "Example1 with the lemma replaced by underscores (one per character, separate groups for each word of a phrase).",
    ),
    field("Example1RU", "Russian translation of Example1."),
    field("Example2", "Another Polish sentence under the same constraints as Example1."),
    field(
        "Example2Spaces",
        "Example2 with the lemma replaced by underscores (one per character, separate groups for each word of a phrase).",
    ),
    field("Example2RU", "Russian translation of Example2."),
    field("Synonym", "Comma-separated Polish synonyms, or an empty string."),
    field("Antonym", "Comma-separated Polish antonyms, or an empty string."),
];

static PL_VERB_FIELDS: [FieldSpec; 39] = [
    field("Verb", "Original Polish verb or chunk."),
    field("Definition", "Polish definition matching the sense."),
    field("Translation", "Russian translation of the verb."),
    // present tense
    field("FormJa", "Present tense, singular, first person (ja)."),
    field("ExampleFormJa", "Sentence using the verb in FormJa."),
    field("FormTy", "Present tense, singular, second person (ty)."),
    field("ExampleFormTy", "Sentence using the verb in FormTy."),
    field("FormOn", "Present tense, singular, third person masculine (on)."),
    field("ExampleFormOn", "Sentence using the verb in FormOn."),
    field("FormMy", "Present tense, plural, first person (my)."),
    field("ExampleFormMy", "Sentence using the verb in FormMy."),
    field("FormWy", "Present tense, plural, second person (wy)."),
    field("ExampleFormWy", "Sentence using the verb in FormWy."),
    field("FormOni", "Present tense, plural, third person masculine (oni)."),
    field("ExampleFormOni", "Sentence using the verb in FormOni."),
    // past tense, masculine
    field("FormMJaPrzeszly", "Past tense, masculine, singular, first person (ja)."),
    field("ExampleFormMJaPrzeszly", "Sentence using the verb in FormMJaPrzeszly."),
    field("FormMTyPrzeszly", "Past tense, masculine, singular, second person (ty)."),
    field("ExampleFormMTyPrzeszly", "Sentence using the verb in FormMTyPrzeszly."),
    field("FormMOnPrzeszly", "Past tense, masculine, singular, third person (on)."),
    field("ExampleFormMOnPrzeszly", "Sentence using the verb in FormMOnPrzeszly."),
    field("FormMMyPrzeszly", "Past tense, masculine, plural, first person (my)."),
    field("ExampleFormMMyPrzeszly", "Sentence using the verb in FormMMyPrzeszly."),
    field("FormMWyPrzeszly", "Past tense, masculine, plural, second person (wy)."),
    field("ExampleFormMWyPrzeszly", "Sentence using the verb in FormMWyPrzeszly."),
    field("FormMOniPrzeszly", "Past tense, masculine, plural, third person (oni)."),
    field("ExampleFormMOniPrzeszly", "Sentence using the verb in FormMOniPrzeszly."),
    // past tense, feminine / non-virile
    field("FormZJaPrzeszly", "Past tense, feminine, singular, first person (ja)."),
    field("ExampleFormZJaPrzeszly", "Sentence using the verb in FormZJaPrzeszly."),
    field("FormZTyPrzeszly", "Past tense, feminine, singular, second person (ty)."),
    field("ExampleFormZTyPrzeszly", "Sentence using the verb in FormZTyPrzeszly."),
    field("FormZOnaPrzeszly", "Past tense, feminine, singular, third person (ona)."),
    field("ExampleFormZOnaPrzeszly", "Sentence using the verb in FormZOnaPrzeszly."),
    field("FormZMyPrzeszly", "Past tense, feminine, plural, first person (my)."),
    field("ExampleFormZMyPrzeszly", "Sentence using the verb in FormZMyPrzeszly."),
    field("FormZWyPrzeszly", "Past tense, feminine, plural, second person (wy)."),
    field("ExampleFormZWyPrzeszly", "Sentence using the verb in FormZWyPrzeszly."),
    field("FormZOnePrzeszly", "Past tense, feminine, plural, third person (one)."),
    field("ExampleFormZOnePrzeszly", "Sentence using the verb in FormZOnePrzeszly."),
];

static EN_DEFAULT_SCHEMA: CardSchema = CardSchema {
    note_type: NoteType::EnDefault,
    name: "en_default_note",
    guidance: EN_DEFAULT_GUIDANCE,
    fields: &EN_DEFAULT_FIELDS,
};

static PL_DEFAULT_SCHEMA: CardSchema = CardSchema {
    note_type: NoteType::PlDefault,
    name: "pl_default_note",
    guidance: PL_DEFAULT_GUIDANCE,
    fields: &PL_DEFAULT_FIELDS,
};

static PL_VERB_SCHEMA: CardSchema = CardSchema {
    note_type: NoteType::PlVerb,
    name: "pl_verb_note",
    guidance: PL_VERB_GUIDANCE,
    fields: &PL_VERB_FIELDS,
};

/// Every [`NoteType`] has exactly one schema; adding a variant fails to compile until it is registered here.
pub fn card_schema(note_type: NoteType) -> &'static CardSchema {
    match note_type {
        NoteType::EnDefault => &EN_DEFAULT_SCHEMA,
        NoteType::PlDefault => &PL_DEFAULT_SCHEMA,
        NoteType::PlVerb => &PL_VERB_SCHEMA,
    }
}

/// Lookup by the human label (`"PL: Verb"`), for callers holding an untyped note type.
pub fn card_schema_for_label(label: &str) -> Result<&'static CardSchema> {
    let note_type: NoteType = label.parse()?;
    Ok(card_schema(note_type))
}

impl CardSchema {
    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|field| field.name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.name == name)
    }

    /// Full generation guidance. The default note types share the masking rules.
    pub fn system_prompt(&self) -> String {
        match self.note_type {
            NoteType::EnDefault | NoteType::PlDefault => format!(
                "{}{}\n3) Also provide sense-appropriate synonyms and antonyms when they are safely available.\n\
                 Output MUST be valid JSON ONLY, matching the requested schema exactly. No prose, no markdown.",
                self.guidance, MASKING_RULES
            ),
            NoteType::PlVerb => self.guidance.to_string(),
        }
    }

    pub fn json_schema(&self) -> JsonSchemaFormat {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|field| {
                (
                    field.name.to_string(),
                    json!({ "type": "string", "description": field.description }),
                )
            })
            .collect();

        JsonSchemaFormat {
            name: self.name.to_string(),
            strict: true,
            schema: json!({
                "type": "object",
                "properties": properties,
                "required": self.field_names().collect::<Vec<_>>(),
                "additionalProperties": false,
            }),
        }
    }

    /// Requires exactly this schema's keys, each holding a string.
    /// The returned map is ordered like the schema, regardless of the input order.
    pub fn validate(&self, value: &Value) -> Result<CardFields> {
        let object = value
            .as_object()
            .ok_or_else(|| CompanionError::validation("$", format!("expected an object, got {}", json_kind(value))))?;

        if let Some(unexpected) = object.keys().find(|key| !self.has_field(key)) {
            return Err(CompanionError::validation(
                format!("$.{unexpected}"),
                format!("unexpected field for {}", self.note_type),
            ));
        }

        let mut fields = CardFields::new();
        for spec in self.fields {
            match object.get(spec.name) {
                Some(Value::String(text)) => {
                    fields.insert(spec.name.to_string(), Value::String(text.clone()));
                }
                Some(other) => {
                    return Err(CompanionError::validation(
                        format!("$.{}", spec.name),
                        format!("expected a string, got {}", json_kind(other)),
                    ));
                }
                None => {
                    return Err(CompanionError::validation(
                        format!("$.{}", spec.name),
                        "required field is missing",
                    ));
                }
            }
        }

        Ok(fields)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn complete_payload(schema: &CardSchema) -> Value {
        let object: Map<String, Value> = schema
            .field_names()
            .map(|name| (name.to_string(), Value::String(format!("{name} value"))))
            .collect();
        Value::Object(object)
    }

    #[test]
    fn pl_default_is_en_default_without_ipa() {
        let en: Vec<_> = card_schema(NoteType::EnDefault)
            .field_names()
            .filter(|name| *name != "IPA")
            .collect();
        let pl: Vec<_> = card_schema(NoteType::PlDefault).field_names().collect();
        assert_eq!(en, pl);
    }

    #[test]
    fn verb_schema_enumerates_every_conjugation_slot() {
        let schema = card_schema(NoteType::PlVerb);
        assert_eq!(schema.fields.len(), 39);

        let forms = schema
            .field_names()
            .filter(|name| name.starts_with("Form"))
            .count();
        let examples = schema
            .field_names()
            .filter(|name| name.starts_with("ExampleForm"))
            .count();
        assert_eq!(forms, 18);
        assert_eq!(examples, 18);
    }

    #[test]
    fn field_names_are_unique_per_schema() {
        for note_type in NoteType::ALL {
            let schema = card_schema(note_type);
            let mut names: Vec<_> = schema.field_names().collect();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), schema.fields.len(), "{note_type}");
        }
    }

    #[test]
    fn json_schema_requires_every_field_and_forbids_extras() {
        for note_type in NoteType::ALL {
            let schema = card_schema(note_type);
            let format = schema.json_schema();
            assert!(format.strict);
            assert_eq!(format.name, schema.name);
            assert_eq!(format.schema["additionalProperties"], false);

            let required: Vec<_> = format.schema["required"]
                .as_array()
                .unwrap()
                .iter()
                .map(|value| value.as_str().unwrap().to_string())
                .collect();
            let expected: Vec<_> = schema.field_names().map(str::to_string).collect();
            assert_eq!(required, expected);
        }
    }

    #[test]
    fn validated_key_set_equals_schema_key_set() {
        for note_type in NoteType::ALL {
            let schema = card_schema(note_type);
            let fields = schema.validate(&complete_payload(schema)).unwrap();
            let keys: Vec<_> = fields.keys().map(String::as_str).collect();
            let expected: Vec<_> = schema.field_names().collect();
            assert_eq!(keys, expected);
        }
    }

    #[test]
    fn validation_reorders_fields_into_schema_order() {
        let schema = card_schema(NoteType::PlDefault);
        let mut reversed = Map::new();
        for name in schema.field_names().collect::<Vec<_>>().into_iter().rev() {
            reversed.insert(name.to_string(), Value::String(String::new()));
        }

        let fields = schema.validate(&Value::Object(reversed)).unwrap();
        assert_eq!(fields.keys().next().map(String::as_str), Some("Word"));
    }

    #[test]
    fn missing_field_is_rejected_with_its_path() {
        let schema = card_schema(NoteType::EnDefault);
        let mut payload = complete_payload(schema);
        payload.as_object_mut().unwrap().remove("IPA");

        match schema.validate(&payload) {
            Err(CompanionError::Validation { path, .. }) => assert_eq!(path, "$.IPA"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn extra_field_is_rejected() {
        let schema = card_schema(NoteType::PlDefault);
        let mut payload = complete_payload(schema);
        payload
            .as_object_mut()
            .unwrap()
            .insert("IPA".to_string(), Value::String("/x/".to_string()));

        match schema.validate(&payload) {
            Err(CompanionError::Validation { path, .. }) => assert_eq!(path, "$.IPA"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn non_string_value_is_rejected() {
        let schema = card_schema(NoteType::PlDefault);
        let mut payload = complete_payload(schema);
        payload
            .as_object_mut()
            .unwrap()
            .insert("Synonym".to_string(), json!(["a", "b"]));

        match schema.validate(&payload) {
            Err(CompanionError::Validation { path, reason }) => {
                assert_eq!(path, "$.Synonym");
                assert!(reason.contains("an array"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let schema = card_schema(NoteType::EnDefault);
        assert!(matches!(
            schema.validate(&json!("text")),
            Err(CompanionError::Validation { .. })
        ));
    }

    #[test]
    fn unknown_label_is_unsupported() {
        assert!(matches!(
            card_schema_for_label("EN: Verb"),
            Err(CompanionError::UnsupportedNoteType(_))
        ));
        assert_eq!(card_schema_for_label("PL: Verb").unwrap().name, "pl_verb_note");
    }

    #[test]
    fn default_prompts_carry_masking_rules() {
        for note_type in [NoteType::EnDefault, NoteType::PlDefault] {
            let prompt = card_schema(note_type).system_prompt();
            assert!(prompt.contains("one underscore per character"));
            assert!(prompt.contains("\"break up\" -> \"_____ __\""));
        }
    }
}
