use crate::models::{Language, Sense};
use crate::senses::SenseResolution;

/// Lookup state of one user session: the term being studied, its language
/// and the senses offered for it. Owned by the caller and passed explicitly.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub term: String,
    pub language: Language,
    pub senses: Vec<Sense>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            term: String::new(),
            language: Language::Pl,
            senses: Vec::new(),
        }
    }
}

impl SessionContext {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            ..Self::default()
        }
    }

    /// Clears the term and senses; the chosen language is kept.
    pub fn reset(&mut self) {
        self.term.clear();
        self.senses.clear();
    }

    pub fn set_term(&mut self, term: impl Into<String>) {
        self.term = term.into();
    }

    /// Changing language invalidates senses resolved for the previous one.
    pub fn set_language(&mut self, language: Language) {
        if self.language != language {
            self.senses.clear();
        }
        self.language = language;
    }

    pub fn set_senses(&mut self, senses: Vec<Sense>) {
        self.senses = senses;
    }

    pub fn apply(&mut self, resolution: SenseResolution) {
        self.term = resolution.term;
        self.language = resolution.language;
        self.senses = resolution.senses;
    }

    pub fn sense(&self, id: &str) -> Option<&Sense> {
        self.senses.iter().find(|sense| sense.id == id)
    }

    pub fn has_senses(&self) -> bool {
        !self.senses.is_empty()
    }
}
