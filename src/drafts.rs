use tracing::{info, warn};

use crate::database::{DatabaseManager, DraftInsert, NewDraft};
use crate::error::{CompanionError, Result};
use crate::generator::CardGenerator;
use crate::models::*;

/// Outcome of saving a sense. The draft is persisted even when card generation fails.
#[derive(Debug)]
pub struct SavedDraft {
    pub id: i64,
    pub created: bool,
    pub generation_error: Option<CompanionError>,
}

impl SavedDraft {
    pub fn card_generated(&self) -> bool {
        self.generation_error.is_none()
    }
}

pub struct DraftStore {
    db: DatabaseManager,
    generator: Option<CardGenerator>,
}

impl DraftStore {
    /// Without a generator every card generation fails with [`CompanionError::NotConfigured`].
    pub fn new(db: DatabaseManager, generator: Option<CardGenerator>) -> Self {
        Self { db, generator }
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.db
    }

    /// Idempotent per (sense id, language). A new draft, or an existing one still
    /// without a card, gets a card generated before this returns.
    pub async fn save_draft_from_sense(
        &self,
        sense: &Sense,
        term: &str,
        language: Language,
    ) -> Result<SavedDraft> {
        let insert = self
            .db
            .insert_draft_if_absent(NewDraft {
                term,
                language,
                note_type: default_note_type(language),
                sense,
            })
            .await?;

        let (id, created) = match insert {
            DraftInsert::Inserted(id) => {
                info!(id, term, sense_id = sense.id.as_str(), "Draft created.");
                (id, true)
            }
            DraftInsert::Existing { id, has_card: true } => {
                return Ok(SavedDraft {
                    id,
                    created: false,
                    generation_error: None,
                });
            }
            DraftInsert::Existing { id, has_card: false } => (id, false),
        };

        let generation_error = match self.generate_card_for_draft(id).await {
            Ok(_) => None,
            Err(error @ CompanionError::Database(_)) => return Err(error),
            Err(error) => {
                warn!(id, %error, "Card generation failed; draft kept pending.");
                Some(error)
            }
        };

        Ok(SavedDraft {
            id,
            created,
            generation_error,
        })
    }

    /// Most recent first.
    pub async fn fetch_drafts(&self) -> Result<Vec<Draft>> {
        self.db.list_drafts().await
    }

    pub async fn get_draft(&self, id: i64) -> Result<Draft> {
        self.db
            .get_draft(id)
            .await?
            .ok_or_else(|| CompanionError::draft_not_found(id))
    }

    /// Switching note type discards the card and any export state.
    pub async fn update_draft_note_type(&self, id: i64, note_type: NoteType) -> Result<()> {
        let draft = self.get_draft(id).await?;

        if !note_types_for_language(draft.language).contains(&note_type) {
            return Err(CompanionError::NoteTypeNotAllowed {
                note_type,
                language: draft.language,
            });
        }

        if !self.db.update_note_type(id, note_type).await? {
            return Err(CompanionError::draft_not_found(id));
        }

        info!(id, from = %draft.note_type, to = %note_type, "Draft note type changed.");
        Ok(())
    }

    /// `Ok(None)` when the draft no longer exists. A stored card is always un-exported.
    pub async fn generate_card_for_draft(&self, id: i64) -> Result<Option<GeneratedCard>> {
        let Some(draft) = self.db.get_draft(id).await? else {
            return Ok(None);
        };

        let generator = self.generator.as_ref().ok_or(CompanionError::NotConfigured)?;
        let card = generator.generate_card(draft.card_request()).await?;

        if !self.db.store_card(id, &card).await? {
            // Deleted while the completion was in flight.
            return Ok(None);
        }

        Ok(Some(card))
    }

    /// Manual edit: overwrites values of the given fields and refreshes `generatedAt`.
    /// The key set is not re-validated.
    pub async fn update_draft_card_fields<I, K, V>(&self, id: i64, fields: I) -> Result<GeneratedCard>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let draft = self.get_draft(id).await?;
        let mut card = draft.card.ok_or(CompanionError::NotFound { entity: "Card", id })?;

        for (name, value) in fields {
            card.fields
                .insert(name.into(), serde_json::Value::String(value.into()));
        }
        card.generated_at = now_timestamp();

        if !self.db.store_card(id, &card).await? {
            return Err(CompanionError::draft_not_found(id));
        }

        info!(id, "Card fields edited.");
        Ok(card)
    }

    /// Clears export state; the card is kept.
    pub async fn return_draft_to_queue(&self, id: i64) -> Result<()> {
        if !self.db.clear_export_state(id).await? {
            return Err(CompanionError::draft_not_found(id));
        }

        info!(id, "Draft returned to queue.");
        Ok(())
    }

    pub async fn remove_draft(&self, id: i64) -> Result<bool> {
        self.db.delete_draft(id).await
    }

    pub async fn clear_drafts(&self) -> Result<u64> {
        self.db.clear_drafts().await
    }
}
