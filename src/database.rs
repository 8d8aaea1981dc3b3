use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, warn};

use crate::config::DatabaseConfig;
use crate::error::{CompanionError, Result};
use crate::models::*;

const DRAFTS_TABLE: &str = "drafts";
const EXPORT_GROUPS_TABLE: &str = "export_groups";

#[derive(Debug, sqlx::FromRow)]
struct DraftRow {
    id: i64,
    term: String,
    language: String,
    note_type: String,
    sense_json: String,
    card_json: Option<String>,
    exported: Option<bool>,
    exported_at: Option<String>,
}

impl DraftRow {
    fn into_draft(self) -> Result<Draft> {
        let corrupt = |reason: String| CompanionError::CorruptRecord {
            table: DRAFTS_TABLE,
            id: self.id,
            reason,
        };

        let language = Language::from_str(&self.language).map_err(corrupt)?;
        let note_type =
            NoteType::from_str(&self.note_type).map_err(|error| corrupt(error.to_string()))?;
        let sense: Sense =
            serde_json::from_str(&self.sense_json).map_err(|error| corrupt(error.to_string()))?;
        let card: Option<GeneratedCard> = self
            .card_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|error| corrupt(error.to_string()))?;

        Ok(Draft {
            id: self.id,
            term: self.term,
            language,
            note_type,
            sense,
            card,
            // Rows written before export tracking existed have NULLs here.
            exported: self.exported.unwrap_or(false),
            exported_at: self.exported_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExportGroupRow {
    id: i64,
    created_at: String,
    draft_ids_json: String,
    words_json: Option<String>,
    files_json: String,
}

impl ExportGroupRow {
    fn into_group(self) -> Result<ExportGroup> {
        let corrupt = |error: serde_json::Error| CompanionError::CorruptRecord {
            table: EXPORT_GROUPS_TABLE,
            id: self.id,
            reason: error.to_string(),
        };

        let draft_ids: Vec<i64> = serde_json::from_str(&self.draft_ids_json).map_err(corrupt)?;
        let words: Vec<String> = match self.words_json.as_deref() {
            Some(words) => serde_json::from_str(words).map_err(corrupt)?,
            None => Vec::new(),
        };
        let files: Vec<ExportedFile> = serde_json::from_str(&self.files_json).map_err(corrupt)?;

        Ok(ExportGroup {
            id: self.id,
            created_at: self.created_at,
            draft_ids,
            words,
            files,
        })
    }
}

/// Fields of a draft that exist before it has an id or a card.
#[derive(Debug, Clone)]
pub struct NewDraft<'a> {
    pub term: &'a str,
    pub language: Language,
    pub note_type: NoteType,
    pub sense: &'a Sense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftInsert {
    Inserted(i64),
    Existing { id: i64, has_card: bool },
}

impl DraftInsert {
    pub fn id(self) -> i64 {
        match self {
            DraftInsert::Inserted(id) | DraftInsert::Existing { id, .. } => id,
        }
    }
}

/// An export group before it is assigned an id.
#[derive(Debug, Clone)]
pub struct NewExportGroup {
    pub created_at: String,
    pub draft_ids: Vec<i64>,
    pub words: Vec<String>,
    pub files: Vec<ExportedFile>,
}

#[derive(Debug, Clone)]
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let db_path = std::env::current_dir()?.join(&config.db_file);
        Self::open(db_path).await
    }

    /// Opens (creating if missing) the database file and brings the schema up to date.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        info!(path = %path.display(), "Connecting to database.");

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let manager = DatabaseManager { pool };
        manager.initialize_tables().await?;

        Ok(manager)
    }

    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // A single connection that never recycles; closing it would drop the database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let manager = DatabaseManager { pool };
        manager.initialize_tables().await?;

        Ok(manager)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn initialize_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS drafts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sense_id TEXT NOT NULL,
                term TEXT NOT NULL,
                language TEXT NOT NULL,
                note_type TEXT NOT NULL,
                sense_json TEXT NOT NULL,
                card_json TEXT,
                exported INTEGER DEFAULT 0,
                exported_at TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS export_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at TEXT NOT NULL,
                draft_ids_json TEXT NOT NULL,
                words_json TEXT,
                files_json TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Older databases predate export tracking.
        self.add_column_if_missing(DRAFTS_TABLE, "exported", "INTEGER DEFAULT 0")
            .await?;
        self.add_column_if_missing(DRAFTS_TABLE, "exported_at", "TEXT")
            .await?;
        self.add_column_if_missing(EXPORT_GROUPS_TABLE, "words_json", "TEXT")
            .await?;

        let removed = self.remove_duplicate_drafts().await?;
        debug!(removed, "Duplicate draft check finished.");

        for statement in [
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_drafts_sense_language ON drafts(sense_id, language)",
            "CREATE INDEX IF NOT EXISTS idx_drafts_sense_id ON drafts(sense_id)",
            "CREATE INDEX IF NOT EXISTS idx_drafts_term ON drafts(term)",
            "CREATE INDEX IF NOT EXISTS idx_drafts_language ON drafts(language)",
            "CREATE INDEX IF NOT EXISTS idx_drafts_exported ON drafts(exported)",
            "CREATE INDEX IF NOT EXISTS idx_export_groups_created_at ON export_groups(created_at)",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    async fn add_column_if_missing(
        &self,
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    ) -> Result<()> {
        let (count,): (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM pragma_table_info('{table}') WHERE name = ?"
        ))
        .bind(column)
        .fetch_one(&self.pool)
        .await?;

        if count == 0 {
            info!(table, column, "Adding missing column.");
            sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"))
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    /// Keeps the oldest draft of each (sense, language) pair so the unique index can be built.
    /// Returns how many drafts were deleted.
    async fn remove_duplicate_drafts(&self) -> Result<u64> {
        let duplicates: Vec<(i64, String, String)> = sqlx::query_as(
            r#"
            SELECT id, sense_id, language FROM drafts
            WHERE id NOT IN (SELECT MIN(id) FROM drafts GROUP BY sense_id, language)
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        if duplicates.is_empty() {
            return Ok(0);
        }

        for (id, sense_id, language) in &duplicates {
            warn!(
                id,
                sense_id = sense_id.as_str(),
                language = language.as_str(),
                "Deleting duplicate draft; an older draft for the same sense is kept."
            );
        }

        let result = sqlx::query(
            r#"
            DELETE FROM drafts
            WHERE id NOT IN (SELECT MIN(id) FROM drafts GROUP BY sense_id, language)
            "#,
        )
        .execute(&self.pool)
        .await?;

        warn!(
            removed = result.rows_affected(),
            "Removed duplicate drafts for the same sense."
        );
        Ok(result.rows_affected())
    }

    /// Single statement, so lookup and insert cannot interleave with another call.
    pub async fn insert_draft_if_absent(&self, draft: NewDraft<'_>) -> Result<DraftInsert> {
        let sense_json = serde_json::to_string(draft.sense)?;

        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO drafts (sense_id, term, language, note_type, sense_json, card_json, exported, exported_at)
            VALUES (?, ?, ?, ?, ?, NULL, 0, NULL)
            ON CONFLICT(sense_id, language) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&draft.sense.id)
        .bind(draft.term)
        .bind(draft.language.label())
        .bind(draft.note_type.label())
        .bind(&sense_json)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = inserted {
            debug!(id, sense_id = draft.sense.id.as_str(), "Draft row inserted.");
            return Ok(DraftInsert::Inserted(id));
        }

        let (id, has_card): (i64, bool) = sqlx::query_as(
            "SELECT id, card_json IS NOT NULL FROM drafts WHERE sense_id = ? AND language = ?",
        )
        .bind(&draft.sense.id)
        .bind(draft.language.label())
        .fetch_one(&self.pool)
        .await?;

        Ok(DraftInsert::Existing { id, has_card })
    }

    pub async fn get_draft(&self, id: i64) -> Result<Option<Draft>> {
        let row = sqlx::query_as::<_, DraftRow>(
            "SELECT id, term, language, note_type, sense_json, card_json, exported, exported_at FROM drafts WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DraftRow::into_draft).transpose()
    }

    /// Drafts for `ids` in the given order; missing ids and repeats are skipped.
    pub async fn get_drafts(&self, ids: &[i64]) -> Result<Vec<Draft>> {
        let mut drafts: Vec<Draft> = Vec::with_capacity(ids.len());
        for &id in ids {
            if drafts.iter().any(|draft| draft.id == id) {
                continue;
            }
            if let Some(draft) = self.get_draft(id).await? {
                drafts.push(draft);
            }
        }
        Ok(drafts)
    }

    pub async fn find_draft_by_sense(
        &self,
        sense_id: &str,
        language: Language,
    ) -> Result<Option<Draft>> {
        let row = sqlx::query_as::<_, DraftRow>(
            "SELECT id, term, language, note_type, sense_json, card_json, exported, exported_at FROM drafts WHERE sense_id = ? AND language = ?",
        )
        .bind(sense_id)
        .bind(language.label())
        .fetch_optional(&self.pool)
        .await?;

        row.map(DraftRow::into_draft).transpose()
    }

    /// Most recent first.
    pub async fn list_drafts(&self) -> Result<Vec<Draft>> {
        let rows = sqlx::query_as::<_, DraftRow>(
            "SELECT id, term, language, note_type, sense_json, card_json, exported, exported_at FROM drafts ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DraftRow::into_draft).collect()
    }

    /// Also drops the card and export state. Returns false when no such draft exists.
    pub async fn update_note_type(&self, id: i64, note_type: NoteType) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE drafts SET note_type = ?, card_json = NULL, exported = 0, exported_at = NULL WHERE id = ?",
        )
        .bind(note_type.label())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the card and un-exports the draft.
    pub async fn store_card(&self, id: i64, card: &GeneratedCard) -> Result<bool> {
        let card_json = serde_json::to_string(card)?;

        let result = sqlx::query(
            "UPDATE drafts SET card_json = ?, exported = 0, exported_at = NULL WHERE id = ?",
        )
        .bind(&card_json)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_export_state(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE drafts SET exported = 0, exported_at = NULL WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_draft(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM drafts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn clear_drafts(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM drafts").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Writes the group and marks its drafts exported in one transaction.
    pub async fn insert_export_group(&self, group: &NewExportGroup) -> Result<i64> {
        let draft_ids_json = serde_json::to_string(&group.draft_ids)?;
        let words_json = serde_json::to_string(&group.words)?;
        let files_json = serde_json::to_string(&group.files)?;

        let mut tx = self.pool.begin().await?;

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO export_groups (created_at, draft_ids_json, words_json, files_json) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(&group.created_at)
        .bind(&draft_ids_json)
        .bind(&words_json)
        .bind(&files_json)
        .fetch_one(&mut *tx)
        .await?;

        for draft_id in &group.draft_ids {
            sqlx::query("UPDATE drafts SET exported = 1, exported_at = ? WHERE id = ?")
                .bind(&group.created_at)
                .bind(draft_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(id)
    }

    /// Newest first.
    pub async fn list_export_groups(&self) -> Result<Vec<ExportGroup>> {
        let rows = sqlx::query_as::<_, ExportGroupRow>(
            "SELECT id, created_at, draft_ids_json, words_json, files_json FROM export_groups ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ExportGroupRow::into_group).collect()
    }

    pub async fn clear_export_groups(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM export_groups")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
