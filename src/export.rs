use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::database::{DatabaseManager, NewExportGroup};
use crate::error::{CompanionError, Result};
use crate::models::*;

static NON_ALPHANUMERIC_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid"));

/// `PL: Verb` at `2024-01-01T10:20:30.000Z` -> `pl-verb-2024-01-01T10-20-30-000Z.csv`.
pub fn export_file_name(note_type: NoteType, created_at: &str) -> String {
    let lowered = note_type.label().to_lowercase();
    let slug = NON_ALPHANUMERIC_RUN.replace_all(&lowered, "-");
    let timestamp = created_at.replace([':', '.'], "-");
    format!("{slug}-{timestamp}.csv")
}

/// Anki plain-text import file for drafts sharing one note type.
///
/// Columns follow the field order of the first draft's card, with the note
/// type appended as the last column. Every value is quoted.
pub fn build_csv_content(drafts: &[Draft], note_type: NoteType) -> Result<String> {
    let first = drafts.first().ok_or(CompanionError::EmptyDraftList)?;
    if let Some(missing) = drafts.iter().find(|draft| draft.card.is_none()) {
        return Err(CompanionError::MissingCard(missing.id));
    }
    let first_card = first
        .card
        .as_ref()
        .ok_or(CompanionError::MissingCard(first.id))?;

    let field_order: Vec<&str> = first_card.fields.keys().map(String::as_str).collect();

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    for draft in drafts {
        let card = draft
            .card
            .as_ref()
            .ok_or(CompanionError::MissingCard(draft.id))?;

        let mut record: Vec<String> = field_order
            .iter()
            .map(|field| match card.fields.get(*field) {
                Some(serde_json::Value::String(text)) => text.clone(),
                Some(serde_json::Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            })
            .collect();
        record.push(note_type.label().to_string());

        writer.write_record(&record)?;
    }

    let rows = writer
        .into_inner()
        .map_err(|error| CompanionError::Io(error.into_error()))?;
    let rows = String::from_utf8(rows).map_err(|error| {
        CompanionError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, error))
    })?;

    let mut content = format!(
        "#separator:Comma\n#notetype column:{}\n#columns:{},\"notetype\"",
        field_order.len() + 1,
        field_order.join(",")
    );
    content.push('\n');
    content.push_str(rows.strip_suffix('\n').unwrap_or(&rows));

    Ok(content)
}

/// Groups drafts by note type, keeping the order in which each type first appears.
fn group_by_note_type(drafts: &[Draft]) -> Vec<(NoteType, Vec<Draft>)> {
    let mut groups: Vec<(NoteType, Vec<Draft>)> = Vec::new();
    for draft in drafts {
        match groups.iter_mut().find(|(note_type, _)| *note_type == draft.note_type) {
            Some((_, members)) => members.push(draft.clone()),
            None => groups.push((draft.note_type, vec![draft.clone()])),
        }
    }
    groups
}

pub struct ExportBatcher {
    db: DatabaseManager,
}

impl ExportBatcher {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db }
    }

    /// Missing drafts and drafts without a card are skipped; at least one
    /// ready draft must remain. Every included draft is marked exported with
    /// the group's timestamp in the same transaction that stores the group.
    pub async fn create_export_group(&self, draft_ids: &[i64]) -> Result<ExportGroup> {
        if draft_ids.is_empty() {
            return Err(CompanionError::EmptySelection);
        }

        let ready: Vec<Draft> = self
            .db
            .get_drafts(draft_ids)
            .await?
            .into_iter()
            .filter(|draft| draft.card.is_some())
            .collect();

        if ready.is_empty() {
            return Err(CompanionError::NoReadyCards);
        }

        let created_at = now_timestamp();

        let files = group_by_note_type(&ready)
            .into_iter()
            .map(|(note_type, members)| {
                Ok(ExportedFile {
                    note_type,
                    file_name: export_file_name(note_type, &created_at),
                    created_at: created_at.clone(),
                    content: build_csv_content(&members, note_type)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let group = NewExportGroup {
            created_at: created_at.clone(),
            draft_ids: ready.iter().map(|draft| draft.id).collect(),
            words: ready.iter().map(|draft| draft.term.clone()).collect(),
            files,
        };

        let id = self.db.insert_export_group(&group).await?;

        info!(
            id,
            drafts = group.draft_ids.len(),
            files = group.files.len(),
            "Export group created."
        );

        Ok(ExportGroup {
            id,
            created_at: group.created_at,
            draft_ids: group.draft_ids,
            words: group.words,
            files: group.files,
        })
    }

    /// Newest first.
    pub async fn fetch_export_groups(&self) -> Result<Vec<ExportGroup>> {
        self.db.list_export_groups().await
    }

    pub async fn clear_export_groups(&self) -> Result<u64> {
        self.db.clear_export_groups().await
    }
}

/// Writes each CSV of the group into `dir` (created if needed).
pub fn write_export_files(group: &ExportGroup, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    group
        .files
        .iter()
        .map(|file| {
            let path = dir.join(&file.file_name);
            std::fs::write(&path, &file.content)?;
            Ok(path)
        })
        .collect()
}
