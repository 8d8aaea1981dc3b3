mod helpers;

use anki_companion::error::CompanionError;
use anki_companion::export::{ExportBatcher, write_export_files};
use anki_companion::models::{Language, NoteType};
use anyhow::Result;
use helpers::{ScriptedCompletion, card_reply, sense, test_store};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn given_mixed_note_types_when_exporting_then_one_file_per_type_and_all_marked_with_group_time() -> Result<()> {
    // Arrange
    let completion = ScriptedCompletion::new();
    completion.push_reply(card_reply(NoteType::PlDefault, &[("Word", "zamek")]));
    completion.push_reply(card_reply(NoteType::PlDefault, &[("Word", "pisać")]));
    completion.push_reply(card_reply(NoteType::PlDefault, &[("Word", "dom")]));
    completion.push_reply(card_reply(NoteType::PlVerb, &[("Infinitive", "pisać")]));
    let store = test_store(completion).await;

    let zamek = store
        .save_draft_from_sense(&sense("zamek-1", "замок"), "zamek", Language::Pl)
        .await?;
    let pisac = store
        .save_draft_from_sense(&sense("pisać-1", "писать"), "pisać", Language::Pl)
        .await?;
    let dom = store
        .save_draft_from_sense(&sense("dom-1", "дом"), "dom", Language::Pl)
        .await?;
    store.update_draft_note_type(pisac.id, NoteType::PlVerb).await?;
    store.generate_card_for_draft(pisac.id).await?;

    let batcher = ExportBatcher::new(store.database().clone());

    // Act
    let group = batcher
        .create_export_group(&[pisac.id, zamek.id, dom.id])
        .await?;

    // Assert
    assert_eq!(group.draft_ids, vec![pisac.id, zamek.id, dom.id]);
    assert_eq!(group.words, vec!["pisać", "zamek", "dom"]);
    assert_eq!(group.files.len(), 2);
    assert_eq!(group.files[0].note_type, NoteType::PlVerb);
    assert_eq!(group.files[1].note_type, NoteType::PlDefault);

    for file in &group.files {
        assert_eq!(file.created_at, group.created_at);
        assert!(file.file_name.ends_with(".csv"));
    }
    assert!(group.files[0].file_name.starts_with("pl-verb-"));
    assert!(group.files[1].file_name.starts_with("pl-default-"));

    let default_lines: Vec<&str> = group.files[1].content.split('\n').collect();
    assert_eq!(default_lines.len(), 3 + 2);
    assert_eq!(default_lines[1], "#notetype column:12");
    assert!(default_lines[3].starts_with("\"zamek\","));
    assert!(default_lines[4].starts_with("\"dom\","));
    assert!(default_lines[4].ends_with(",\"PL: Default\""));

    let verb_lines: Vec<&str> = group.files[0].content.split('\n').collect();
    assert_eq!(verb_lines.len(), 3 + 1);
    assert_eq!(verb_lines[1], "#notetype column:40");

    for id in [zamek.id, pisac.id, dom.id] {
        let draft = store.get_draft(id).await?;
        assert!(draft.exported);
        assert_eq!(draft.exported_at.as_deref(), Some(group.created_at.as_str()));
    }
    Ok(())
}

#[tokio::test]
async fn given_pending_and_missing_drafts_when_exporting_then_only_ready_ones_are_included() -> Result<()> {
    // Arrange
    let completion = ScriptedCompletion::new();
    completion.push_reply(card_reply(NoteType::PlDefault, &[]));
    completion.push_error(CompanionError::EmptyResponse);
    let store = test_store(completion).await;
    let ready = store
        .save_draft_from_sense(&sense("zamek-1", "замок"), "zamek", Language::Pl)
        .await?;
    let pending = store
        .save_draft_from_sense(&sense("dom-1", "дом"), "dom", Language::Pl)
        .await?;
    let batcher = ExportBatcher::new(store.database().clone());

    // Act
    let group = batcher
        .create_export_group(&[ready.id, pending.id, 999])
        .await?;

    // Assert
    assert_eq!(group.draft_ids, vec![ready.id]);
    assert_eq!(group.words, vec!["zamek"]);
    assert!(!store.get_draft(pending.id).await?.exported);
    Ok(())
}

#[tokio::test]
async fn given_empty_selection_when_exporting_then_empty_selection_error() -> Result<()> {
    // Arrange
    let store = test_store(ScriptedCompletion::new()).await;
    let batcher = ExportBatcher::new(store.database().clone());

    // Act
    let result = batcher.create_export_group(&[]).await;

    // Assert
    assert!(matches!(result, Err(CompanionError::EmptySelection)));
    assert_eq!(
        result.unwrap_err().to_string(),
        "Select at least one draft to export"
    );
    Ok(())
}

#[tokio::test]
async fn given_only_pending_drafts_when_exporting_then_no_ready_cards_and_nothing_recorded() -> Result<()> {
    // Arrange
    let completion = ScriptedCompletion::new();
    completion.push_error(CompanionError::EmptyResponse);
    let store = test_store(completion).await;
    let pending = store
        .save_draft_from_sense(&sense("dom-1", "дом"), "dom", Language::Pl)
        .await?;
    let batcher = ExportBatcher::new(store.database().clone());

    // Act
    let result = batcher.create_export_group(&[pending.id]).await;

    // Assert
    assert!(matches!(result, Err(CompanionError::NoReadyCards)));
    assert!(batcher.fetch_export_groups().await?.is_empty());
    assert!(!store.get_draft(pending.id).await?.exported);
    Ok(())
}

#[tokio::test]
async fn given_two_exports_when_fetching_history_then_newest_first_and_clear_removes_all() -> Result<()> {
    // Arrange
    let completion = ScriptedCompletion::new();
    completion.push_reply(card_reply(NoteType::PlDefault, &[]));
    completion.push_reply(card_reply(NoteType::EnDefault, &[]));
    let store = test_store(completion).await;
    let polish = store
        .save_draft_from_sense(&sense("zamek-1", "замок"), "zamek", Language::Pl)
        .await?;
    let english = store
        .save_draft_from_sense(&sense("lock-1", "замок"), "lock", Language::En)
        .await?;
    let batcher = ExportBatcher::new(store.database().clone());

    let first = batcher.create_export_group(&[polish.id]).await?;
    let second = batcher.create_export_group(&[english.id]).await?;

    // Act
    let history = batcher.fetch_export_groups().await?;

    // Assert
    assert_eq!(
        history.iter().map(|group| group.id).collect::<Vec<_>>(),
        vec![second.id, first.id]
    );
    assert_eq!(history[0].words, vec!["lock"]);
    assert_eq!(history[0].files[0].note_type, NoteType::EnDefault);

    assert_eq!(batcher.clear_export_groups().await?, 2);
    assert!(batcher.fetch_export_groups().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn given_export_group_when_writing_files_then_csv_files_land_in_directory() -> Result<()> {
    // Arrange
    let completion = ScriptedCompletion::new();
    completion.push_reply(card_reply(NoteType::PlDefault, &[]));
    let store = test_store(completion).await;
    let saved = store
        .save_draft_from_sense(&sense("zamek-1", "замок"), "zamek", Language::Pl)
        .await?;
    let group = ExportBatcher::new(store.database().clone())
        .create_export_group(&[saved.id])
        .await?;
    let temp_dir = tempfile::tempdir()?;
    let export_dir = temp_dir.path().join("exports");

    // Act
    let paths = write_export_files(&group, &export_dir)?;

    // Assert
    assert_eq!(paths.len(), 1);
    assert_eq!(paths[0], export_dir.join(&group.files[0].file_name));
    assert_eq!(std::fs::read_to_string(&paths[0])?, group.files[0].content);
    Ok(())
}
