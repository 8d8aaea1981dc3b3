use std::path::PathBuf;
use std::sync::Arc;

use anki_companion::api::{ApiClient, CompletionService};
use anki_companion::config::{Config, ConfigSource};
use anki_companion::database::DatabaseManager;
use anki_companion::drafts::DraftStore;
use anki_companion::error::CompanionError;
use anki_companion::export::{ExportBatcher, write_export_files};
use anki_companion::generator::CardGenerator;
use anki_companion::logging::init_tracing;
use anki_companion::models::{Draft, Language, NoteType};
use anki_companion::senses::SenseResolver;
use anki_companion::server::run_server;
use anki_companion::session::SessionContext;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "anki-companion", version, about = "Turn dictionary lookups into Anki import files")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the companion HTTP server.
    Serve,

    #[command(flatten)]
    Local(LocalCommand),
}

/// Commands working on the local draft database.
#[derive(Subcommand, Debug)]
enum LocalCommand {
    /// Look up the senses of a word, optionally saving some of them as drafts.
    Lookup {
        /// Word, optionally followed by a `[hint]`.
        input: String,

        #[arg(short, long, default_value = "pl")]
        language: Language,

        /// 1-based sense numbers to save.
        #[arg(long, value_delimiter = ',')]
        save: Vec<usize>,
    },

    /// List drafts, newest first.
    Drafts,

    /// Change a draft's note type (discards its card).
    NoteType { id: i64, note_type: NoteType },

    /// (Re)generate the card of a draft.
    Generate { id: i64 },

    /// Overwrite card fields, e.g. `Translation=замок`.
    Edit {
        id: i64,
        #[arg(required = true, value_parser = parse_field_assignment)]
        fields: Vec<(String, String)>,
    },

    /// Return an exported draft to the queue.
    Requeue { id: i64 },

    Remove { id: i64 },

    /// Delete every draft.
    Clear,

    /// Export drafts with generated cards into CSV files.
    Export {
        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// List export history.
    Exports {
        /// Delete the history instead.
        #[arg(long)]
        clear: bool,
    },
}

fn parse_field_assignment(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected Field=Value, got `{value}`"))
}

fn describe_draft(draft: &Draft) -> String {
    format!(
        "#{} [{:?}] {} ({}, {}) - {}",
        draft.id,
        draft.state(),
        draft.term,
        draft.language,
        draft.note_type,
        draft.sense.translation_ru
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, source) =
        Config::load_with_source(&cli.config).context("Failed to load configuration")?;
    init_tracing(&config.logging.filter);
    if source == ConfigSource::Defaults {
        warn!(path = %cli.config.display(), "Configuration file not found, using defaults.");
    }

    let completion =
        ApiClient::from_config(&config).context("Failed to build completion client")?;

    let command = match cli.command {
        Command::Serve => {
            return run_server(&config, completion)
                .await
                .context("Errored while running HTTP server");
        }
        Command::Local(command) => command,
    };

    let database = DatabaseManager::new(&config.database)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.db_file))?;

    run_command(command, &config, database, completion).await
}

async fn run_command(
    command: LocalCommand,
    config: &Config,
    database: DatabaseManager,
    completion: Option<Arc<dyn CompletionService>>,
) -> Result<()> {
    let generator = completion
        .clone()
        .map(|completion| CardGenerator::new(completion, config.api.model.clone()));
    let store = DraftStore::new(database.clone(), generator);

    match command {
        LocalCommand::Lookup {
            input,
            language,
            save,
        } => {
            let completion = completion.ok_or(CompanionError::NotConfigured)?;
            let resolver = SenseResolver::new(completion, config.api.model.clone());

            let mut session = SessionContext::new(language);
            let resolution = resolver
                .resolve_senses(&input, language)
                .await
                .with_context(|| format!("Failed to look up `{input}`"))?;
            session.apply(resolution);

            if !session.has_senses() {
                println!("🔍 No senses found for `{input}`.");
                return Ok(());
            }

            println!("📖 {} ({})", session.term, session.language);
            for (index, sense) in session.senses.iter().enumerate() {
                let part_of_speech = sense.part_of_speech.as_deref().unwrap_or("?");
                println!("{:>3}. [{}] {}", index + 1, part_of_speech, sense.translation_ru);
                if let Some(notes) = &sense.notes {
                    println!("     {notes}");
                }
                for example in &sense.examples {
                    println!("     • {example}");
                }
            }

            for number in save {
                let Some(sense) = number.checked_sub(1).and_then(|index| session.senses.get(index))
                else {
                    bail!("Sense {number} does not exist");
                };

                let saved = store
                    .save_draft_from_sense(sense, &session.term, session.language)
                    .await
                    .with_context(|| format!("Failed to save sense {number}"))?;

                match &saved.generation_error {
                    None => println!("✅ Draft #{} saved with card.", saved.id),
                    Some(error) => {
                        println!("⚠️  Draft #{} saved, card generation failed: {error}", saved.id)
                    }
                }
            }
        }

        LocalCommand::Drafts => {
            let drafts = store.fetch_drafts().await?;
            if drafts.is_empty() {
                println!("No drafts.");
            }
            for draft in &drafts {
                println!("{}", describe_draft(draft));
            }
        }

        LocalCommand::NoteType { id, note_type } => {
            store.update_draft_note_type(id, note_type).await?;
            println!("✅ Draft #{id} is now {note_type}; regenerate its card.");
        }

        LocalCommand::Generate { id } => match store.generate_card_for_draft(id).await? {
            Some(card) => {
                println!("✅ Card generated for draft #{id} ({}).", card.schema_name);
                for (name, value) in &card.fields {
                    println!("  {name}: {}", value.as_str().unwrap_or_default());
                }
            }
            None => println!("Draft #{id} no longer exists."),
        },

        LocalCommand::Edit { id, fields } => {
            let card = store.update_draft_card_fields(id, fields).await?;
            println!("✅ Card of draft #{id} updated at {}.", card.generated_at);
        }

        LocalCommand::Requeue { id } => {
            store.return_draft_to_queue(id).await?;
            println!("✅ Draft #{id} returned to the queue.");
        }

        LocalCommand::Remove { id } => {
            if store.remove_draft(id).await? {
                println!("🗑️  Draft #{id} removed.");
            } else {
                println!("Draft #{id} not found.");
            }
        }

        LocalCommand::Clear => {
            let removed = store.clear_drafts().await?;
            println!("🗑️  {removed} drafts removed.");
        }

        LocalCommand::Export { ids } => {
            let batcher = ExportBatcher::new(database);
            let group = batcher.create_export_group(&ids).await?;

            let paths = write_export_files(&group, &config.output.export_dir).with_context(|| {
                format!("Failed to write export files to {}", config.output.export_dir)
            })?;

            println!("🎉 Export #{} ({} words):", group.id, group.words.len());
            for path in paths {
                println!("   📄 {}", path.display());
            }
        }

        LocalCommand::Exports { clear } => {
            let batcher = ExportBatcher::new(database);

            if clear {
                let removed = batcher.clear_export_groups().await?;
                println!("🗑️  {removed} export groups removed.");
                return Ok(());
            }

            for group in batcher.fetch_export_groups().await? {
                println!(
                    "#{} {} - {} ({} files)",
                    group.id,
                    group.created_at,
                    group.words.join(", "),
                    group.files.len()
                );
            }
        }
    }

    Ok(())
}
