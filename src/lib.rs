pub mod api;
pub mod config;
pub mod database;
pub mod drafts;
pub mod error;
pub mod export;
pub mod generator;
pub mod logging;
pub mod models;
pub mod schemas;
pub mod senses;
pub mod server;
pub mod session;

pub use api::{ApiClient, CompletionService};
pub use config::Config;
pub use database::DatabaseManager;
pub use drafts::{DraftStore, SavedDraft};
pub use error::{CompanionError, Result};
pub use export::{ExportBatcher, build_csv_content, export_file_name, write_export_files};
pub use generator::CardGenerator;
pub use models::*;
pub use schemas::{CardSchema, card_schema};
pub use senses::{SenseResolution, SenseResolver, strip_bracket_hint};
pub use session::SessionContext;
