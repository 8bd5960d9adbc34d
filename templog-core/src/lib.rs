//! Templog core library.
//!
//! Ingests temperature logger files into per-sensor SQLite tables and serves
//! range queries and summaries over them.

pub mod codec;
pub mod config;
pub mod error;
pub mod import;
pub mod ingest;
pub mod observability;
pub mod paths;
pub mod query;
pub mod store;
pub mod summary;

// Re-export commonly used items
pub use codec::{LogRecord, Reading};
pub use config::Config;
pub use error::{Result, TemplogError};
pub use import::{import_file, ImportReport};
pub use ingest::{change_queue, ChangeNotifier, IngestCoordinator, IngestStats};
pub use observability::init as init_observability;
pub use query::{PageWindow, QueryService};
pub use store::{CatalogEntry, InsertOutcome, SensorStore, StoreOptions};
pub use summary::{summarize, Page, SeriesPoint, Summary};
