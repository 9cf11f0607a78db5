pub mod config;
pub mod csv_store;
pub mod delay_manager;
pub mod error;
pub mod fetcher;
pub mod logger;
pub mod models;
pub mod mongo_store;
pub mod parser;
pub mod pipeline;
pub mod url_normalizer;
pub mod writer;

// Exporting types for convenience
pub use config::Config;
pub use csv_store::CsvStore;
pub use error::{FetchError, NormalizationError, RunFailure, StorageError};
pub use fetcher::{FetchRequest, Fetcher, ResponsePage};
pub use models::{JobRecord, RunSummary, WorkType};
pub use mongo_store::{DocumentSink, KeyValueStore, MongoStore};
pub use parser::Parser;
pub use pipeline::{Pipeline, RunSettings};
pub use url_normalizer::normalize;
pub use writer::{Sink, WriteOutcome};
