//! Document-store sink. The normalized URL is the document `_id`, so the
//! collection itself enforces one document per posting.

use log::{debug, info};
use mongodb::bson::{self, doc, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::sync::{Client, Collection};

use crate::error::StorageError;
use crate::models::JobRecord;
use crate::writer::{InsertOutcome, Sink};

const DUPLICATE_KEY: i32 = 11000;

/// Key-value view of a document collection: existence check and
/// insert-if-absent, nothing else. Documents are never updated.
pub trait KeyValueStore {
    fn exists(&self, key: &str) -> Result<bool, StorageError>;

    fn insert(&self, key: &str, document: Document) -> Result<InsertOutcome, StorageError>;

    fn describe(&self) -> String;
}

pub struct MongoStore {
    collection: Collection<Document>,
    label: String,
}

impl MongoStore {
    /// Connects and pings the server, so an unreachable store fails here and
    /// not on the first job.
    pub fn connect(uri: &str, database: &str, collection: &str) -> Result<Self, StorageError> {
        let client = Client::with_uri_str(uri).map_err(|e| StorageError::Connectivity(Box::new(e)))?;
        let db = client.database(database);
        db.run_command(doc! { "ping": 1 }, None)
            .map_err(|e| StorageError::Connectivity(Box::new(e)))?;
        info!("Connected to MongoDB (database: {}, collection: {})", database, collection);

        Ok(MongoStore {
            collection: db.collection::<Document>(collection),
            label: format!("mongo collection {}.{}", database, collection),
        })
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

fn classify(err: mongodb::error::Error) -> StorageError {
    match err.kind.as_ref() {
        ErrorKind::Write(_) | ErrorKind::BulkWrite(_) | ErrorKind::InvalidArgument { .. } => {
            StorageError::Write(Box::new(err))
        }
        _ => StorageError::Connectivity(Box::new(err)),
    }
}

impl KeyValueStore for MongoStore {
    fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.collection
            .find_one(doc! { "_id": key }, None)
            .map(|found| found.is_some())
            .map_err(classify)
    }

    fn insert(&self, key: &str, document: Document) -> Result<InsertOutcome, StorageError> {
        match self.collection.insert_one(document, None) {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_duplicate_key(&e) => {
                debug!("Duplicate key on insert: {}", key);
                Ok(InsertOutcome::AlreadyPresent)
            }
            Err(e) => Err(classify(e)),
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// Adapts any `KeyValueStore` to the writer's `Sink`.
pub struct DocumentSink<K: KeyValueStore> {
    store: K,
}

impl<K: KeyValueStore> DocumentSink<K> {
    pub fn new(store: K) -> Self {
        DocumentSink { store }
    }

    pub fn store(&self) -> &K {
        &self.store
    }
}

/// All record fields, plus `_id` (normalized URL) and `date` (insertion time).
pub fn to_document(record: &JobRecord) -> Result<Document, StorageError> {
    let mut document = bson::to_document(record).map_err(|e| StorageError::Encode(Box::new(e)))?;
    document.insert("_id", record.normalized_url.clone());
    document.insert("date", bson::DateTime::now());
    Ok(document)
}

impl<K: KeyValueStore> Sink for DocumentSink<K> {
    fn contains(&mut self, key: &str) -> Result<bool, StorageError> {
        self.store.exists(key)
    }

    fn insert(&mut self, record: &JobRecord) -> Result<InsertOutcome, StorageError> {
        let document = to_document(record)?;
        self.store.insert(&record.normalized_url, document)
    }

    fn describe(&self) -> String {
        self.store.describe()
    }
}
