//! New / duplicate / invalid decision shared by every sink.

use log::{debug, warn};

use crate::error::StorageError;
use crate::models::{JobRecord, RecordStatus};
use crate::url_normalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    New,
    Duplicate,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another writer stored the key between the existence check and the insert.
    AlreadyPresent,
}

/// A persistence backend keyed by normalized URL.
pub trait Sink {
    fn contains(&mut self, key: &str) -> Result<bool, StorageError>;

    /// `record.normalized_url` is always set when this is called.
    fn insert(&mut self, record: &JobRecord) -> Result<InsertOutcome, StorageError>;

    /// Makes everything inserted so far durable.
    fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }

    fn describe(&self) -> String;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn contains(&mut self, key: &str) -> Result<bool, StorageError> {
        (**self).contains(key)
    }

    fn insert(&mut self, record: &JobRecord) -> Result<InsertOutcome, StorageError> {
        (**self).insert(record)
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        (**self).flush()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Writes one candidate. Invalid URLs are never persisted and existing keys
/// are never overwritten.
pub fn write<S: Sink + ?Sized>(mut candidate: JobRecord, sink: &mut S) -> Result<WriteOutcome, StorageError> {
    let key = match url_normalizer::normalize(&candidate.url) {
        Ok(key) => key,
        Err(e) => {
            warn!("Skipping job '{}' at {}: {}", candidate.title, candidate.company, e);
            return Ok(WriteOutcome::Invalid);
        }
    };

    if sink.contains(&key)? {
        debug!("Duplicate job: {}", key);
        return Ok(WriteOutcome::Duplicate);
    }

    candidate.normalized_url = key;
    candidate.status = RecordStatus::New;
    match sink.insert(&candidate)? {
        InsertOutcome::Inserted => {
            debug!("New job: {} ({})", candidate.title, candidate.normalized_url);
            Ok(WriteOutcome::New)
        }
        InsertOutcome::AlreadyPresent => {
            debug!("Duplicate job (concurrent insert): {}", candidate.normalized_url);
            Ok(WriteOutcome::Duplicate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapSink {
        rows: HashMap<String, JobRecord>,
        racing_key: Option<String>,
    }

    impl Sink for MapSink {
        fn contains(&mut self, key: &str) -> Result<bool, StorageError> {
            Ok(self.rows.contains_key(key))
        }

        fn insert(&mut self, record: &JobRecord) -> Result<InsertOutcome, StorageError> {
            if self.racing_key.as_deref() == Some(record.normalized_url.as_str()) {
                return Ok(InsertOutcome::AlreadyPresent);
            }
            self.rows.insert(record.normalized_url.clone(), record.clone());
            Ok(InsertOutcome::Inserted)
        }

        fn describe(&self) -> String {
            "map".to_string()
        }
    }

    fn job(url: &str) -> JobRecord {
        JobRecord {
            url: url.to_string(),
            title: "Backend Engineer".to_string(),
            company: "Acme".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn new_then_duplicate_then_invalid() {
        let mut sink = MapSink::default();
        assert_eq!(
            write(job("https://www.linkedin.com/jobs/view/1?refId=a"), &mut sink).unwrap(),
            WriteOutcome::New
        );
        assert_eq!(
            write(job("https://WWW.linkedin.com/jobs/view/1/?trackingId=b"), &mut sink).unwrap(),
            WriteOutcome::Duplicate
        );
        assert_eq!(write(job(""), &mut sink).unwrap(), WriteOutcome::Invalid);
        assert_eq!(write(job("not a url"), &mut sink).unwrap(), WriteOutcome::Invalid);

        assert_eq!(sink.rows.len(), 1);
        let stored = &sink.rows["https://www.linkedin.com/jobs/view/1"];
        assert_eq!(stored.status, RecordStatus::New);
        assert_eq!(stored.url, "https://www.linkedin.com/jobs/view/1?refId=a");
    }

    #[test]
    fn lost_insert_race_counts_as_duplicate() {
        let mut sink = MapSink {
            racing_key: Some("https://www.linkedin.com/jobs/view/2".to_string()),
            ..Default::default()
        };
        assert_eq!(
            write(job("https://www.linkedin.com/jobs/view/2"), &mut sink).unwrap(),
            WriteOutcome::Duplicate
        );
        assert!(sink.rows.is_empty());
    }
}
