use std::collections::HashSet;
use std::path::{Path, PathBuf};
use csv::StringRecord;
use log::{error, info, warn};
use crate::error::StorageError;
use crate::models::{posting_time_format, JobRecord, RecordStatus, WorkType};
use crate::url_normalizer;
use crate::writer::{InsertOutcome, Sink};

/// Column order of every file this store writes, matching `JobRecord`.
pub const HEADER: [&str; 10] = [
    "url",
    "normalized_url",
    "title",
    "company",
    "location",
    "posting_time",
    "work_type",
    "listing_status",
    "source_page",
    "status",
];

/// CSV file sink.
///
/// The whole file is read once on open, previously stored rows are re-tagged
/// `old`, and every flush rewrites the full file (existing rows first, then
/// rows inserted during this run). Needs exclusive access to the file while
/// a run is in progress.
///
/// Only rows without a usable URL, or repeating a URL already loaded, are
/// dropped. A row whose typed columns do not decode is kept with what can be
/// read from it.
pub struct CsvStore {
    path: PathBuf,
    rows: Vec<JobRecord>,
    index: HashSet<String>,
    dirty: bool,
}

impl CsvStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let mut store = CsvStore {
            path,
            rows: Vec::new(),
            index: HashSet::new(),
            dirty: false,
        };

        if !store.path.exists() {
            info!("No existing CSV at {:?}. Starting fresh.", store.path);
            return Ok(store);
        }

        let csv_err = |path: &Path, source: csv::Error| StorageError::Csv { path: path.to_path_buf(), source };

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(&store.path)
            .map_err(|e| csv_err(&store.path, e))?;
        let headers = legacy_headers(reader.headers().map_err(|e| csv_err(&store.path, e))?);

        let mut invalid = 0;
        let mut repeated = 0;
        let mut salvaged = 0;
        for (line, result) in reader.records().enumerate() {
            // Undecodable bytes: refuse to load rather than rewrite without them.
            let raw = result.map_err(|e| csv_err(&store.path, e))?;

            let mut row = match raw.deserialize::<JobRecord>(Some(&headers)) {
                Ok(row) => row,
                Err(e) => {
                    warn!("Row {} of {:?} kept with defaults for unreadable columns: {}", line + 2, store.path, e);
                    salvaged += 1;
                    salvage(&headers, &raw)
                }
            };

            let key = match url_normalizer::normalize(&row.url) {
                Ok(key) => key,
                Err(e) => {
                    warn!("Skipped invalid URL in existing CSV ({}): '{}'", e, row.url);
                    invalid += 1;
                    continue;
                }
            };

            if !store.index.insert(key.clone()) {
                warn!("Row {} of {:?} repeats {}; keeping the first one", line + 2, store.path, key);
                repeated += 1;
                continue;
            }
            row.normalized_url = key;
            row.status = RecordStatus::Old;
            store.rows.push(row);
        }

        // Existing rows are re-tagged, so the file must be rewritten even if
        // nothing new arrives.
        store.dirty = !store.rows.is_empty() || invalid > 0 || repeated > 0;
        if invalid + repeated + salvaged > 0 {
            error!(
                "{:?}: {} rows without a usable URL dropped, {} repeated rows dropped, {} rows salvaged",
                store.path, invalid, repeated, salvaged
            );
        }
        info!("Loaded {} existing jobs from {:?}", store.rows.len(), store.path);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> &[JobRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn rewrite(&self) -> Result<(), StorageError> {
        let csv_err = |source: csv::Error| StorageError::Csv { path: self.path.clone(), source };

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&self.path)
            .map_err(csv_err)?;
        writer.write_record(HEADER).map_err(csv_err)?;
        for row in &self.rows {
            writer.serialize(row).map_err(csv_err)?;
        }
        writer.flush().map_err(|source| StorageError::Io { path: self.path.clone(), source })?;
        Ok(())
    }
}

/// Files from the first version of the tool carry the card badge in `status`
/// and the new/old tag in `etat`.
fn legacy_headers(headers: &StringRecord) -> StringRecord {
    if headers.iter().any(|h| h == "etat") {
        headers
            .iter()
            .map(|h| if h == "status" { "listing_status" } else { h })
            .collect()
    } else {
        headers.clone()
    }
}

/// Best-effort read of a row that failed typed decoding.
fn salvage(headers: &StringRecord, raw: &StringRecord) -> JobRecord {
    let field = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|i| raw.get(i))
            .unwrap_or("")
            .to_string()
    };

    let mut listing_status = field("listing_status");
    let status = field("status");
    if listing_status.is_empty() && !matches!(status.as_str(), "" | "new" | "old") {
        listing_status = status;
    }

    JobRecord {
        url: field("url"),
        normalized_url: String::new(),
        title: field("title"),
        company: field("company"),
        location: field("location"),
        posting_time: posting_time_format::parse(&field("posting_time")),
        work_type: WorkType::detect(&field("work_type")),
        listing_status,
        source_page: field("source_page").parse().unwrap_or(0),
        status: RecordStatus::Old,
    }
}

impl Sink for CsvStore {
    fn contains(&mut self, key: &str) -> Result<bool, StorageError> {
        Ok(self.index.contains(key))
    }

    fn insert(&mut self, record: &JobRecord) -> Result<InsertOutcome, StorageError> {
        if !self.index.insert(record.normalized_url.clone()) {
            return Ok(InsertOutcome::AlreadyPresent);
        }
        self.rows.push(record.clone());
        self.dirty = true;
        Ok(InsertOutcome::Inserted)
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        if !self.dirty {
            return Ok(());
        }
        self.rewrite()?;
        self.dirty = false;
        info!("Wrote {} jobs to {:?}", self.rows.len(), self.path);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("csv file {}", self.path.display())
    }
}
