//! Fetch → parse → filter → write, one page at a time.

use chrono::{DateTime, Utc};
use log::{error, info, warn};

use crate::config::{Config, StorageConfig};
use crate::csv_store::CsvStore;
use crate::error::{FetchError, PipelineError, RunFailure, StorageError};
use crate::fetcher::{FetchRequest, Fetcher, Transport};
use crate::models::{JobRecord, Recency, RunSummary, WorkTypeFilter};
use crate::mongo_store::{DocumentSink, MongoStore};
use crate::parser::Parser;
use crate::writer::{self, Sink, WriteOutcome};

/// Effective search filters for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub keyword: String,
    pub location: String,
    pub recency: Recency,
    pub work_type: WorkTypeFilter,
    pub max_jobs: usize,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        RunSettings {
            keyword: config.keyword.clone(),
            location: config.location.clone(),
            recency: config.recency(),
            work_type: config.work_type,
            max_jobs: config.max_jobs,
        }
    }

    pub fn first_request(&self) -> FetchRequest {
        FetchRequest {
            keyword: self.keyword.clone(),
            location: self.location.clone(),
            recency: self.recency,
            work_type: self.work_type,
            offset: 0,
        }
    }

    fn admits(&self, candidate: &JobRecord, cutoff: DateTime<Utc>) -> bool {
        candidate.is_within(cutoff) && self.work_type.accepts(candidate.work_type)
    }
}

/// Mutable state of a single run: the counters and the sink being written.
pub struct RunContext<'s, S: Sink + ?Sized> {
    pub summary: RunSummary,
    sink: &'s mut S,
}

impl<'s, S: Sink + ?Sized> RunContext<'s, S> {
    pub fn new(sink: &'s mut S) -> Self {
        RunContext {
            summary: RunSummary::default(),
            sink,
        }
    }

    fn write(&mut self, candidate: JobRecord) -> Result<WriteOutcome, StorageError> {
        let outcome = writer::write(candidate, &mut *self.sink)?;
        match outcome {
            WriteOutcome::New => self.summary.new_count += 1,
            WriteOutcome::Duplicate => self.summary.duplicate_count += 1,
            WriteOutcome::Invalid => self.summary.invalid_count += 1,
        }
        Ok(outcome)
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        self.sink.flush()
    }
}

pub struct Pipeline<T: Transport> {
    fetcher: Fetcher<T>,
    parser: Parser,
    settings: RunSettings,
}

impl<T: Transport> Pipeline<T> {
    pub fn new(fetcher: Fetcher<T>, settings: RunSettings) -> Self {
        Pipeline {
            fetcher,
            parser: Parser::new(),
            settings,
        }
    }

    pub fn fetcher(&self) -> &Fetcher<T> {
        &self.fetcher
    }

    /// Runs to completion. On a fatal error the failure still carries the
    /// counts accumulated before the abort.
    pub fn run<S: Sink + ?Sized>(&self, sink: &mut S) -> Result<RunSummary, RunFailure> {
        info!(
            "Scraping '{}' in '{}' (recency {}, work type {}, max {} jobs) into {}",
            self.settings.keyword,
            self.settings.location,
            self.settings.recency,
            self.settings.work_type,
            self.settings.max_jobs,
            sink.describe()
        );

        let mut ctx = RunContext::new(sink);
        let result = self.drive(&mut ctx);
        let summary = ctx.summary;

        match result {
            Ok(()) => {
                info!("Run complete: {}", summary);
                Ok(summary)
            }
            Err(source) => {
                error!("Run aborted: {} ({})", source, summary);
                Err(RunFailure { summary, source })
            }
        }
    }

    fn drive<S: Sink + ?Sized>(&self, ctx: &mut RunContext<'_, S>) -> Result<(), PipelineError> {
        let mut request = self.settings.first_request();

        loop {
            if request.offset > 0 {
                self.fetcher.pace();
            }
            info!("Fetching jobs starting at index {}...", request.offset);

            let page = match self.fetcher.fetch(&request) {
                Ok(page) => page,
                Err(e @ FetchError::BadResponse { .. }) => {
                    warn!("{}; treating as end of results", e);
                    break;
                }
                Err(e) => {
                    // The fetch error is what ends the run; a failed flush is only logged.
                    if let Err(flush_err) = ctx.flush() {
                        error!("Could not save progress before aborting: {}", flush_err);
                    }
                    return Err(e.into());
                }
            };
            ctx.summary.pages_fetched += 1;

            let candidates = self.parser.parse(&page);
            let on_page = candidates.remaining();
            if on_page == 0 {
                info!("No more jobs found.");
                break;
            }

            let cutoff = page.fetched_at - self.settings.recency.window();
            let mut out_of_window = 0;
            let mut limit_reached = false;

            for candidate in candidates {
                if !candidate.is_within(cutoff) {
                    out_of_window += 1;
                }
                if !self.settings.admits(&candidate, cutoff) {
                    ctx.summary.filtered_count += 1;
                    continue;
                }
                ctx.write(candidate)?;
                if ctx.summary.accepted() >= self.settings.max_jobs {
                    limit_reached = true;
                    break;
                }
            }

            ctx.flush()?;
            info!(
                "Page {}: {} cards. Totals: {}",
                page.page, on_page, ctx.summary
            );

            if limit_reached {
                info!("Reached max_jobs limit of {}.", self.settings.max_jobs);
                break;
            }
            // Results come newest first: a page entirely outside the window
            // means every later page is too.
            if out_of_window == on_page {
                info!("Whole page is older than {}; stopping.", self.settings.recency);
                break;
            }

            request = request.next_page();
        }

        ctx.flush()?;
        Ok(())
    }
}

/// Opens the configured sink.
pub fn open_sink(storage: &StorageConfig) -> Result<Box<dyn Sink>, StorageError> {
    match storage {
        StorageConfig::Csv { output_file } => Ok(Box::new(CsvStore::open(output_file)?)),
        StorageConfig::Mongo {
            uri,
            database,
            collection,
        } => Ok(Box::new(DocumentSink::new(MongoStore::connect(
            uri, database, collection,
        )?))),
    }
}

/// Builds the HTTP fetcher and the sink from `config`, then runs.
pub fn run(config: &Config) -> Result<RunSummary, RunFailure> {
    let abort = |source: PipelineError| RunFailure {
        summary: RunSummary::default(),
        source,
    };

    let fetcher = Fetcher::connect(config.proxy.as_ref()).map_err(|e| abort(e.into()))?;
    let mut sink = open_sink(&config.storage).map_err(|e| abort(e.into()))?;

    Pipeline::new(fetcher, RunSettings::from_config(config)).run(&mut sink)
}
