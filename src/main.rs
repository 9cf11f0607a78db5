use job_scraper_lib::{logger, pipeline, Config};

use std::error::Error;
use log::{info, error};

fn main() -> Result<(), Box<dyn Error>> {
    logger::init();
    info!("Starting job scraper...");

    // 1. Configuration (.env + environment)
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    info!(
        "Scraping with: keyword='{}', location='{}', hours={:?}, days={}, work_type='{}', max_jobs={}, storage={}",
        config.keyword,
        config.location,
        config.hours,
        config.days,
        config.work_type,
        config.max_jobs,
        config.storage_label()
    );

    // 2. Run the pipeline. Counts are reported whether or not it completes.
    match pipeline::run(&config) {
        Ok(summary) => {
            info!(
                "Saved {} new jobs, skipped {} duplicates and {} invalid jobs ({} filtered out, {} pages).",
                summary.new_count,
                summary.duplicate_count,
                summary.invalid_count,
                summary.filtered_count,
                summary.pages_fetched
            );
            Ok(())
        }
        Err(failure) => {
            error!(
                "Scraping aborted after {} new, {} duplicate and {} invalid jobs.",
                failure.summary.new_count,
                failure.summary.duplicate_count,
                failure.summary.invalid_count
            );
            Err(failure.into())
        }
    }
}
