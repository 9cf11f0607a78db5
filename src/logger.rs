use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// `2024-05-10 12:00:00 [INFO] job_scraper_lib::fetcher - message`
fn builder() -> Builder {
    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .filter(None, LevelFilter::Info)
        // The HTML parser is chatty at debug.
        .filter(Some("html5ever"), LevelFilter::Warn)
        .filter(Some("selectors"), LevelFilter::Warn)
        .parse_default_env();
    builder
}

/// Info by default, `RUST_LOG` overrides. Calling it twice is harmless.
pub fn init() {
    if builder().try_init().is_ok() {
        log::debug!("Logger initialized.");
    }
}
