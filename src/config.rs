//! Run configuration read from the environment (and an optional `.env`).

use std::path::PathBuf;
use std::str::FromStr;

use log::{debug, info, warn};

use crate::error::ConfigError;
use crate::models::{Recency, WorkTypeFilter};

pub const DEFAULT_KEYWORD: &str = "Scraping";
pub const DEFAULT_LOCATION: &str = "worldwide";
pub const DEFAULT_DAYS: u32 = 30;
pub const DEFAULT_MAX_JOBS: usize = 50;
pub const DEFAULT_OUTPUT_FILE: &str = "jobs_output.csv";
pub const DEFAULT_MONGO_URI: &str = "mongodb://localhost:27017";
pub const DEFAULT_MONGO_DB: &str = "linkedin";
pub const DEFAULT_MONGO_COLLECTION: &str = "scraping";

const MAX_HOURS: u32 = 720;
const MAX_DAYS: u32 = 30;
const MAX_JOBS_CEILING: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// `host:port`, optionally with a scheme.
    pub url: String,
    pub username: String,
    pub password: String,
}

impl ProxyConfig {
    pub fn endpoint(&self) -> String {
        if self.url.contains("://") {
            self.url.clone()
        } else {
            format!("http://{}", self.url)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Csv {
        output_file: PathBuf,
    },
    Mongo {
        uri: String,
        database: String,
        collection: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub keyword: String,
    pub location: String,
    pub hours: Option<u32>,
    pub days: u32,
    pub work_type: WorkTypeFilter,
    pub max_jobs: usize,
    pub proxy: Option<ProxyConfig>,
    pub storage: StorageConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => info!("Loaded environment from {:?}", path),
            Err(e) if e.not_found() => debug!("No .env file found, using process environment"),
            Err(e) => warn!("Ignoring unreadable .env file: {}", e),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let hours = get("HOURS").and_then(|raw| parse_number::<u32>("HOURS", &raw));
        let days = get("DAYS")
            .and_then(|raw| parse_number::<u32>("DAYS", &raw))
            .unwrap_or(DEFAULT_DAYS);
        let max_jobs = get("MAX_JOBS")
            .and_then(|raw| parse_number::<usize>("MAX_JOBS", &raw))
            .unwrap_or(DEFAULT_MAX_JOBS);

        if let Some(hours) = hours {
            check_range("HOURS", hours as u64, 1, MAX_HOURS as u64)?;
        }
        check_range("DAYS", days as u64, 1, MAX_DAYS as u64)?;
        check_range("MAX_JOBS", max_jobs as u64, 1, MAX_JOBS_CEILING as u64)?;

        let work_type = match get("WORK_TYPE") {
            None => WorkTypeFilter::Remote,
            Some(raw) => WorkTypeFilter::parse(&raw).unwrap_or_else(|| {
                warn!("Unknown WORK_TYPE '{}', searching all work types", raw);
                WorkTypeFilter::All
            }),
        };

        let proxy = match (get("PROXY_URL"), get("PROXY_USERNAME"), get("PROXY_PASSWORD")) {
            (Some(url), Some(username), Some(password)) => Some(ProxyConfig {
                url,
                username,
                password,
            }),
            (Some(_), _, _) => {
                warn!("PROXY_URL is set without PROXY_USERNAME/PROXY_PASSWORD, proxy disabled");
                None
            }
            _ => None,
        };

        let storage_type = get("STORAGE_TYPE").unwrap_or_else(|| "csv".to_string());
        let storage = match storage_type.to_lowercase().as_str() {
            "csv" => StorageConfig::Csv {
                output_file: PathBuf::from(
                    get("OUTPUT_FILE").unwrap_or_else(|| DEFAULT_OUTPUT_FILE.to_string()),
                ),
            },
            "mongo" | "mongodb" => StorageConfig::Mongo {
                uri: get("MONGO_URI").unwrap_or_else(|| DEFAULT_MONGO_URI.to_string()),
                database: get("MONGO_DB").unwrap_or_else(|| DEFAULT_MONGO_DB.to_string()),
                collection: get("MONGO_COLLECTION")
                    .unwrap_or_else(|| DEFAULT_MONGO_COLLECTION.to_string()),
            },
            _ => return Err(ConfigError::UnknownStorage(storage_type)),
        };

        Ok(Config {
            keyword: get("KEYWORD").unwrap_or_else(|| DEFAULT_KEYWORD.to_string()),
            location: get("LOCATION").unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            hours,
            days,
            work_type,
            max_jobs,
            proxy,
            storage,
        })
    }

    pub fn recency(&self) -> Recency {
        Recency::resolve(self.hours, self.days)
    }

    pub fn storage_label(&self) -> String {
        match &self.storage {
            StorageConfig::Csv { output_file } => format!("csv ({})", output_file.display()),
            StorageConfig::Mongo {
                database,
                collection,
                ..
            } => format!("mongo ({}.{})", database, collection),
        }
    }
}

fn parse_number<T: FromStr>(name: &str, raw: &str) -> Option<T> {
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Invalid {} value '{}', using default", name, raw);
            None
        }
    }
}

fn check_range(name: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}
