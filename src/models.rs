use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkType {
    Remote,
    Hybrid,
    Onsite,
    #[default]
    Unknown,
}

impl WorkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkType::Remote => "remote",
            WorkType::Hybrid => "hybrid",
            WorkType::Onsite => "onsite",
            WorkType::Unknown => "unknown",
        }
    }

    /// Reads a work-type signal out of free text such as "Paris (Hybrid)".
    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("remote") || lower.contains("télétravail") {
            WorkType::Remote
        } else if lower.contains("hybrid") || lower.contains("hybride") {
            WorkType::Hybrid
        } else if lower.contains("on-site") || lower.contains("onsite") || lower.contains("on site") {
            WorkType::Onsite
        } else {
            WorkType::Unknown
        }
    }
}

impl fmt::Display for WorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `new`/`old` tag written next to every stored job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    New,
    Old,
}

/// Work-type filter requested from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkTypeFilter {
    Remote,
    Hybrid,
    Onsite,
    All,
}

impl WorkTypeFilter {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "remote" => Some(WorkTypeFilter::Remote),
            "hybrid" => Some(WorkTypeFilter::Hybrid),
            "onsite" | "on-site" => Some(WorkTypeFilter::Onsite),
            "all" => Some(WorkTypeFilter::All),
            _ => None,
        }
    }

    /// Value of the provider's `f_WT` parameter.
    pub fn to_param(&self) -> &'static str {
        match self {
            WorkTypeFilter::Onsite => "1",
            WorkTypeFilter::Remote => "2",
            WorkTypeFilter::Hybrid => "3",
            WorkTypeFilter::All => "1,2,3",
        }
    }

    /// `Unknown` always passes: the provider has already filtered server-side.
    pub fn accepts(&self, work_type: WorkType) -> bool {
        match (self, work_type) {
            (WorkTypeFilter::All, _) | (_, WorkType::Unknown) => true,
            (WorkTypeFilter::Remote, WorkType::Remote) => true,
            (WorkTypeFilter::Hybrid, WorkType::Hybrid) => true,
            (WorkTypeFilter::Onsite, WorkType::Onsite) => true,
            _ => false,
        }
    }
}

impl fmt::Display for WorkTypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkTypeFilter::Remote => "remote",
            WorkTypeFilter::Hybrid => "hybrid",
            WorkTypeFilter::Onsite => "onsite",
            WorkTypeFilter::All => "all",
        };
        f.write_str(name)
    }
}

/// Recency window. Hours win over days when both are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recency {
    Hours(u32),
    Days(u32),
}

impl Recency {
    pub fn resolve(hours: Option<u32>, days: u32) -> Self {
        match hours {
            Some(hours) => Recency::Hours(hours),
            None => Recency::Days(days),
        }
    }

    pub fn as_seconds(&self) -> u64 {
        match self {
            Recency::Hours(hours) => u64::from(*hours) * 3600,
            Recency::Days(days) => u64::from(*days) * 86_400,
        }
    }

    pub fn window(&self) -> Duration {
        match self {
            Recency::Hours(hours) => Duration::hours(i64::from(*hours)),
            Recency::Days(days) => Duration::days(i64::from(*days)),
        }
    }

    /// Value of the provider's `f_TPR` parameter.
    pub fn to_param(&self) -> String {
        format!("r{}", self.as_seconds())
    }
}

impl fmt::Display for Recency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recency::Hours(hours) => write!(f, "{}h", hours),
            Recency::Days(days) => write!(f, "{}d", days),
        }
    }
}

/// One scraped posting.
///
/// The parser fills the scraped fields, the writer fills `normalized_url`
/// and `status`. Column order here is the CSV column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub normalized_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, with = "posting_time_format")]
    pub posting_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub work_type: WorkType,
    #[serde(default)]
    pub listing_status: String,
    #[serde(default)]
    pub source_page: u32,
    #[serde(default, alias = "etat")]
    pub status: RecordStatus,
}

impl JobRecord {
    pub fn is_within(&self, cutoff: DateTime<Utc>) -> bool {
        self.posting_time.map_or(true, |posted| posted >= cutoff)
    }
}

/// Stored as `YYYY-MM-DD HH:MM:SS`. Unreadable values load as `None`.
pub mod posting_time_format {
    use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => serializer.serialize_str(&time.format(FORMAT).to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        NaiveDateTime::parse_from_str(raw, FORMAT)
            .map(|naive| Utc.from_utc_datetime(&naive))
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).map(|t| t.with_timezone(&Utc)).ok())
    }
}

/// Counters for one pipeline execution. Not persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub new_count: usize,
    pub duplicate_count: usize,
    pub invalid_count: usize,
    /// Dropped by the recency or work-type filter before reaching the writer.
    pub filtered_count: usize,
    pub pages_fetched: usize,
}

impl RunSummary {
    /// New + duplicate, compared against `max_jobs`.
    pub fn accepted(&self) -> usize {
        self.new_count + self.duplicate_count
    }

    pub fn processed(&self) -> usize {
        self.accepted() + self.invalid_count
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "new={}, duplicate={}, invalid={}, filtered={}, pages={}",
            self.new_count,
            self.duplicate_count,
            self.invalid_count,
            self.filtered_count,
            self.pages_fetched
        )
    }
}
