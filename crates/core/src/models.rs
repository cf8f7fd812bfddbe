use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Reads an upload date given as `YYYY-MM-DD` or as a timestamp. The date
/// part is kept as written, without converting between offsets.
pub fn parse_upload_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|at| at.date_naive()))
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|at| at.date())
        })
}

fn upload_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_upload_date(&raw).ok_or_else(|| D::Error::custom(format!("invalid upload date `{raw}`")))
}

/// Page numbers outside the `i64` range saturate; the page window clamps them.
fn saturating_page<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(page) = number.as_i64() {
        return Ok(page);
    }
    if number.as_u64().is_some() {
        return Ok(i64::MAX);
    }

    match number.as_f64() {
        Some(page) if page.is_finite() && page.fract() == 0.0 => Ok(page as i64),
        _ => Err(D::Error::custom(format!("page must be an integer, got {number}"))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub title: String,
    pub content: String,
    pub file_path: String,
    #[serde(default = "today", deserialize_with = "upload_date")]
    pub uploaded_at: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "SearchQuery::first_page", deserialize_with = "saturating_page")]
    pub page: i64,
}

impl SearchQuery {
    fn first_page() -> i64 {
        1
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationMeta {
    pub current_page: u64,
    pub total_pages: u64,
    pub page_size: u64,
    pub total_documents: u64,
    pub returned_documents: u64,
}

impl PaginationMeta {
    pub fn empty(page_size: u64) -> Self {
        Self {
            current_page: 1,
            total_pages: 1,
            page_size,
            total_documents: 0,
            returned_documents: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub content: String,
    pub file_name: String,
    pub file_url: String,
    pub highlights: BTreeMap<String, Vec<String>>,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchPage {
    pub pagination: PaginationMeta,
    pub results: Vec<SearchResult>,
}

impl SearchPage {
    pub fn empty(page_size: u64) -> Self {
        Self {
            pagination: PaginationMeta::empty(page_size),
            results: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkOutcome {
    pub indexed: u64,
    pub failed: u64,
}

impl BulkOutcome {
    pub fn absorb(&mut self, other: BulkOutcome) {
        self.indexed += other.indexed;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClusterHealth {
    Green,
    Yellow,
    Red,
}

impl ClusterHealth {
    pub fn parse(status: &str) -> Option<Self> {
        match status.to_ascii_lowercase().as_str() {
            "green" => Some(Self::Green),
            "yellow" => Some(Self::Yellow),
            "red" => Some(Self::Red),
            _ => None,
        }
    }

    pub fn is_serving(self) -> bool {
        !matches!(self, Self::Red)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub batch_size: usize,
    pub workers: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|count| count.get().saturating_sub(2))
            .unwrap_or(1)
            .max(1);

        Self {
            batch_size: 1_000,
            workers,
        }
    }
}
