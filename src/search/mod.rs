use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{BoxFuture, domain::Blog};

pub mod elasticsearch;

pub use elasticsearch::{ElasticsearchIndex, connect_with_retry};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Denormalized copy of a blog as stored in the search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogDocument {
    pub title: String,
    pub content: String,
    pub author: String,
    pub category: String,
    pub created_at: String,
}

impl From<&Blog> for BlogDocument {
    fn from(blog: &Blog) -> Self {
        Self {
            title: blog.title.clone(),
            content: blog.content.clone(),
            author: blog.author.clone(),
            category: blog.category.clone(),
            created_at: blog.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// When a write becomes visible to searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Refresh the affected shards before returning.
    Immediate,
    /// Return once a scheduled refresh has made the write visible.
    WaitFor,
    /// Leave the write to the index's periodic refresh.
    Background,
}

impl Refresh {
    pub fn as_param(self) -> &'static str {
        match self {
            Self::Immediate => "true",
            Self::WaitFor => "wait_for",
            Self::Background => "false",
        }
    }
}

/// Raw query-string parameters of a search request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    pub query: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<String>,
    pub size: Option<String>,
}

/// Repeated keys keep their first value; unknown keys are ignored.
impl FromIterator<(String, String)> for SearchParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(pairs: I) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "query" => &mut params.query,
                "startDate" => &mut params.start_date,
                "endDate" => &mut params.end_date,
                "page" => &mut params.page,
                "size" => &mut params.size,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCriteria {
    pub query: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: u64,
    pub size: u64,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            query: None,
            start_date: None,
            end_date: None,
            page: DEFAULT_PAGE,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl From<SearchParams> for SearchCriteria {
    fn from(params: SearchParams) -> Self {
        Self {
            query: non_blank(params.query),
            start_date: non_blank(params.start_date),
            end_date: non_blank(params.end_date),
            page: positive_or(params.page.as_deref(), DEFAULT_PAGE),
            size: positive_or(params.size.as_deref(), DEFAULT_PAGE_SIZE),
        }
    }
}

impl SearchCriteria {
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.size)
    }

    pub fn limit(&self) -> u64 {
        self.size
    }

    /// Builds the `_search` request body.
    pub fn to_query_body(&self) -> Value {
        let must = match &self.query {
            Some(query) => json!({
                "multi_match": {
                    "query": query,
                    "fields": ["title", "content"],
                }
            }),
            None => json!({ "match_all": {} }),
        };

        let mut range = Map::new();
        if let Some(start) = &self.start_date {
            range.insert("gte".to_string(), Value::String(start.clone()));
        }
        if let Some(end) = &self.end_date {
            range.insert("lte".to_string(), Value::String(end.clone()));
        }
        let filter: Vec<Value> = if range.is_empty() {
            Vec::new()
        } else {
            vec![json!({ "range": { "createdAt": range } })]
        };

        json!({
            "from": self.offset(),
            "size": self.limit(),
            "query": {
                "bool": {
                    "must": [must],
                    "filter": filter,
                }
            }
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn positive_or(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v >= 1)
        .map(|v| v as u64)
        .unwrap_or(default)
}

#[derive(Debug)]
pub enum SearchError {
    Http(reqwest::Error),
    Status { status: u16, body: String },
    Json(serde_json::Error),
}

impl std::fmt::Display for SearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(e) => write!(f, "search request failed: {e}"),
            Self::Status { status, body } => {
                write!(f, "search index returned status {status}: {body}")
            }
            Self::Json(e) => write!(f, "invalid search index response: {e}"),
        }
    }
}

impl std::error::Error for SearchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Status { .. } => None,
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Secondary, denormalized store queried for full-text and date ranges.
pub trait SearchIndex: Send + Sync + 'static {
    /// Replaces the whole document stored under `id`.
    fn upsert(
        &self,
        id: i32,
        doc: BlogDocument,
        refresh: Refresh,
    ) -> BoxFuture<'_, Result<(), SearchError>>;

    /// Removing a document that does not exist succeeds.
    fn delete(&self, id: i32, refresh: Refresh) -> BoxFuture<'_, Result<(), SearchError>>;

    /// Returns the index's response body untouched.
    fn search(&self, criteria: SearchCriteria) -> BoxFuture<'_, Result<Value, SearchError>>;
}
