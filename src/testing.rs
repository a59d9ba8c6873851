//! In-process stand-ins for the two stores, with failure injection.

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Value, json};

use crate::{
    BoxFuture,
    domain::{Blog, NewBlog},
    search::{BlogDocument, Refresh, SearchCriteria, SearchError, SearchIndex},
    store::{self, BlogStore, SeaOrmBlogStore, StoreError},
};

pub async fn memory_store() -> SeaOrmBlogStore {
    let db = store::connect("sqlite::memory:", 1).await.unwrap();
    store::migrate(&db).await.unwrap();
    SeaOrmBlogStore::new(db)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexCall {
    Upsert { id: i32, refresh: Refresh },
    Delete { id: i32, refresh: Refresh },
    Search(SearchCriteria),
}

#[derive(Default)]
pub struct MemoryIndex {
    docs: Mutex<BTreeMap<i32, BlogDocument>>,
    calls: Mutex<Vec<IndexCall>>,
    pub fail_upsert: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_search: AtomicBool,
}

impl MemoryIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn doc(&self, id: i32) -> Option<BlogDocument> {
        self.docs.lock().unwrap().get(&id).cloned()
    }

    pub fn calls(&self) -> Vec<IndexCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<IndexCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, IndexCall::Search(_)))
            .collect()
    }

    fn record(&self, call: IndexCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn injected() -> SearchError {
    SearchError::Status {
        status: 503,
        body: "injected failure".to_string(),
    }
}

fn matches(doc: &BlogDocument, criteria: &SearchCriteria) -> bool {
    if let Some(query) = &criteria.query {
        let hit = query.split_whitespace().any(|term| {
            let term = term.to_lowercase();
            doc.title.to_lowercase().contains(&term) || doc.content.to_lowercase().contains(&term)
        });
        if !hit {
            return false;
        }
    }
    let Ok(created_at) = DateTime::parse_from_rfc3339(&doc.created_at) else {
        return false;
    };
    let created_at = created_at.with_timezone(&Utc);
    if let Some(start) = criteria.start_date.as_deref().and_then(|s| bound(s, false)) {
        if created_at < start {
            return false;
        }
    }
    if let Some(end) = criteria.end_date.as_deref().and_then(|s| bound(s, true)) {
        if created_at > end {
            return false;
        }
    }
    true
}

/// Parses a range bound the way the index does: a date without a time
/// covers the whole day, so an upper bound rounds up to its last instant.
fn bound(raw: &str, round_up: bool) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let at = if round_up {
        day.and_hms_nano_opt(23, 59, 59, 999_999_999)?
    } else {
        day.and_hms_opt(0, 0, 0)?
    };
    Some(at.and_utc())
}

impl SearchIndex for MemoryIndex {
    fn upsert(
        &self,
        id: i32,
        doc: BlogDocument,
        refresh: Refresh,
    ) -> BoxFuture<'_, Result<(), SearchError>> {
        Box::pin(async move {
            self.record(IndexCall::Upsert { id, refresh });
            if self.fail_upsert.load(Ordering::SeqCst) {
                return Err(injected());
            }
            self.docs.lock().unwrap().insert(id, doc);
            Ok(())
        })
    }

    fn delete(&self, id: i32, refresh: Refresh) -> BoxFuture<'_, Result<(), SearchError>> {
        Box::pin(async move {
            self.record(IndexCall::Delete { id, refresh });
            if self.fail_delete.load(Ordering::SeqCst) {
                return Err(injected());
            }
            self.docs.lock().unwrap().remove(&id);
            Ok(())
        })
    }

    fn search(&self, criteria: SearchCriteria) -> BoxFuture<'_, Result<Value, SearchError>> {
        Box::pin(async move {
            self.record(IndexCall::Search(criteria.clone()));
            if self.fail_search.load(Ordering::SeqCst) {
                return Err(injected());
            }
            let docs = self.docs.lock().unwrap();
            let matched: Vec<(&i32, &BlogDocument)> =
                docs.iter().filter(|(_, d)| matches(d, &criteria)).collect();
            let hits: Vec<Value> = matched
                .iter()
                .skip(criteria.offset() as usize)
                .take(criteria.limit() as usize)
                .map(|(id, doc)| json!({ "_id": id.to_string(), "_score": 1.0, "_source": doc }))
                .collect();
            Ok(json!({
                "hits": {
                    "total": { "value": matched.len(), "relation": "eq" },
                    "hits": hits,
                }
            }))
        })
    }
}

/// Reads succeed with whatever was seeded; every write fails.
pub struct FailingStore {
    pub seeded: Option<Blog>,
}

fn db_down() -> StoreError {
    StoreError::Db(sea_orm::DbErr::Custom("injected failure".to_string()))
}

impl BlogStore for FailingStore {
    fn create(&self, _blog: NewBlog) -> BoxFuture<'_, Result<Blog, StoreError>> {
        Box::pin(async move { Err(db_down()) })
    }

    fn get(&self, id: i32) -> BoxFuture<'_, Result<Option<Blog>, StoreError>> {
        Box::pin(async move { Ok(self.seeded.clone().filter(|b| b.id == id)) })
    }

    fn save(&self, _blog: Blog) -> BoxFuture<'_, Result<Blog, StoreError>> {
        Box::pin(async move { Err(db_down()) })
    }

    fn delete(&self, _id: i32) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move { Err(db_down()) })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn doc_at(created_at: &str) -> BlogDocument {
        BlogDocument {
            title: "Test Post".to_string(),
            content: "body".to_string(),
            author: "alice".to_string(),
            category: "notes".to_string(),
            created_at: created_at.to_string(),
        }
    }

    fn within(start: Option<&str>, end: Option<&str>) -> SearchCriteria {
        SearchCriteria {
            start_date: start.map(str::to_string),
            end_date: end.map(str::to_string),
            ..SearchCriteria::default()
        }
    }

    #[test]
    fn date_only_end_bound_covers_the_whole_day() {
        let doc = doc_at("2026-01-15T10:00:00Z");
        assert!(matches(&doc, &within(None, Some("2026-01-15"))));
        assert!(!matches(&doc, &within(None, Some("2026-01-14"))));
    }

    #[test]
    fn date_only_start_bound_begins_at_midnight() {
        let doc = doc_at("2026-01-15T00:00:00Z");
        assert!(matches(&doc, &within(Some("2026-01-15"), None)));
        assert!(!matches(&doc, &within(Some("2026-01-16"), None)));
    }

    #[test]
    fn full_timestamp_bounds_compare_exactly() {
        let doc = doc_at("2026-01-15T10:00:00Z");
        assert!(matches(
            &doc,
            &within(Some("2026-01-15T10:00:00Z"), Some("2026-01-15T10:00:00+00:00"))
        ));
        assert!(!matches(&doc, &within(None, Some("2026-01-15T09:59:59Z"))));
    }

    #[test]
    fn unparseable_bound_is_ignored() {
        let doc = doc_at("2026-01-15T10:00:00Z");
        assert_eq!(bound("not a date", true), None);
        assert!(matches(&doc, &within(Some("not a date"), None)));
    }
}
