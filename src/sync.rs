//! Writes each blog mutation to the relational store and mirrors it into the
//! search index.
//!
//! Every operation is a straight line of steps. When a later step fails the
//! earlier ones stand: nothing is retried or compensated, and the error says
//! which store failed so callers can tell a missing row from a stale index.

use std::sync::Arc;

use chrono::{SubsecRound as _, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    domain::{Blog, BlogInput, DomainError, NewBlog},
    search::{BlogDocument, Refresh, SearchCriteria, SearchError, SearchIndex},
    store::{BlogStore, StoreError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOp {
    Create,
    Read,
    Update,
    Delete,
}

impl SyncOp {
    fn verb(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug)]
pub enum SyncError {
    InvalidInput(DomainError),
    NotFound { id: i32 },
    Persistence { op: SyncOp, source: StoreError },
    Index { op: SyncOp, source: SearchError },
    Transport(SearchError),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(e) => write!(f, "invalid request body: {e}"),
            Self::NotFound { id } => write!(f, "blog not found: {id}"),
            Self::Persistence { op, source } => {
                write!(f, "failed to {} blog in the database: {source}", op.verb())
            }
            Self::Index { op, source } => {
                write!(f, "failed to {} blog in the search index: {source}", op.verb())
            }
            Self::Transport(e) => write!(f, "failed to search blogs: {e}"),
        }
    }
}

impl SyncError {
    /// The message without the backend error chain, for callers outside
    /// the service.
    pub fn summary(&self) -> String {
        match self {
            Self::InvalidInput(_) | Self::NotFound { .. } => self.to_string(),
            Self::Persistence { op, .. } => {
                format!("failed to {} blog in the database", op.verb())
            }
            Self::Index { op, .. } => format!("failed to {} blog in the search index", op.verb()),
            Self::Transport(_) => "failed to search blogs".to_string(),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidInput(e) => Some(e),
            Self::NotFound { .. } => None,
            Self::Persistence { source, .. } => Some(source),
            Self::Index { source, .. } => Some(source),
            Self::Transport(e) => Some(e),
        }
    }
}

impl From<DomainError> for SyncError {
    fn from(value: DomainError) -> Self {
        Self::InvalidInput(value)
    }
}

#[derive(Clone)]
pub struct BlogService {
    store: Arc<dyn BlogStore>,
    index: Arc<dyn SearchIndex>,
}

impl BlogService {
    pub fn new(store: Arc<dyn BlogStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self { store, index }
    }

    pub async fn create(&self, input: BlogInput) -> Result<Blog, SyncError> {
        let fields = input.validate()?;
        let blog = self
            .store
            .create(NewBlog {
                fields,
                // Microseconds survive every supported column type unchanged.
                created_at: Utc::now().trunc_subsecs(6),
            })
            .await
            .map_err(|source| SyncError::Persistence {
                op: SyncOp::Create,
                source,
            })?;

        self.mirror(&blog, SyncOp::Create).await?;
        info!(id = blog.id, "blog created");
        Ok(blog)
    }

    pub async fn get(&self, id: i32) -> Result<Blog, SyncError> {
        self.store
            .get(id)
            .await
            .map_err(|source| SyncError::Persistence {
                op: SyncOp::Read,
                source,
            })?
            .ok_or(SyncError::NotFound { id })
    }

    /// Relational save first, then a full replace of the search document.
    /// A failed save leaves the old document searchable.
    pub async fn update(&self, id: i32, input: BlogInput) -> Result<Blog, SyncError> {
        let mut blog = self.get(id).await?;
        blog.apply(input.validate()?);

        let blog = self
            .store
            .save(blog)
            .await
            .map_err(|source| SyncError::Persistence {
                op: SyncOp::Update,
                source,
            })?;

        self.mirror(&blog, SyncOp::Update).await?;
        info!(id, "blog updated");
        Ok(blog)
    }

    pub async fn delete(&self, id: i32) -> Result<(), SyncError> {
        let removed = self
            .store
            .delete(id)
            .await
            .map_err(|source| SyncError::Persistence {
                op: SyncOp::Delete,
                source,
            })?;

        if let Err(source) = self.index.delete(id, Refresh::Immediate).await {
            warn!(id, error = %source, "blog deleted from database but not from search index");
            return Err(SyncError::Index {
                op: SyncOp::Delete,
                source,
            });
        }
        info!(id, removed, "blog deleted");
        Ok(())
    }

    pub async fn search(&self, criteria: SearchCriteria) -> Result<Value, SyncError> {
        self.index
            .search(criteria)
            .await
            .map_err(SyncError::Transport)
    }

    async fn mirror(&self, blog: &Blog, op: SyncOp) -> Result<(), SyncError> {
        let doc = BlogDocument::from(blog);
        if let Err(source) = self.index.upsert(blog.id, doc, Refresh::Immediate).await {
            warn!(id = blog.id, error = %source, "blog stored but not indexed");
            return Err(SyncError::Index { op, source });
        }
        Ok(())
    }
}
