use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TITLE_MAX_CHARS: usize = 255;
pub const AUTHOR_MAX_CHARS: usize = 100;
pub const CATEGORY_MAX_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
    pub id: i32,
    pub title: String,
    pub content: String,
    pub author: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

impl Blog {
    /// Overwrites every mutable field; `id` and `created_at` stay put.
    pub fn apply(&mut self, fields: BlogFields) {
        self.title = fields.title;
        self.content = fields.content;
        self.author = fields.author;
        self.category = fields.category;
    }
}

/// A blog that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlog {
    pub fields: BlogFields,
    pub created_at: DateTime<Utc>,
}

/// Validated mutable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlogFields {
    pub title: String,
    pub content: String,
    pub author: String,
    pub category: String,
}

/// Request body for create and update. Fields are optional here so that a
/// missing field is reported as a validation error naming the field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlogInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
}

impl BlogInput {
    pub fn validate(self) -> Result<BlogFields, DomainError> {
        Ok(BlogFields {
            title: required("title", self.title, Some(TITLE_MAX_CHARS))?,
            content: required("content", self.content, None)?,
            author: required("author", self.author, Some(AUTHOR_MAX_CHARS))?,
            category: required("category", self.category, Some(CATEGORY_MAX_CHARS))?,
        })
    }
}

fn required(
    field: &'static str,
    value: Option<String>,
    max_chars: Option<usize>,
) -> Result<String, DomainError> {
    let Some(value) = value else {
        return Err(DomainError::MissingField { field });
    };
    if value.trim().is_empty() {
        return Err(DomainError::BlankField { field });
    }
    if let Some(max) = max_chars.filter(|max| value.chars().count() > *max) {
        return Err(DomainError::FieldTooLong { field, max });
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    MissingField { field: &'static str },
    BlankField { field: &'static str },
    FieldTooLong { field: &'static str, max: usize },
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField { field } => write!(f, "missing required field: {field}"),
            Self::BlankField { field } => write!(f, "field must not be blank: {field}"),
            Self::FieldTooLong { field, max } => {
                write!(f, "field exceeds {max} characters: {field}")
            }
        }
    }
}

impl std::error::Error for DomainError {}

/// Path ids that are not positive integers can never match a stored row.
pub fn parse_blog_id(raw: &str) -> Option<i32> {
    raw.parse::<i32>().ok().filter(|id| *id > 0)
}
