use std::time::Duration;

use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ActiveValue::Unchanged,
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
};
use tracing::info;

use crate::{
    BoxFuture,
    domain::{Blog, NewBlog},
};

pub mod entity;

#[derive(Debug)]
pub enum StoreError {
    Db(DbErr),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(e) => write!(f, "database error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Db(e) => Some(e),
        }
    }
}

impl From<DbErr> for StoreError {
    fn from(value: DbErr) -> Self {
        Self::Db(value)
    }
}

/// System of record for blogs.
pub trait BlogStore: Send + Sync + 'static {
    fn create(&self, blog: NewBlog) -> BoxFuture<'_, Result<Blog, StoreError>>;

    fn get(&self, id: i32) -> BoxFuture<'_, Result<Option<Blog>, StoreError>>;

    /// Writes the mutable fields of an existing row. `created_at` is never rewritten.
    fn save(&self, blog: Blog) -> BoxFuture<'_, Result<Blog, StoreError>>;

    /// Returns the number of rows removed; a missing id removes zero rows.
    fn delete(&self, id: i32) -> BoxFuture<'_, Result<u64, StoreError>>;
}

pub async fn connect(url: &str, max_connections: u32) -> Result<DatabaseConnection, StoreError> {
    let mut opts = ConnectOptions::new(url.to_string());
    opts.max_connections(max_connections)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    let db = Database::connect(opts).await?;
    info!(backend = ?db.get_database_backend(), "connected to database");
    Ok(db)
}

/// Creates the `blogs` table if it does not exist yet.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), StoreError> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let mut stmt = schema.create_table_from_entity(entity::Entity);
    stmt.if_not_exists();
    db.execute(backend.build(&stmt)).await?;
    Ok(())
}

#[derive(Clone)]
pub struct SeaOrmBlogStore {
    db: DatabaseConnection,
}

impl SeaOrmBlogStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl BlogStore for SeaOrmBlogStore {
    fn create(&self, blog: NewBlog) -> BoxFuture<'_, Result<Blog, StoreError>> {
        Box::pin(async move {
            let row = entity::ActiveModel {
                id: NotSet,
                title: Set(blog.fields.title),
                content: Set(blog.fields.content),
                author: Set(blog.fields.author),
                category: Set(blog.fields.category),
                created_at: Set(blog.created_at),
            };
            Ok(row.insert(&self.db).await?.into())
        })
    }

    fn get(&self, id: i32) -> BoxFuture<'_, Result<Option<Blog>, StoreError>> {
        Box::pin(async move {
            let row = entity::Entity::find_by_id(id).one(&self.db).await?;
            Ok(row.map(Blog::from))
        })
    }

    fn save(&self, blog: Blog) -> BoxFuture<'_, Result<Blog, StoreError>> {
        Box::pin(async move {
            let row = entity::ActiveModel {
                id: Unchanged(blog.id),
                title: Set(blog.title),
                content: Set(blog.content),
                author: Set(blog.author),
                category: Set(blog.category),
                created_at: Unchanged(blog.created_at),
            };
            Ok(row.update(&self.db).await?.into())
        })
    }

    fn delete(&self, id: i32) -> BoxFuture<'_, Result<u64, StoreError>> {
        Box::pin(async move {
            let res = entity::Entity::delete_by_id(id).exec(&self.db).await?;
            Ok(res.rows_affected)
        })
    }
}
