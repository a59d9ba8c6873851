use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, FromRequest, FromRequestParts, Path, Query, Request},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, json};

use crate::{
    domain::{Blog, BlogInput, parse_blog_id},
    search::{SearchCriteria, SearchParams},
    sync::{BlogService, SyncError},
};

#[derive(Clone)]
pub struct AppState {
    pub blogs: BlogService,
}

#[derive(Debug)]
pub struct ApiError {
    message: String,
    status: StatusCode,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<SyncError> for ApiError {
    fn from(value: SyncError) -> Self {
        match value {
            SyncError::InvalidInput(_) => ApiError::invalid_request(value.to_string()),
            SyncError::NotFound { .. } => ApiError::not_found(value.to_string()),
            SyncError::Persistence { .. } | SyncError::Index { .. } | SyncError::Transport(_) => {
                tracing::error!(error = %value, "request failed");
                ApiError::internal(value.summary())
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// JSON body extractor. The body is parsed as JSON whatever `Content-Type`
/// the client sent.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::invalid_request(format!("invalid request body: {e}")))?;
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::invalid_request(format!("invalid request body: {e}")))?;
        Ok(Self(value))
    }
}

pub struct ApiQuery<T>(pub T);

#[axum::async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::invalid_request(format!("invalid query string: {e}")))?;
        Ok(Self(value))
    }
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Serialize)]
struct UpdatedResponse {
    message: &'static str,
    blog: Blog,
}

pub fn build_router(blogs: BlogService) -> Router {
    let app_state = AppState { blogs };

    Router::new()
        .route("/health", get(health))
        .route("/blogs", post(create_blog))
        .route("/blogs/search", get(search_blogs))
        .route(
            "/blogs/:id",
            get(get_blog).put(update_blog).delete(delete_blog),
        )
        .fallback(fallback_not_found)
        .layer(Extension(app_state))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": crate::version::VERSION,
    }))
}

async fn fallback_not_found() -> ApiError {
    ApiError::not_found("not found")
}

fn blog_id(raw: &str) -> Result<i32, ApiError> {
    parse_blog_id(raw).ok_or_else(|| ApiError::not_found(format!("blog not found: {raw}")))
}

async fn create_blog(
    Extension(state): Extension<AppState>,
    ApiJson(req): ApiJson<BlogInput>,
) -> Result<(StatusCode, Json<Blog>), ApiError> {
    let blog = state.blogs.create(req).await?;
    Ok((StatusCode::CREATED, Json(blog)))
}

async fn get_blog(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Blog>, ApiError> {
    let id = blog_id(&id)?;
    Ok(Json(state.blogs.get(id).await?))
}

async fn update_blog(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
    body: Result<ApiJson<BlogInput>, ApiError>,
) -> Result<Json<UpdatedResponse>, ApiError> {
    let id = blog_id(&id)?;
    let req = match body {
        Ok(ApiJson(req)) => req,
        Err(rejection) => {
            // An unknown id wins over a malformed body.
            state.blogs.get(id).await?;
            return Err(rejection);
        }
    };
    let blog = state.blogs.update(id, req).await?;
    Ok(Json(UpdatedResponse {
        message: "Blog updated successfully",
        blog,
    }))
}

async fn delete_blog(
    Extension(state): Extension<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = blog_id(&id)?;
    state.blogs.delete(id).await?;
    Ok(Json(MessageResponse {
        message: "Blog deleted successfully",
    }))
}

async fn search_blogs(
    Extension(state): Extension<AppState>,
    ApiQuery(pairs): ApiQuery<Vec<(String, String)>>,
) -> Result<Json<Value>, ApiError> {
    let params: SearchParams = pairs.into_iter().collect();
    let out = state.blogs.search(SearchCriteria::from(params)).await?;
    Ok(Json(out))
}
