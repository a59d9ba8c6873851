use std::time::Duration;

use anyhow::Context as _;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{BlogDocument, Refresh, SearchCriteria, SearchError, SearchIndex};
use crate::{BoxFuture, config::Config};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
struct BasicAuth {
    username: String,
    password: Option<String>,
}

/// Elasticsearch-compatible index reached over its REST API.
#[derive(Debug, Clone)]
pub struct ElasticsearchIndex {
    client: reqwest::Client,
    base_url: String,
    index: String,
    auth: Option<BasicAuth>,
}

impl ElasticsearchIndex {
    pub fn try_new(base_url: &str, index: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("blogd/{}", crate::version::VERSION))
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .context("build search http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
            auth: None,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let index = Self::try_new(
            &config.search_url,
            &config.search_index,
            config.search_timeout(),
        )?;
        Ok(match &config.search_username {
            Some(username) => index.with_basic_auth(username, config.search_password.clone()),
            None => index,
        })
    }

    pub fn with_basic_auth(mut self, username: &str, password: Option<String>) -> Self {
        self.auth = Some(BasicAuth {
            username: username.to_string(),
            password,
        });
        self
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.auth {
            Some(auth) => req.basic_auth(&auth.username, auth.password.as_deref()),
            None => req,
        }
    }

    fn doc_path(&self, id: i32) -> String {
        format!("/{}/_doc/{id}", self.index)
    }

    /// Checks that the cluster answers its root endpoint.
    pub async fn ping(&self) -> Result<(), SearchError> {
        let resp = self.request(Method::GET, "/").send().await?;
        ensure_success(resp).await.map(|_| ())
    }

    /// Creates the index with explicit mappings when it does not exist.
    pub async fn ensure_index(&self) -> Result<(), SearchError> {
        let path = format!("/{}", self.index);
        let resp = self.request(Method::HEAD, &path).send().await?;
        if resp.status().is_success() {
            return Ok(());
        }
        if resp.status() != StatusCode::NOT_FOUND {
            return Err(SearchError::Status {
                status: resp.status().as_u16(),
                body: String::new(),
            });
        }

        let resp = self
            .request(Method::PUT, &path)
            .json(&index_mappings())
            .send()
            .await?;
        match ensure_success(resp).await {
            Ok(_) => {
                info!(index = %self.index, "created search index");
                Ok(())
            }
            // Another instance created it between our HEAD and PUT.
            Err(SearchError::Status { status: 400, body })
                if body.contains("resource_already_exists_exception") =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn index_mappings() -> Value {
    json!({
        "mappings": {
            "properties": {
                "title": { "type": "text" },
                "content": { "type": "text" },
                "author": { "type": "keyword" },
                "category": { "type": "keyword" },
                "createdAt": { "type": "date" },
            }
        }
    })
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, SearchError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SearchError::Status {
        status: status.as_u16(),
        body,
    })
}

impl SearchIndex for ElasticsearchIndex {
    fn upsert(
        &self,
        id: i32,
        doc: BlogDocument,
        refresh: Refresh,
    ) -> BoxFuture<'_, Result<(), SearchError>> {
        Box::pin(async move {
            let resp = self
                .request(Method::PUT, &self.doc_path(id))
                .query(&[("refresh", refresh.as_param())])
                .json(&doc)
                .send()
                .await?;
            ensure_success(resp).await?;
            Ok(())
        })
    }

    fn delete(&self, id: i32, refresh: Refresh) -> BoxFuture<'_, Result<(), SearchError>> {
        Box::pin(async move {
            let resp = self
                .request(Method::DELETE, &self.doc_path(id))
                .query(&[("refresh", refresh.as_param())])
                .send()
                .await?;
            if resp.status() == StatusCode::NOT_FOUND {
                debug!(id, "search document already absent");
                return Ok(());
            }
            ensure_success(resp).await?;
            Ok(())
        })
    }

    fn search(&self, criteria: SearchCriteria) -> BoxFuture<'_, Result<Value, SearchError>> {
        Box::pin(async move {
            let body = criteria.to_query_body();
            debug!(query = %body, "search query");

            let resp = self
                .request(Method::POST, &format!("/{}/_search", self.index))
                .json(&body)
                .send()
                .await?;
            let resp = ensure_success(resp).await?;
            let raw = resp.bytes().await?;
            debug!(response = %String::from_utf8_lossy(&raw), "search response");
            Ok(serde_json::from_slice(&raw)?)
        })
    }
}

/// Pings the index until it answers, sleeping a fixed backoff between
/// attempts. Gives up after `config.search_connect_attempts` tries.
pub async fn connect_with_retry(config: &Config) -> anyhow::Result<ElasticsearchIndex> {
    let index = ElasticsearchIndex::from_config(config)?;
    let attempts = config.search_connect_attempts;
    let backoff = config.search_connect_backoff();

    let mut last_err = None;
    for attempt in 1..=attempts {
        match index.ping().await {
            Ok(()) => {
                info!(url = %config.search_url, attempt, "connected to search index");
                return Ok(index);
            }
            Err(e) => {
                warn!(attempt, attempts, error = %e, "failed to reach search index");
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    match last_err {
        Some(e) => Err(anyhow::Error::new(e).context(format!(
            "search index unreachable after {attempts} attempts"
        ))),
        None => anyhow::bail!("search index unreachable: no connection attempts made"),
    }
}
