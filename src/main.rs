use anyhow::{Context as _, Result};
use std::sync::Arc;

use clap::Parser;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = blogd::config::Cli::parse();
    run_server(cli.config).await
}

async fn run_server(config: blogd::config::Config) -> Result<()> {
    // No retry here: an unreachable database ends the process.
    let db = blogd::store::connect(&config.database_url, config.database_max_connections)
        .await
        .context("connect to database")?;
    blogd::store::migrate(&db)
        .await
        .context("migrate database schema")?;
    info!("database schema ready");

    let index = blogd::search::connect_with_retry(&config).await?;
    index
        .ensure_index()
        .await
        .with_context(|| format!("ensure search index {}", index.index()))?;

    let blogs = blogd::sync::BlogService::new(
        Arc::new(blogd::store::SeaOrmBlogStore::new(db.clone())),
        Arc::new(index),
    );

    let app = blogd::http::build_router(blogs)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    info!(
        bind = %config.bind,
        search_url = %config.search_url,
        search_index = %config.search_index,
        "starting blogd"
    );
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await.context("close database pool")?;
    info!("blogd stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).compact().init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
