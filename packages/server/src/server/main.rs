// Main entry point for the ingestion server

use std::sync::Arc;

use anyhow::{Context, Result};
use crawl_client::FirecrawlClient;
use server_core::domains::ingestion::{CrawlOrchestrator, IngestionPipeline, PollPolicy};
use server_core::domains::website::{PostgresWebsiteStore, WebsiteStatusRegister};
use server_core::kernel::clock::{Clock, SystemClock};
use server_core::kernel::jobs::{PostgresJobQueue, QueueProcessor, QueueProcessorConfig};
use server_core::kernel::{
    BasePromptGenerator, HttpPromptGenerator, NoopPromptGenerator, ServerDeps, StreamHub,
};
use server_core::{server::build_app, Config};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,server_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting website ingestion server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    // Crawl provider
    let crawler = FirecrawlClient::new(config.firecrawl_api_key.clone())
        .context("Failed to create crawl client")?
        .with_base_url(&config.firecrawl_api_url)
        .context("Invalid FIRECRAWL_API_URL")?
        .with_page_limit(config.crawl_page_limit);
    let orchestrator = CrawlOrchestrator::with_poll_policy(
        Arc::new(crawler),
        PollPolicy::new(config.crawl_poll_interval, config.crawl_poll_max_attempts),
    );

    let prompts: Arc<dyn BasePromptGenerator> = match &config.prompt_service_url {
        Some(url) => Arc::new(
            HttpPromptGenerator::new(url).context("Invalid PROMPT_SERVICE_URL")?,
        ),
        None => {
            tracing::warn!("PROMPT_SERVICE_URL not set, prompt generation is disabled");
            Arc::new(NoopPromptGenerator::default())
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let stream_hub = StreamHub::new();
    let websites = Arc::new(WebsiteStatusRegister::new(
        Arc::new(PostgresWebsiteStore::new(pool.clone())),
        Arc::new(stream_hub.clone()),
        clock.clone(),
    ));
    let job_queue = Arc::new(PostgresJobQueue::with_clock(pool.clone(), clock.clone()));

    // Queue processor
    let pipeline = IngestionPipeline::new(
        websites.clone(),
        Arc::new(orchestrator),
        prompts,
        clock,
    );
    let processor = QueueProcessor::with_config(
        job_queue.clone(),
        Arc::new(pipeline),
        QueueProcessorConfig {
            tick_interval: config.queue_tick_interval,
            stale_after: config.stale_job_timeout,
        },
    );
    let processor_handle = processor.spawn();

    // Build application
    let deps = ServerDeps::new(websites, job_queue, stream_hub);
    let app = build_app(deps, Some(pool));

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("HTTP server stopped, waiting for queue processor");
    processor_handle.shutdown().await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
