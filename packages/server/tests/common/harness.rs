//! Test harness with testcontainers for integration testing.
//!
//! One Postgres container is shared across all tests and migrations run once
//! into a template database. Each test then gets its own database cloned from
//! the template, since the job queue claims across the whole table.

use anyhow::{Context, Result};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::{Mutex, OnceCell};
use uuid::Uuid;

const TEMPLATE_DB: &str = "ingest_template";

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    host: String,
    port: u16,
    /// Connection to the maintenance database, used to create per-test databases
    admin_pool: PgPool,
    /// `CREATE DATABASE ... TEMPLATE` fails if two clones race on one template
    create_lock: Mutex<()>,
    // Keep container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

/// Global shared infrastructure - initialized once, reused by all tests.
static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .with_cmd(["-c", "max_connections=200"])
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let host = postgres.get_host().await?.to_string();
        let port = postgres.get_host_port_ipv4(5432).await?;

        let admin_pool = PgPool::connect(&database_url(&host, port, "postgres"))
            .await
            .context("Failed to connect to Postgres")?;

        sqlx::query(&format!("CREATE DATABASE {}", TEMPLATE_DB))
            .execute(&admin_pool)
            .await
            .context("Failed to create template database")?;

        // Run migrations once into the template
        let template_pool = PgPool::connect(&database_url(&host, port, TEMPLATE_DB))
            .await
            .context("Failed to connect to template database")?;
        sqlx::migrate!("./migrations")
            .run(&template_pool)
            .await
            .context("Failed to run migrations")?;
        template_pool.close().await;

        Ok(Self {
            host,
            port,
            admin_pool,
            create_lock: Mutex::new(()),
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }

    async fn fresh_database(&self) -> Result<String> {
        let name = format!("test_{}", Uuid::new_v4().simple());

        let _guard = self.create_lock.lock().await;
        sqlx::query(&format!("CREATE DATABASE {} TEMPLATE {}", name, TEMPLATE_DB))
            .execute(&self.admin_pool)
            .await
            .with_context(|| format!("Failed to create database {}", name))?;

        Ok(database_url(&self.host, self.port, &name))
    }
}

fn database_url(host: &str, port: u16, database: &str) -> String {
    format!("postgresql://postgres:postgres@{}:{}/{}", host, port, database)
}

/// Test harness that manages test infrastructure.
///
/// # Example using test-context
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &TestHarness) {
///     let queue = PostgresJobQueue::new(ctx.db_pool.clone());
///     // ... test code
/// }
/// ```
pub struct TestHarness {
    /// Pool on this test's own migrated database.
    pub db_pool: PgPool,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;
        let url = infra.fresh_database().await?;

        let db_pool = PgPool::connect(&url)
            .await
            .context("Failed to connect to test database")?;

        Ok(Self { db_pool })
    }
}
