// Website Ingestion - Server Core
//
// Crawls registered websites through an external provider, stores the
// normalized content and drives each website through its status lifecycle.
//
// Long-running work goes through the Postgres-backed ingestion job queue in
// kernel/jobs; domain logic lives in domains/*.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
