// Business domains
pub mod ingestion;
pub mod website;
