//! Website domain - registered websites and their ingestion status

pub mod actions;
pub mod errors;
pub mod events;
pub mod models;
pub mod register;
pub mod store;

pub use errors::{WebsiteError, WebsiteResult};
pub use events::WebsiteStatusChanged;
pub use models::{LatestJob, StatusView, Website, WebsiteStatus};
pub use register::WebsiteStatusRegister;
pub use store::{FieldChange, InMemoryWebsiteStore, PostgresWebsiteStore, StatusChange, WebsiteStore};
