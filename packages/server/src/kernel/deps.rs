//! Server dependencies for actions and HTTP handlers (using traits for testability)

use std::sync::Arc;

use crate::domains::website::WebsiteStatusRegister;
use crate::kernel::jobs::JobQueue;
use crate::kernel::stream_hub::StreamHub;

/// Server dependencies accessible to actions
#[derive(Clone)]
pub struct ServerDeps {
    /// Sole writer of website status
    pub websites: Arc<WebsiteStatusRegister>,
    pub job_queue: Arc<dyn JobQueue>,
    /// In-process pub/sub hub for real-time streaming to SSE endpoints
    pub stream_hub: StreamHub,
}

impl ServerDeps {
    pub fn new(
        websites: Arc<WebsiteStatusRegister>,
        job_queue: Arc<dyn JobQueue>,
        stream_hub: StreamHub,
    ) -> Self {
        Self {
            websites,
            job_queue,
            stream_hub,
        }
    }
}
