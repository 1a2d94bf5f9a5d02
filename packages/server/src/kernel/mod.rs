//! Kernel module - server infrastructure and dependencies.

pub mod clock;
pub mod deps;
pub mod jobs;
pub mod prompt_client;
pub mod sse;
pub mod stream_hub;
pub mod test_dependencies;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use deps::ServerDeps;
pub use prompt_client::{HttpPromptGenerator, NoopPromptGenerator};
pub use stream_hub::StreamHub;
pub use test_dependencies::TestDependencies;
pub use traits::*;
