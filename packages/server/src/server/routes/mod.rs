// HTTP routes
pub mod health;
pub mod websites;

pub use health::*;
pub use websites::*;
