//! Credential models and the token manager that owns their lifecycle.

pub mod credentials;
pub mod manager;
pub mod secret;

mod metrics;

pub use credentials::*;
pub use manager::*;
pub use metrics::RefreshMetrics;
pub use secret::*;
