//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → cloned into the controller, shared with each listener run
//! ```
//!
//! # Design Decisions
//! - Every field has a default so an empty file (or no file) is a valid config
//! - Validation separates syntactic (serde) from semantic checks
//! - Quota limits in the file only seed the ledger; usage is never persisted

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::ProxyConfig;
pub use schema::QuotaConfig;
pub use schema::TimeoutConfig;
