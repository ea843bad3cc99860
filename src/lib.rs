//! Forward HTTP/HTTPS proxy with per-domain daily bandwidth quotas.

pub mod config;
pub mod console;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod quota;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use lifecycle::{ProxyController, Shutdown};
pub use net::Listener;
pub use quota::{DomainKey, QuotaLedger};
