//! Per-domain bandwidth quotas.
//!
//! # Data Flow
//! ```text
//! host from the request line
//!     → domain.rs (reduce to registrable-domain key)
//!     → ledger.rs (check-and-charge under one lock)
//!     ← relay byte counts charged back to the same key
//!
//! reset.rs: local-midnight timer → ledger.reset_all()
//! ```
//!
//! # Design Decisions
//! - Enforcement happens once, before admission; open tunnels are only metered
//! - A single mutex covers the whole map so resets see every entry at once
//! - Usage lives in memory only and restarts at zero with the process

pub mod domain;
pub mod ledger;
pub mod reset;

pub use domain::DomainKey;
pub use ledger::{Admission, QuotaEntry, QuotaLedger, UsageRecord};
pub use reset::DailyReset;
