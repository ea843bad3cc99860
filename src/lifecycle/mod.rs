//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! start (controller.rs):
//!     Bind listener → spawn accept loop → spawn daily reset
//!
//! stop (controller.rs, shutdown.rs):
//!     Broadcast shutdown → accept loop exits, listener closed
//!     → reset task exits → open connections finish on their own
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → stop and exit
//! ```
//!
//! # Design Decisions
//! - Bind failure is the only fatal error
//! - Each start gets a fresh shutdown channel, so stop/start can repeat
//! - The quota ledger outlives listener runs; usage survives stop/start

pub mod controller;
pub mod shutdown;
pub mod signals;

pub use controller::{ControlError, ProxyController};
pub use shutdown::Shutdown;
