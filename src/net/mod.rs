//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, one task per connection)
//!     → handler.rs (parse → quota gate → upstream connect)
//!     → relay.rs (bidirectional pump, metered per domain)
//!     → connection.rs (ids, state machine, in-flight count)
//!
//! Connection States:
//!     Accepted → Parsed → Resolving → Tunneling | Forwarding → Closed
//!                                   → Unauthorized | Failed  → Closed
//! ```
//!
//! # Design Decisions
//! - The accept loop never waits on anything but the next connection or shutdown
//! - Handler failures stay inside their task
//! - Client and upstream sockets are owned together and closed together

pub mod connection;
pub mod handler;
pub mod listener;
pub mod relay;

pub use connection::{ConnectionId, ConnectionState, ConnectionTracker};
pub use handler::{ConnectionHandler, ProxyContext};
pub use listener::Listener;
pub use relay::{RelayOutcome, RelayStats};
