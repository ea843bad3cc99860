//! Protocol-lite HTTP handling.
//!
//! # Data Flow
//! ```text
//! first chunk read from the client
//!     → request.rs (tokenize request line, resolve host/port/path)
//!     → [quota gate, upstream connect]
//!     → response.rs (literal status lines written back to the client)
//!     → origin-form request line for plain HTTP, opaque tunnel for CONNECT
//! ```
//!
//! # Design Decisions
//! - Only the request line is interpreted; headers and body pass through untouched
//! - Responses are fixed byte strings, never built from client input

pub mod request;
pub mod response;

pub use request::PendingRequest;
