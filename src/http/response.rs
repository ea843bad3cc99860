//! Status lines the proxy writes to clients.
//!
//! These are the only bytes the proxy ever originates on a client socket.

/// Written once the upstream for a CONNECT request is open.
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection established\r\n\r\n";

/// Written when the domain's quota is already exhausted.
pub const USAGE_OVER_LIMIT: &[u8] = b"HTTP/1.1 413 Usage over limit\r\n\r\n";
