//! Request identity and context.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4)
//! - Carry per-request facts handed to handlers
//!
//! # Design Decisions
//! - Request ID assigned before admission so rejections are traceable too
//! - Context is cheap to clone (Arc-backed paths)

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use uuid::Uuid;

use crate::net::ConnectionId;

/// Response header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Facts about an admitted request, passed to its handler.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: RequestId,
    /// Peer address of the connection.
    pub remote_addr: SocketAddr,
    pub connection_id: ConnectionId,
    /// Temporary storage for uploads and scratch files.
    pub temp_dir: Arc<Path>,
    pub received_at: SystemTime,
}

impl RequestContext {
    pub fn new(
        remote_addr: SocketAddr,
        connection_id: ConnectionId,
        temp_dir: Arc<Path>,
    ) -> Self {
        Self {
            request_id: RequestId::new(),
            remote_addr,
            connection_id,
            temp_dir,
            received_at: SystemTime::now(),
        }
    }

    /// Context for invoking a handler outside a server connection.
    pub fn detached() -> Self {
        Self::new(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
            ConnectionId::new(),
            Arc::from(std::env::temp_dir().as_path()),
        )
    }

    /// Registry key for the client: the remote IP without the port.
    pub fn client_key(&self) -> String {
        self.remote_addr.ip().to_string()
    }

    /// A path inside the temporary directory.
    pub fn temp_path(&self, name: &str) -> PathBuf {
        self.temp_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
        assert_eq!(RequestId::new().to_string().len(), 36);
    }

    #[test]
    fn client_key_drops_port() {
        let mut ctx = RequestContext::detached();
        ctx.remote_addr = "192.168.1.7:51234".parse().unwrap();
        assert_eq!(ctx.client_key(), "192.168.1.7");
    }
}
