//! TCP listeners and the admission limiter.
//!
//! # Responsibilities
//! - Bind to configured address(es)
//! - Accept incoming TCP connections from any bound endpoint
//! - Bound concurrently processed requests via a semaphore
//!
//! # Design Decisions
//! - A slot covers one admitted request, not the connection carrying it
//! - The accept loop waits for a free slot before accepting, without keeping it
//! - Slots are released by drop, so every exit path returns them

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::select_all;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(#[source] std::io::Error),
    /// The limiter was closed during shutdown.
    #[error("Admission limiter closed")]
    Closed(#[from] AcquireError),
}

/// Counting limiter for concurrently processed requests.
#[derive(Debug, Clone)]
pub struct AdmissionLimiter {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionLimiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot.
    pub async fn acquire(&self) -> Result<AdmissionSlot, ListenerError> {
        let permit = Arc::clone(&self.slots).acquire_owned().await?;
        Ok(AdmissionSlot { _permit: permit })
    }

    /// Wait until a slot is free, then hand it straight back.
    pub async fn ready(&self) -> Result<(), ListenerError> {
        drop(self.acquire().await?);
        Ok(())
    }

    /// Take a slot only if one is free right now.
    pub fn try_acquire(&self) -> Option<AdmissionSlot> {
        Arc::clone(&self.slots)
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionSlot { _permit: permit })
    }

    /// Stop handing out slots; pending `acquire` calls fail.
    pub fn close(&self) {
        self.slots.close();
    }

    /// Currently free slots.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Configured number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// One unit of the admission budget.
///
/// When dropped, the slot is released back to the limiter. This holds even
/// if the handler panics.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
}

/// A bound TCP endpoint.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to an address such as "127.0.0.1:8080".
    pub async fn bind(address: &str) -> Result<Self, ListenerError> {
        let bind_err = |source| ListenerError::Bind {
            address: address.to_string(),
            source,
        };

        let addr: SocketAddr = address.parse().map_err(|e| {
            bind_err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;
        let inner = TcpListener::bind(addr).await.map_err(bind_err)?;
        let local_addr = inner.local_addr().map_err(bind_err)?;

        tracing::info!(address = %local_addr, "Listener bound");
        Ok(Self { inner, local_addr })
    }

    /// Wrap an already bound tokio listener.
    pub fn from_tcp(inner: TcpListener) -> std::io::Result<Self> {
        let local_addr = inner.local_addr()?;
        Ok(Self { inner, local_addr })
    }

    /// Accept the next connection on this endpoint.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        self.inner.accept().await.map_err(ListenerError::Accept)
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Accept the next connection from whichever listener is ready first.
pub async fn accept_any(
    listeners: &[Listener],
) -> Result<(TcpStream, SocketAddr), ListenerError> {
    if listeners.is_empty() {
        // Nothing to accept from; park the caller until it is cancelled.
        return std::future::pending().await;
    }
    let accepts = listeners.iter().map(|listener| Box::pin(listener.accept()));
    let (result, _index, _rest) = select_all(accepts).await;
    result
}
