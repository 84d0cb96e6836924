//! TCP listener setup.
//!
//! Workers in the pool all bind the same port. On Unix this uses
//! `SO_REUSEPORT`, which lets the kernel spread incoming connections
//! across the listening processes.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener, TcpSocket};

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("invalid bind address {address}: {source}")]
    Address {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Whether the listening socket is shared with sibling workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSharing {
    Exclusive,
    Shared,
}

const BACKLOG: u32 = 1024;

/// Bind `address`, optionally sharing the port with other processes.
pub fn bind(address: &str, sharing: PortSharing) -> Result<TcpListener, ListenerError> {
    let addr: SocketAddr = address.parse().map_err(|source| ListenerError::Address {
        address: address.to_string(),
        source,
    })?;
    let bind_err = |source: std::io::Error| ListenerError::Bind {
        address: addr,
        source,
    };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(true).map_err(bind_err)?;
    #[cfg(unix)]
    if sharing == PortSharing::Shared {
        socket.set_reuseport(true).map_err(bind_err)?;
    }
    #[cfg(not(unix))]
    let _ = sharing;

    socket.bind(addr).map_err(bind_err)?;
    let listener = socket.listen(BACKLOG).map_err(bind_err)?;

    tracing::info!(
        address = %listener.local_addr().unwrap_or(addr),
        shared = sharing == PortSharing::Shared,
        "Listener bound"
    );
    Ok(listener)
}
