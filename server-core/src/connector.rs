//! Outbound side: one connection attempt per call, no retry.

use std::io;
use std::net::SocketAddr;

use tokio::net::TcpSocket;
use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::session::{start_session, Session, SessionError, SessionFactory};

/// Opens outbound connections and starts a session on each. Holds only session settings.
#[derive(Debug, Clone, Default)]
pub struct Connector {
    config: SessionConfig,
}

impl Connector {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Connect to `addr`; on success build a handler with `factory` and start the session
    /// (which fires `on_connected`). Failures are returned, never retried.
    pub async fn connect<F: SessionFactory>(
        &self,
        addr: SocketAddr,
        factory: F,
    ) -> Result<Session, ConnectError> {
        self.config.validate().map_err(SessionError::from)?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(ConnectError::Socket)?;
        let stream = match socket.connect(addr).await {
            Ok(stream) => stream,
            Err(source) => {
                warn!(%addr, error = %source, "connect failed");
                return Err(ConnectError::Connect { addr, source });
            }
        };
        let session = start_session(stream, &factory, &self.config)?;
        info!(%addr, session = session.id(), "connected");
        Ok(session)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("failed to create socket: {0}")]
    Socket(#[source] io::Error),
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to start session: {0}")]
    Session(#[from] SessionError),
}
