//! Inbound side: a listening socket served by a fixed pool of accept tasks.
//!
//! Each slot loops accept → start session → accept again. Slots share nothing but the
//! listening socket and the factory, and an accept failure only costs that one attempt.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ListenerConfig, SessionConfig};
use crate::session::{start_session, SessionFactory};

/// Source of inbound connections. Implemented for [`TcpListener`]; other implementations can wrap
/// one to filter or inject faults.
pub trait Accept: Send + Sync + 'static {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Accept for TcpListener {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

/// Running listener. Accept slots stop when it is shut down or dropped; sessions already
/// started keep running.
#[derive(Debug)]
pub struct Listener {
    local_addr: SocketAddr,
    slots: Vec<JoinHandle<()>>,
}

impl Listener {
    /// Bind `addr`, listen with the configured backlog and arm `config.accept_slots` accepts.
    /// Must be called from within a tokio runtime.
    pub fn bind<F: SessionFactory>(
        addr: SocketAddr,
        factory: F,
        config: ListenerConfig,
    ) -> Result<Self, ListenError> {
        config.validate()?;
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        #[cfg(unix)]
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(config.backlog)?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, backlog = config.backlog, "listening");
        Self::from_acceptor(listener, local_addr, factory, config)
    }

    /// Serve an already-listening accept source.
    pub fn from_acceptor<A: Accept, F: SessionFactory>(
        acceptor: A,
        local_addr: SocketAddr,
        factory: F,
        config: ListenerConfig,
    ) -> Result<Self, ListenError> {
        config.validate()?;
        let acceptor = Arc::new(acceptor);
        let factory: Arc<dyn SessionFactory> = Arc::new(factory);
        let slots = (0..config.accept_slots)
            .map(|slot| {
                tokio::spawn(accept_loop(
                    slot,
                    acceptor.clone(),
                    factory.clone(),
                    config.session.clone(),
                ))
            })
            .collect();
        debug!(slots = config.accept_slots, "accept slots armed");
        Ok(Self { local_addr, slots })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting. Idempotent.
    pub fn shutdown(&self) {
        for slot in &self.slots {
            slot.abort();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown();
        debug!(local_addr = %self.local_addr, "listener stopped");
    }
}

async fn accept_loop<A: Accept>(
    slot: usize,
    acceptor: Arc<A>,
    factory: Arc<dyn SessionFactory>,
    config: SessionConfig,
) {
    loop {
        match acceptor.accept().await {
            Ok((stream, remote)) => {
                debug!(slot, %remote, "accepted");
                if let Err(e) = start_session(stream, factory.as_ref(), &config) {
                    warn!(slot, %remote, error = %e, "failed to start session");
                }
            }
            Err(e) => {
                warn!(slot, error = %e, "accept failed");
                // Re-arm right away, but let other tasks run first.
                tokio::task::yield_now().await;
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    #[error("invalid listener config: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to bind listener: {0}")]
    Bind(#[from] io::Error),
}
