//! Client-side demo session: says hello once connected and logs the server's replies.

use std::net::SocketAddr;
use std::sync::Arc;

use server_core::{Session, SessionHandler};
use tokio::sync::Notify;
use tracing::{info, warn};

pub const HELLO: &[u8] = b"Hello World!";

pub struct ClientSession {
    closed: Arc<Notify>,
}

impl ClientSession {
    /// `closed` is notified when the server connection goes away.
    pub fn new(closed: Arc<Notify>) -> Self {
        Self { closed }
    }
}

impl SessionHandler for ClientSession {
    fn on_connected(&self, session: &Session, remote: SocketAddr) {
        info!(%remote, "connected to server");
        if let Err(e) = session.send(HELLO) {
            warn!(%remote, error = %e, "failed to queue hello");
        }
    }

    fn on_disconnected(&self, _session: &Session, remote: SocketAddr) {
        info!(%remote, "disconnected from server");
        self.closed.notify_one();
    }

    fn on_recv(&self, _session: &Session, data: &[u8]) -> usize {
        info!(text = %String::from_utf8_lossy(data), "received from server");
        data.len()
    }

    fn on_send(&self, _session: &Session, num_bytes: usize) {
        info!(bytes = num_bytes, "sent to server");
    }
}
