//! Server-side demo session: greets each client and logs whatever it sends as UTF-8 text.

use std::net::SocketAddr;

use server_core::{Session, SessionHandler};
use tracing::{info, warn};

pub const WELCOME: &[u8] = b"Welcome to Server!";

pub struct GameSession;

impl SessionHandler for GameSession {
    fn on_connected(&self, session: &Session, remote: SocketAddr) {
        info!(%remote, "client connected");
        if let Err(e) = session.send(WELCOME) {
            warn!(%remote, error = %e, "failed to queue welcome");
        }
    }

    fn on_disconnected(&self, _session: &Session, remote: SocketAddr) {
        info!(%remote, "client disconnected");
    }

    fn on_recv(&self, session: &Session, data: &[u8]) -> usize {
        info!(
            remote = %session.remote_addr(),
            text = %String::from_utf8_lossy(data),
            "received from client"
        );
        data.len()
    }

    fn on_send(&self, session: &Session, num_bytes: usize) {
        info!(remote = %session.remote_addr(), bytes = num_bytes, "sent to client");
    }
}
