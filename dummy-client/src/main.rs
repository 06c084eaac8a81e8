// Demo client: connects to game-server once and exchanges greetings.

mod session;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use server_core::Connector;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_SERVER: &str = "127.0.0.1:8080";

fn main() -> anyhow::Result<()> {
    let mut server = None;
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("dummy-client {}", VERSION);
            return Ok(());
        }
        server.get_or_insert(arg);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let server = server
        .or_else(|| std::env::var("DUMMY_CLIENT_SERVER").ok())
        .unwrap_or_else(|| DEFAULT_SERVER.to_string());
    let addr: SocketAddr = server
        .parse()
        .with_context(|| format!("invalid server address {server:?}"))?;

    let rt = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    rt.block_on(async {
        let closed = Arc::new(Notify::new());
        let on_close = closed.clone();
        let session = Connector::default()
            .connect(addr, move || session::ClientSession::new(on_close.clone()))
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;

        tokio::select! {
            _ = closed.notified() => {}
            r = tokio::signal::ctrl_c() => {
                r.context("failed to listen for Ctrl+C")?;
                session.disconnect();
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}
