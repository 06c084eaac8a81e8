//! Shared helpers: a handler that records every callback into a channel, and loopback plumbing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use server_core::{Session, SessionHandler};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected(SocketAddr),
    Disconnected(SocketAddr),
    Recv { data: Vec<u8>, consumed: usize },
    Send(usize),
}

/// How the recorder answers `on_recv`.
#[derive(Debug, Clone, Copy)]
pub enum Framing {
    /// Consume everything.
    All,
    /// Consume up to and including the last `\n`.
    Lines,
    /// Claim one byte more than available.
    Overclaim,
}

pub struct Recorder {
    events: mpsc::UnboundedSender<Event>,
    framing: Framing,
    greeting: Option<Vec<u8>>,
}

impl Recorder {
    pub fn new(events: mpsc::UnboundedSender<Event>, framing: Framing) -> Self {
        Self {
            events,
            framing,
            greeting: None,
        }
    }

    /// Send `greeting` from `on_connected`.
    pub fn with_greeting(mut self, greeting: &[u8]) -> Self {
        self.greeting = Some(greeting.to_vec());
        self
    }
}

impl SessionHandler for Recorder {
    fn on_connected(&self, session: &Session, remote: SocketAddr) {
        let _ = self.events.send(Event::Connected(remote));
        if let Some(greeting) = &self.greeting {
            session.send(greeting.clone()).unwrap();
        }
    }

    fn on_disconnected(&self, _session: &Session, remote: SocketAddr) {
        let _ = self.events.send(Event::Disconnected(remote));
    }

    fn on_recv(&self, _session: &Session, data: &[u8]) -> usize {
        let consumed = match self.framing {
            Framing::All => data.len(),
            Framing::Lines => data
                .iter()
                .rposition(|&b| b == b'\n')
                .map_or(0, |i| i + 1),
            Framing::Overclaim => data.len() + 1,
        };
        let _ = self.events.send(Event::Recv {
            data: data.to_vec(),
            consumed,
        });
        consumed
    }

    fn on_send(&self, _session: &Session, num_bytes: usize) {
        let _ = self.events.send(Event::Send(num_bytes));
    }
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("event channel closed")
}

/// Drain events until `len` received bytes have been consumed. Returns those bytes and the
/// total reported by `on_send` along the way.
pub async fn collect_recv(
    rx: &mut mpsc::UnboundedReceiver<Event>,
    len: usize,
) -> (Vec<u8>, usize) {
    let mut received = Vec::new();
    let mut sent = 0;
    while received.len() < len {
        match next_event(rx).await {
            Event::Recv { data, consumed } => received.extend_from_slice(&data[..consumed]),
            Event::Send(n) => sent += n,
            Event::Disconnected(addr) => panic!("{addr} disconnected early"),
            Event::Connected(_) => {}
        }
    }
    (received, sent)
}

/// Drain events until `on_send` has reported `len` bytes in total.
pub async fn collect_sent(rx: &mut mpsc::UnboundedReceiver<Event>, len: usize) -> usize {
    let mut sent = 0;
    while sent < len {
        match next_event(rx).await {
            Event::Send(n) => sent += n,
            Event::Disconnected(addr) => panic!("{addr} disconnected early"),
            _ => {}
        }
    }
    sent
}

/// A connected loopback pair: (client side, server side).
pub async fn stream_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (client.unwrap(), accepted.unwrap().0)
}
