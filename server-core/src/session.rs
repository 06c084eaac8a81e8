//! One connection: lifecycle, queued batched send, buffered receive with partial-message reassembly.
//!
//! Each started session runs one receive task (compact → read → deliver → re-arm) and at most
//! one send task at a time (drain queue → vectored write → confirm → re-drain).

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, IoSlice};
use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use socket2::SockRef;
use tokio::net::TcpStream;
use tokio::runtime::{Handle, TryCurrentError};
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::buffer::{BufferError, RecvBuffer};
use crate::config::{ConfigError, SessionConfig};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Application callbacks for one connection.
///
/// Callbacks run on runtime worker threads and may run concurrently with each other
/// (a send confirmation can race a receive). They are never called while the session holds
/// an internal lock, so calling [`Session::send`] or [`Session::disconnect`] from inside is fine.
///
/// Avoid storing the `Session` inside its own handler: the socket is released when the last
/// `Session` clone is dropped.
pub trait SessionHandler: Send + Sync + 'static {
    /// Once, after the session is started and before the first receive is armed.
    fn on_connected(&self, session: &Session, remote: SocketAddr);

    /// Once, when the session is first disconnected, before the socket is shut down.
    fn on_disconnected(&self, session: &Session, remote: SocketAddr);

    /// Called with the whole unread window after every receive. Returns how many leading bytes
    /// formed complete messages; the rest is kept and presented again with the next receive.
    fn on_recv(&self, session: &Session, data: &[u8]) -> usize;

    /// Called once per completed send batch with the number of bytes written.
    fn on_send(&self, session: &Session, num_bytes: usize);
}

/// Produces a fresh handler for each new connection.
pub trait SessionFactory: Send + Sync + 'static {
    fn create(&self) -> Arc<dyn SessionHandler>;
}

impl<F, H> SessionFactory for F
where
    F: Fn() -> H + Send + Sync + 'static,
    H: SessionHandler,
{
    fn create(&self) -> Arc<dyn SessionHandler> {
        Arc::new(self())
    }
}

/// Lifecycle: `Created → Active → Disconnecting → Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    Created,
    Active,
    Disconnecting,
    Disconnected,
}

const CREATED: u8 = 0;
const ACTIVE: u8 = 1;
const DISCONNECTING: u8 = 2;
const DISCONNECTED: u8 = 3;

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            CREATED => SessionState::Created,
            ACTIVE => SessionState::Active,
            DISCONNECTING => SessionState::Disconnecting,
            _ => SessionState::Disconnected,
        }
    }
}

/// Outbound queue plus the "a batch is in flight" marker. Guarded by the session's send mutex.
#[derive(Default)]
struct SendState {
    queue: VecDeque<Vec<u8>>,
    pending: bool,
}

struct SessionInner {
    id: u64,
    stream: TcpStream,
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
    handler: Arc<dyn SessionHandler>,
    state: AtomicU8,
    send: Mutex<SendState>,
    recv_buffer_size: usize,
    span: Span,
    runtime: Handle,
}

impl SessionInner {
    fn lock_send(&self) -> MutexGuard<'_, SendState> {
        self.send.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one connection. Cheap to clone; all clones refer to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Wrap a connected stream. The session stays in `Created` until [`Session::start`].
    /// Must be called from within a tokio runtime; the session's tasks run on that runtime, so
    /// `start`, `send` and `disconnect` may later be called from any thread.
    pub fn new(
        stream: TcpStream,
        handler: Arc<dyn SessionHandler>,
        config: &SessionConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let runtime = Handle::try_current()?;
        let remote_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let span = info_span!("session", id, remote = %remote_addr);
        Ok(Self {
            inner: Arc::new(SessionInner {
                id,
                stream,
                remote_addr,
                local_addr,
                handler,
                state: AtomicU8::new(CREATED),
                send: Mutex::new(SendState::default()),
                recv_buffer_size: config.recv_buffer_size,
                span,
                runtime,
            }),
        })
    }

    /// `Created → Active`: invokes `on_connected`, then arms the first receive.
    pub fn start(&self) -> Result<(), SessionError> {
        if let Err(current) = self.inner.state.compare_exchange(
            CREATED,
            ACTIVE,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(match SessionState::from_u8(current) {
                SessionState::Active => SessionError::AlreadyStarted,
                _ => SessionError::Disconnected,
            });
        }
        info!(parent: &self.inner.span, local = %self.inner.local_addr, "session started");
        self.inner.handler.on_connected(self, self.inner.remote_addr);
        self.inner
            .runtime
            .spawn(self.clone().recv_loop().instrument(self.inner.span.clone()));
        Ok(())
    }

    /// Queue `payload` for transmission. Payloads go out in call order; everything queued while
    /// a batch is in flight is written together as the next batch.
    pub fn send(&self, payload: impl Into<Vec<u8>>) -> Result<(), SessionError> {
        let payload = payload.into();
        let batch = {
            let mut send = self.inner.lock_send();
            if self.state() >= SessionState::Disconnecting {
                return Err(SessionError::Disconnected);
            }
            if payload.is_empty() {
                return Ok(());
            }
            send.queue.push_back(payload);
            if send.pending {
                return Ok(());
            }
            send.pending = true;
            send.queue.drain(..).collect::<Vec<_>>()
        };
        self.inner.runtime.spawn(
            self.clone()
                .send_loop(batch)
                .instrument(self.inner.span.clone()),
        );
        Ok(())
    }

    /// Disconnect once. Only the first caller, from any thread, runs `on_disconnected` and shuts
    /// the socket down; it gets `true`, everyone else `false`. Unsent payloads are dropped.
    /// The descriptor itself is closed only when the last `Session` clone is dropped, so callers
    /// that keep sessions around should release them once disconnected.
    pub fn disconnect(&self) -> bool {
        let won = self
            .inner
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                (s < DISCONNECTING).then_some(DISCONNECTING)
            })
            .is_ok();
        if !won {
            return false;
        }
        let _enter = self.inner.span.enter();
        info!("disconnecting");
        self.inner
            .handler
            .on_disconnected(self, self.inner.remote_addr);
        self.inner.lock_send().queue.clear();
        if let Err(e) = SockRef::from(&self.inner.stream).shutdown(Shutdown::Both) {
            // Peer already gone; nothing left to shut down.
            debug!(error = %e, "socket shutdown failed");
        }
        self.inner.state.store(DISCONNECTED, Ordering::Release);
        true
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.inner.remote_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Active
    }

    async fn recv_loop(self) {
        let mut buffer = RecvBuffer::new(self.inner.recv_buffer_size);
        let reason = loop {
            if !self.is_connected() {
                return;
            }
            buffer.compact();
            if buffer.free_size() == 0 {
                break SessionError::BufferFull {
                    capacity: buffer.capacity(),
                };
            }
            let n = match self.read_into(buffer.writable_region()).await {
                Ok(0) => break SessionError::Closed,
                Ok(n) => n,
                Err(e) => break SessionError::Socket(e),
            };
            debug!(bytes = n, "received");
            if let Err(e) = self.deliver(&mut buffer, n) {
                break e;
            }
        };
        match &reason {
            SessionError::Closed | SessionError::Socket(_) => {
                debug!(reason = %reason, "receive ended")
            }
            _ => warn!(reason = %reason, "receive aborted"),
        }
        self.disconnect();
    }

    /// Commit `n` freshly read bytes, hand the unread window to the application, consume what it reports.
    fn deliver(&self, buffer: &mut RecvBuffer, n: usize) -> Result<(), SessionError> {
        buffer.commit_write(n)?;
        let available = buffer.data_size();
        let consumed = self.inner.handler.on_recv(self, buffer.readable_region());
        if consumed > available {
            return Err(SessionError::ConsumedOutOfRange {
                consumed,
                available,
            });
        }
        buffer.commit_read(consumed)?;
        Ok(())
    }

    async fn read_into(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            self.inner.stream.readable().await?;
            match self.inner.stream.try_read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_loop(self, mut batch: Vec<Vec<u8>>) {
        loop {
            let sent = match self.write_batch(&batch).await {
                Ok(n) if n > 0 => n,
                Ok(_) => {
                    debug!("zero-length send completion");
                    self.disconnect();
                    return;
                }
                Err(e) => {
                    debug!(error = %e, "send failed");
                    self.disconnect();
                    return;
                }
            };
            debug!(bytes = sent, payloads = batch.len(), "batch sent");
            self.inner.handler.on_send(&self, sent);

            batch = {
                let mut send = self.inner.lock_send();
                if send.queue.is_empty() {
                    send.pending = false;
                    return;
                }
                send.queue.drain(..).collect()
            };
        }
    }

    /// Write the whole batch, resuming after partial writes. Returns total bytes written.
    async fn write_batch(&self, batch: &[Vec<u8>]) -> io::Result<usize> {
        let total: usize = batch.iter().map(Vec::len).sum();
        let mut written = 0;
        while written < total {
            self.inner.stream.writable().await?;
            let slices = unsent_slices(batch, written);
            match self.inner.stream.try_write_vectored(&slices) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(written)
    }
}

/// Factory → `Session::new` → `start`. Shared by the listener and the connector.
pub(crate) fn start_session(
    stream: TcpStream,
    factory: &dyn SessionFactory,
    config: &SessionConfig,
) -> Result<Session, SessionError> {
    let session = Session::new(stream, factory.create(), config)?;
    session.start()?;
    Ok(session)
}

/// Slices covering everything in `batch` after the first `skip` bytes.
fn unsent_slices(batch: &[Vec<u8>], mut skip: usize) -> Vec<IoSlice<'_>> {
    let mut out = Vec::with_capacity(batch.len());
    for payload in batch {
        if skip >= payload.len() {
            skip -= payload.len();
            continue;
        }
        out.push(IoSlice::new(&payload[skip..]));
        skip = 0;
    }
    out
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("remote_addr", &self.inner.remote_addr)
            .field("local_addr", &self.inner.local_addr)
            .field("state", &self.state())
            .finish()
    }
}

/// Why a session stopped, or why an operation on it was refused.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("socket error: {0}")]
    Socket(#[from] io::Error),
    #[error("connection closed by peer")]
    Closed,
    #[error("receive buffer corrupted: {0}")]
    Corruption(#[from] BufferError),
    #[error("consumer reported {consumed} bytes consumed but only {available} were available")]
    ConsumedOutOfRange { consumed: usize, available: usize },
    #[error("receive buffer full ({capacity} bytes) with nothing consumed")]
    BufferFull { capacity: usize },
    #[error("invalid session config: {0}")]
    Config(#[from] ConfigError),
    #[error("no tokio runtime to drive the session: {0}")]
    Runtime(#[from] TryCurrentError),
    #[error("session already started")]
    AlreadyStarted,
    #[error("session is disconnected")]
    Disconnected,
}
