//! Asynchronous TCP session framework.
//! `Listener` and `Connector` produce started `Session`s; applications plug in through
//! `SessionHandler` (connected / disconnected / received / sent) and choose their own framing
//! by reporting how many received bytes they consumed.

pub mod buffer;
pub mod config;
pub mod connector;
pub mod listener;
pub mod session;

pub use buffer::{BufferError, RecvBuffer, DEFAULT_RECV_BUFFER_SIZE};
pub use config::{ConfigError, ListenerConfig, SessionConfig};
pub use connector::{ConnectError, Connector};
pub use listener::{Accept, ListenError, Listener};
pub use session::{Session, SessionError, SessionFactory, SessionHandler, SessionState};
