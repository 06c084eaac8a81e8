//! Session and listener tuning. Deserializable so hosts can embed it in their own config files.

use serde::Deserialize;

use crate::buffer::DEFAULT_RECV_BUFFER_SIZE;

/// Per-connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Receive buffer capacity in bytes (default 1024). Bounds the largest message a consumer can wait for.
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerConfig {
    /// OS listen backlog (default 10).
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Number of concurrently armed accept operations (default 10).
    #[serde(default = "default_accept_slots")]
    pub accept_slots: usize,
    /// Settings for every session the listener creates.
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_recv_buffer_size() -> usize {
    DEFAULT_RECV_BUFFER_SIZE
}
fn default_backlog() -> u32 {
    10
}
fn default_accept_slots() -> usize {
    10
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: default_recv_buffer_size(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            backlog: default_backlog(),
            accept_slots: default_accept_slots(),
            session: SessionConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recv_buffer_size == 0 {
            return Err(ConfigError::ZeroRecvBuffer);
        }
        Ok(())
    }
}

impl ListenerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accept_slots == 0 {
            return Err(ConfigError::ZeroAcceptSlots);
        }
        self.session.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("recv_buffer_size must be greater than zero")]
    ZeroRecvBuffer,
    #[error("accept_slots must be greater than zero")]
    ZeroAcceptSlots,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let c = ListenerConfig::default();
        assert_eq!(c.backlog, 10);
        assert_eq!(c.accept_slots, 10);
        assert_eq!(c.session.recv_buffer_size, 1024);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn zero_values_rejected() {
        let c = ListenerConfig {
            accept_slots: 0,
            ..ListenerConfig::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::ZeroAcceptSlots));

        let s = SessionConfig {
            recv_buffer_size: 0,
        };
        assert_eq!(s.validate(), Err(ConfigError::ZeroRecvBuffer));
    }
}
