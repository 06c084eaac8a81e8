//! Load config from file and environment.

use serde::Deserialize;
use server_core::ListenerConfig;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// Server configuration. File: ~/.config/game-server/config.toml or /etc/game-server/config.toml.
/// Env overrides: GAME_SERVER_HOST, GAME_SERVER_PORT, GAME_SERVER_RECV_BUFFER.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Bind address (default 0.0.0.0).
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// Listen port (default 8080).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Backlog, accept slots and per-session settings.
    #[serde(default)]
    pub listener: ListenerConfig,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            listener: ListenerConfig::default(),
        }
    }
}

impl Config {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Load config: default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    apply_env(&mut c, |key| std::env::var(key).ok());
    c
}

fn apply_env(c: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(h) = var("GAME_SERVER_HOST").and_then(|s| s.parse().ok()) {
        c.host = h;
    }
    if let Some(p) = var("GAME_SERVER_PORT").and_then(|s| s.parse().ok()) {
        c.port = p;
    }
    if let Some(n) = var("GAME_SERVER_RECV_BUFFER").and_then(|s| s.parse().ok()) {
        c.listener.session.recv_buffer_size = n;
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/game-server/config.toml"));
    }
    out.push(PathBuf::from("/etc/game-server/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            let parsed = std::fs::read_to_string(&p)
                .map_err(|e| e.to_string())
                .and_then(|s| toml::from_str::<Config>(&s).map_err(|e| e.to_string()));
            match parsed {
                Ok(c) => return Some(c),
                Err(e) => tracing::warn!(path = %p.display(), error = %e, "ignoring config file"),
            }
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let c: Config = toml::from_str(
            r#"
            port = 9000
            [listener]
            accept_slots = 4
            "#,
        )
        .unwrap();
        assert_eq!(c.port, 9000);
        assert_eq!(c.host, default_host());
        assert_eq!(c.listener.accept_slots, 4);
        assert_eq!(c.listener.backlog, 10);
        assert_eq!(c.listener.session.recv_buffer_size, 1024);
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(toml::from_str::<Config>("prot = 1").is_err());
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> = [
            ("GAME_SERVER_HOST", "127.0.0.1"),
            ("GAME_SERVER_PORT", "7777"),
            ("GAME_SERVER_RECV_BUFFER", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        apply_env(&mut c, |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.bind_addr(), "127.0.0.1:7777".parse::<SocketAddr>().unwrap());
        assert_eq!(c.listener.session.recv_buffer_size, 1024);
    }
}
