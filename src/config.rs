//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `CLOUDVAR_LISTEN`, `CLOUDVAR_WEB_ROOT`
//! 2. **Config file** — path via `--config <path>`, or `cloudvar.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:9082"
//! unix_socket = "/run/cloudvar.sock"   # optional, overrides listen when set
//! web_root = "./playground"
//! max_rooms = 2048
//! max_room_variables = 128
//! max_room_subscribers = 128
//!
//! [logging]
//! level = "info"
//! ```

use std::path::Path;

use serde::Deserialize;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener and resource-cap settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:9082`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// UNIX domain socket path. When set, takes priority over `listen`.
    #[serde(default)]
    pub unix_socket: Option<String>,
    /// Directory of static files served under `/` (default `./playground`).
    #[serde(default = "default_web_root")]
    pub web_root: String,
    /// Maximum number of concurrently active rooms (default 2048).
    #[serde(default = "default_max_rooms")]
    pub max_rooms: usize,
    /// Maximum variables per room (default 128).
    #[serde(default = "default_max_room_variables")]
    pub max_room_variables: usize,
    /// Maximum subscribers per room (default 128).
    #[serde(default = "default_max_room_subscribers")]
    pub max_room_subscribers: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:9082".to_string()
}
fn default_web_root() -> String {
    "./playground".to_string()
}
fn default_max_rooms() -> usize {
    crate::room::MAX_ROOMS
}
fn default_max_room_variables() -> usize {
    crate::room::MAX_ROOM_VARIABLES
}
fn default_max_room_subscribers() -> usize {
    crate::room::MAX_ROOM_SUBSCRIBERS
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            unix_socket: None,
            web_root: default_web_root(),
            max_rooms: default_max_rooms(),
            max_room_variables: default_max_room_variables(),
            max_room_subscribers: default_max_room_subscribers(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file (panics on failure). Otherwise looks
    /// for `cloudvar.toml` in the current directory, falling back to compiled
    /// defaults.
    pub fn load(path: Option<&str>) -> Self {
        let mut config = if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .unwrap_or_else(|e| panic!("Failed to read config file {p}: {e}"));
            toml::from_str(&content).unwrap_or_else(|e| panic!("Failed to parse config file {p}: {e}"))
        } else if Path::new("cloudvar.toml").exists() {
            let content =
                std::fs::read_to_string("cloudvar.toml").expect("Failed to read cloudvar.toml");
            toml::from_str(&content).expect("Failed to parse cloudvar.toml")
        } else {
            Config::default()
        };

        if let Ok(listen) = std::env::var("CLOUDVAR_LISTEN") {
            config.server.listen = listen;
        }
        if let Ok(web_root) = std::env::var("CLOUDVAR_WEB_ROOT") {
            config.server.web_root = web_root;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_room_caps() {
        let config = Config::default();
        assert_eq!(config.server.listen, "0.0.0.0:9082");
        assert_eq!(config.server.max_rooms, 2048);
        assert_eq!(config.logging.level, "info");
        assert!(config.server.unix_socket.is_none());
    }
}
