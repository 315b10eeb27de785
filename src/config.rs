use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

use crate::search::SearchSource;

/// Conexión a un nodo Lavalink
#[derive(Clone, Deserialize, Serialize, PartialEq)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub secure: bool,
}

impl NodeConfig {
    /// `ws(s)://host:port/v4/websocket`
    pub fn websocket_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}/v4/websocket", scheme, self.host, self.port)
    }

    /// `http(s)://host:port`
    pub fn rest_base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Identificador legible para logs
    pub fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parsea `host:port[:password[:ssl]]`; lo que falte sale de `defaults`
    pub fn parse(entry: &str, defaults: &NodeConfig) -> Result<Self> {
        let mut parts = entry.trim().splitn(4, ':');

        let host = match parts.next() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => anyhow::bail!("Node entry without host: '{}'", entry),
        };
        let port = match parts.next() {
            Some(port) => port.parse()?,
            None => defaults.port,
        };
        let password = parts
            .next()
            .map(str::to_string)
            .unwrap_or_else(|| defaults.password.clone());
        let secure = match parts.next() {
            Some(flag) => flag.parse()?,
            None => defaults.secure,
        };

        Ok(Self {
            host,
            port,
            password,
            secure,
        })
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 2333,
            password: "youshallnotpass".to_string(),
            secure: false,
        }
    }
}

// El password nunca aparece en logs
impl fmt::Debug for NodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("secure", &self.secure)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Nodos
    pub nodes: Vec<NodeConfig>,
    pub client_name: String,
    pub client_user_id: Option<u64>,

    // Player
    pub default_volume: u16,
    pub default_search_source: SearchSource,

    // Conexión
    pub handshake_attempts: u32,
    pub handshake_interval_ms: u64,
    pub heartbeat_interval_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let single_node = NodeConfig {
            host: std::env::var("LAVALINK_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("LAVALINK_PORT")
                .unwrap_or_else(|_| "2333".to_string())
                .parse()?,
            password: std::env::var("LAVALINK_PASSWORD")
                .unwrap_or_else(|_| "youshallnotpass".to_string()),
            secure: std::env::var("LAVALINK_SSL")
                .unwrap_or_else(|_| "false".to_string())
                .parse()?,
        };

        let nodes = match std::env::var("LAVALINK_NODES") {
            Ok(list) if !list.trim().is_empty() => list
                .split(',')
                .filter(|entry| !entry.trim().is_empty())
                .map(|entry| NodeConfig::parse(entry, &single_node))
                .collect::<Result<Vec<_>>>()?,
            _ => vec![single_node],
        };

        let config = Self {
            nodes,
            client_name: std::env::var("LAVALINK_CLIENT_NAME")
                .unwrap_or_else(|_| default_client_name()),
            client_user_id: std::env::var("CLIENT_USER_ID").ok().and_then(|s| s.parse().ok()),

            default_volume: std::env::var("DEFAULT_VOLUME")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            default_search_source: std::env::var("DEFAULT_SEARCH_SOURCE")
                .unwrap_or_else(|_| "ytsearch".to_string())
                .parse()?,

            handshake_attempts: std::env::var("HANDSHAKE_ATTEMPTS")
                .unwrap_or_else(|_| "50".to_string())
                .parse()?,
            handshake_interval_ms: std::env::var("HANDSHAKE_INTERVAL_MS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            heartbeat_interval_secs: std::env::var("HEARTBEAT_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - At least one node, none with port 0 or an empty host
    /// - Default volume must be between 0 and 1000
    /// - Handshake must be polled at least once
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            anyhow::bail!("At least one Lavalink node must be configured");
        }

        for node in &self.nodes {
            if node.host.trim().is_empty() {
                anyhow::bail!("Node host cannot be empty");
            }
            if node.port == 0 {
                anyhow::bail!("Node port cannot be 0 ({})", node.host);
            }
            url::Url::parse(&node.websocket_url())?;
        }

        if self.default_volume > 1000 {
            anyhow::bail!("Default volume must be between 0 and 1000, got: {}", self.default_volume);
        }

        if self.handshake_attempts == 0 {
            anyhow::bail!("Handshake attempts must be greater than 0");
        }

        if self.heartbeat_interval_secs == 0 {
            anyhow::bail!("Heartbeat interval must be greater than 0");
        }

        Ok(())
    }

    pub fn handshake_interval(&self) -> Duration {
        Duration::from_millis(self.handshake_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes node passwords.
    pub fn summary(&self) -> String {
        let nodes: Vec<String> = self
            .nodes
            .iter()
            .map(|n| format!("{}{}", n.label(), if n.secure { " (tls)" } else { "" }))
            .collect();

        format!(
            "Config Summary:\n  \
            Nodes: {}\n  \
            Client: {}\n  \
            Player: {} vol, search '{}'\n  \
            Handshake: {} x {}ms, heartbeat {}s",
            nodes.join(", "),
            self.client_name,
            self.default_volume,
            self.default_search_source.prefix().unwrap_or("raw"),
            self.handshake_attempts,
            self.handshake_interval_ms,
            self.heartbeat_interval_secs
        )
    }
}

fn default_client_name() -> String {
    format!("OpenMusic/{}", env!("CARGO_PKG_VERSION"))
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            nodes: vec![NodeConfig::default()],
            client_name: default_client_name(),
            client_user_id: None,

            default_volume: 100,
            default_search_source: SearchSource::YouTube,

            handshake_attempts: 50,   // 50 x 100ms = 5s
            handshake_interval_ms: 100,
            heartbeat_interval_secs: 30,
        }
    }
}
