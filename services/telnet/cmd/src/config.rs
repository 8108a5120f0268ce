//! Configuration handling for the telnet agent.
//!
//! Values come from a YAML file, then environment variables, then command
//! line flags (applied in `main`), each layer overriding the previous one.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use telnet_session::SessionConfig;
use telnet_wire::{LineEnding, DEFAULT_MAX_LINE_LENGTH};
use tracing::{info, warn};

/// Telnet agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Remote host name or IP
    pub host: String,
    /// Remote TCP port
    pub port: u16,
    /// Minimum spacing between sends (milliseconds)
    pub send_interval_ms: u64,
    /// Connect and proxy handshake timeout (seconds)
    pub connect_timeout_secs: u64,
    /// Outbound line terminator
    pub line_ending: LineEnding,
    /// Longest inbound line accepted
    pub max_line_length: usize,
    /// Optional SOCKS4 proxy
    pub proxy: Option<ProxyConfig>,
    /// Optional credentials sent as the first two lines
    pub login: Option<LoginConfig>,
}

/// SOCKS4 proxy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy host
    pub host: String,
    /// Proxy port
    pub port: u16,
    /// Ident user id passed in the CONNECT request
    #[serde(default)]
    pub user_id: String,
}

/// Login lines sent right after connecting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginConfig {
    /// User name line
    pub user: String,
    /// Password line
    #[serde(default)]
    pub password: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 23,
            send_interval_ms: 3000,
            connect_timeout_secs: 30,
            line_ending: LineEnding::CrLf,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            proxy: None,
            login: None,
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    agent: Option<AgentConfig>,
}

impl AgentConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = match std::fs::read_to_string(&config_path) {
            Ok(content) => match Self::from_yaml(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                    config
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?}, using defaults: {}",
                        config_path.as_ref(),
                        e
                    );
                    Self::default()
                }
            },
            Err(_) => {
                warn!(
                    "Config file {:?} not found, using defaults",
                    config_path.as_ref()
                );
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());

        info!(
            "Final agent configuration: target={}:{}, send_interval={}ms, proxy={:?}",
            config.host,
            config.port,
            config.send_interval_ms,
            config.proxy.as_ref().map(|p| format!("{}:{}", p.host, p.port))
        );

        Ok(config)
    }

    /// Parse the `agent` section of a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let root: RootConfig = serde_yaml::from_str(content)?;
        Ok(root.agent.unwrap_or_default())
    }

    /// Apply `TELNET_AGENT_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("TELNET_AGENT_HOST") {
            info!("Host overridden by environment: {}", host);
            self.host = host;
        }

        if let Some(port) = lookup("TELNET_AGENT_PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    self.port = port;
                    info!("Port overridden by environment: {}", port);
                }
                Err(_) => warn!("Ignoring invalid TELNET_AGENT_PORT: {}", port),
            }
        }

        if let Some(interval) = lookup("TELNET_AGENT_SEND_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(ms) => {
                    self.send_interval_ms = ms;
                    info!("Send interval overridden by environment: {}ms", ms);
                }
                Err(_) => warn!("Ignoring invalid TELNET_AGENT_SEND_INTERVAL_MS: {}", interval),
            }
        }

        if let Some(proxy) = lookup("TELNET_AGENT_PROXY") {
            match parse_host_port(&proxy) {
                Some((host, port)) => {
                    let user_id = self
                        .proxy
                        .take()
                        .map(|p| p.user_id)
                        .unwrap_or_default();
                    self.proxy = Some(ProxyConfig {
                        host,
                        port,
                        user_id,
                    });
                    info!("Proxy overridden by environment: {}", proxy);
                }
                None => warn!("Ignoring invalid TELNET_AGENT_PROXY: {}", proxy),
            }
        }

        if let Some(user_id) = lookup("TELNET_AGENT_PROXY_USER") {
            match self.proxy.as_mut() {
                Some(proxy) => proxy.user_id = user_id,
                None => warn!("TELNET_AGENT_PROXY_USER set without a proxy; ignoring"),
            }
        }
    }

    /// Session settings derived from this configuration
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            send_interval: Duration::from_millis(self.send_interval_ms),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            line_ending: self.line_ending,
            max_line_length: self.max_line_length,
        }
    }
}

/// Split `host:port`; the port is taken after the last colon
pub fn parse_host_port(value: &str) -> Option<(String, u16)> {
    let (host, port) = value.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    let port = port.parse().ok()?;
    Some((host.to_string(), port))
}
