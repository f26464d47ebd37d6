//! Configuration for respline
//!
//! Centralized client configuration with sensible defaults.

use std::time::Duration;

use crate::error::{ClientError, Result};

/// Main configuration for a respline client
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Server Configuration
    // -------------------------------------------------------------------------
    /// Server host name or IP address
    pub host: String,

    /// Server TCP port
    pub port: u16,

    // -------------------------------------------------------------------------
    // Connection Configuration
    // -------------------------------------------------------------------------
    /// Fixed delay between a failed (or lost) connection and the next attempt
    pub reconnect_delay: Duration,

    /// Upper bound on a single connect attempt (None = OS default)
    pub connect_timeout: Option<Duration>,

    /// Initial capacity of the per-connection read buffer (in bytes)
    pub read_buffer_capacity: usize,

    // -------------------------------------------------------------------------
    // Startup Commands
    // -------------------------------------------------------------------------
    /// Issued once, after the first successful connection
    pub initial_commands: Vec<String>,

    /// Issued after every successful connection, including reconnects
    pub on_connect_commands: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            reconnect_delay: Duration::from_secs(1),
            connect_timeout: None,
            read_buffer_capacity: 16 * 1024, // 16 KB
            initial_commands: vec!["KEYS *".to_string()],
            on_connect_commands: Vec::new(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// `host:port` form, for logging
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject configurations that can never connect
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ClientError::Config("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(ClientError::Config("port must be non-zero".to_string()));
        }
        if self.read_buffer_capacity == 0 {
            return Err(ClientError::Config(
                "read buffer capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the server host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the fixed reconnect delay
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the read buffer capacity (in bytes)
    pub fn read_buffer_capacity(mut self, size: usize) -> Self {
        self.config.read_buffer_capacity = size;
        self
    }

    /// Replace the commands issued after the first connection
    pub fn initial_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.initial_commands = commands.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the commands issued after every connection
    pub fn on_connect_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.on_connect_commands = commands.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
