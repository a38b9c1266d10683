//! Configuration management for ch-http.
//!
//! Handles the per-connection settings bundle, its `Key=Value;` connection
//! string form, and loading named connections from a TOML file.

use crate::error::{ChError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix marking a connection-string key as a server setting.
pub const CUSTOM_SETTING_PREFIX: &str = "set_";

/// Main configuration structure loaded from the config file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Named database connections.
    #[serde(default)]
    pub connections: HashMap<String, ConnectionConfig>,
}

/// HTTP scheme used to reach the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    /// Returns the URL scheme.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Parses a scheme name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            _ => None,
        }
    }
}

/// Connection settings bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// HTTP or HTTPS.
    #[serde(default)]
    pub protocol: Protocol,

    /// Server host.
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP interface port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name; the server default is used when absent.
    pub database: Option<String>,

    /// User name.
    #[serde(default = "default_user")]
    pub user: String,

    /// Password (not recommended to store in config).
    #[serde(default)]
    pub password: String,

    /// Compress request bodies and accept compressed responses.
    #[serde(default = "default_true")]
    pub compression: bool,

    /// Attach a session id to every request.
    #[serde(default)]
    pub use_session: bool,

    /// Explicit session id; one is generated when sessions are enabled and this is empty.
    pub session_id: Option<String>,

    /// Request timeout in milliseconds; never zero.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Server settings sent with every request.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8123
}

fn default_user() -> String {
    "default".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    120_000
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            host: default_host(),
            port: default_port(),
            database: None,
            user: default_user(),
            password: String::new(),
            compression: default_true(),
            use_session: false,
            session_id: None,
            timeout_ms: default_timeout_ms(),
            settings: BTreeMap::new(),
        }
    }
}

impl ConnectionConfig {
    /// Parses a `Key=Value;` connection string.
    ///
    /// Keys are case-insensitive. Keys starting with `set_` become server
    /// settings, e.g. `set_max_threads=4`. Values containing `;` or `=` must
    /// be quoted with `"` or `'`; a doubled quote inside stands for one quote.
    /// `Timeout` is in seconds and may be fractional.
    pub fn from_connection_string(conn_str: &str) -> Result<Self> {
        let mut config = Self::default();

        for (key, value) in split_pairs(conn_str)? {
            let key = key.as_str();
            let value = value.as_str();

            if let Some(setting) = key.strip_prefix(CUSTOM_SETTING_PREFIX) {
                if setting.is_empty() {
                    return Err(ChError::config("Empty custom setting name"));
                }
                config.settings.insert(setting.to_string(), value.to_string());
                continue;
            }

            match key.to_lowercase().as_str() {
                "protocol" => {
                    config.protocol = Protocol::parse(value).ok_or_else(|| {
                        ChError::config(format!(
                            "Invalid protocol '{value}'. Expected 'http' or 'https'"
                        ))
                    })?;
                }
                "host" => config.host = value.to_string(),
                "port" => config.port = parse_value(key, value)?,
                "database" => config.database = Some(value.to_string()).filter(|d| !d.is_empty()),
                "username" | "user" => config.user = value.to_string(),
                "password" => config.password = value.to_string(),
                "compression" | "compress" => config.compression = parse_value(key, value)?,
                "usesession" => config.use_session = parse_value(key, value)?,
                "sessionid" => config.session_id = Some(value.to_string()).filter(|s| !s.is_empty()),
                "timeout" => config.timeout_ms = parse_timeout_secs(value)?,
                _ => {
                    return Err(ChError::config(format!(
                        "Unknown connection string key '{key}'"
                    )))
                }
            }
        }

        if config.host.is_empty() {
            return Err(ChError::config("Host is required"));
        }

        Ok(config)
    }

    /// Converts the config back into a connection string.
    ///
    /// `from_connection_string(to_connection_string())` yields an equal config.
    pub fn to_connection_string(&self) -> String {
        let mut parts = vec![
            format!("Protocol={}", self.protocol.as_str()),
            format!("Host={}", quote_value(&self.host)),
            format!("Port={}", self.port),
        ];
        if let Some(database) = &self.database {
            parts.push(format!("Database={}", quote_value(database)));
        }
        parts.push(format!("Username={}", quote_value(&self.user)));
        if !self.password.is_empty() {
            parts.push(format!("Password={}", quote_value(&self.password)));
        }
        parts.push(format!("Compression={}", self.compression));
        parts.push(format!("UseSession={}", self.use_session));
        if let Some(session_id) = &self.session_id {
            parts.push(format!("SessionId={}", quote_value(session_id)));
        }
        parts.push(format!("Timeout={}", format_timeout_secs(self.timeout_ms)));
        for (name, value) in &self.settings {
            parts.push(format!("{CUSTOM_SETTING_PREFIX}{name}={}", quote_value(value)));
        }
        parts.join(";")
    }

    /// Base URL of the server's HTTP interface.
    pub fn base_url(&self) -> Result<url::Url> {
        let raw = format!("{}://{}:{}/", self.protocol.as_str(), self.host, self.port);
        url::Url::parse(&raw).map_err(|e| ChError::config(format!("Invalid server address: {e}")))
    }

    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Sets the request timeout, at millisecond precision.
    ///
    /// Timeouts under one millisecond are rejected.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout_ms = validate_timeout(timeout)?;
        Ok(())
    }

    /// Applies environment variables (CLICKHOUSE_HOST, etc.) over unset defaults.
    pub fn apply_env_defaults(&mut self) {
        if self.host == default_host() {
            if let Ok(host) = std::env::var("CLICKHOUSE_HOST") {
                self.host = host;
            }
        }
        if self.port == default_port() {
            if let Ok(port_str) = std::env::var("CLICKHOUSE_PORT") {
                if let Ok(port) = port_str.parse() {
                    self.port = port;
                }
            }
        }
        if self.database.is_none() {
            self.database = std::env::var("CLICKHOUSE_DATABASE").ok();
        }
        if self.user == default_user() {
            if let Ok(user) = std::env::var("CLICKHOUSE_USER") {
                self.user = user;
            }
        }
        if self.password.is_empty() {
            if let Ok(password) = std::env::var("CLICKHOUSE_PASSWORD") {
                self.password = password;
            }
        }
    }

    /// Returns a display-safe string (no password) for log output.
    pub fn display_string(&self) -> String {
        let database = self.database.as_deref().unwrap_or("default");
        format!(
            "{}@{}://{}:{}/{}",
            self.user,
            self.protocol.as_str(),
            self.host,
            self.port,
            database
        )
    }
}

/// Converts a timeout to whole milliseconds, rejecting zero.
pub(crate) fn validate_timeout(timeout: Duration) -> Result<u64> {
    match u64::try_from(timeout.as_millis()) {
        Ok(0) => Err(ChError::config(format!(
            "Timeout must be at least 1 ms, got {timeout:?}"
        ))),
        Ok(ms) => Ok(ms),
        Err(_) => Ok(u64::MAX),
    }
}

fn parse_timeout_secs(value: &str) -> Result<u64> {
    let secs: f64 = parse_value("Timeout", value)?;
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ChError::config(format!(
            "Invalid value '{value}' for 'Timeout'. Expected a positive number of seconds"
        )));
    }
    validate_timeout(Duration::from_millis((secs * 1000.0).round() as u64))
}

fn format_timeout_secs(ms: u64) -> String {
    if ms % 1000 == 0 {
        (ms / 1000).to_string()
    } else {
        (ms as f64 / 1000.0).to_string()
    }
}

/// Quotes a value that would not otherwise survive `split_pairs`.
fn quote_value(value: &str) -> String {
    let needs_quotes =
        value.contains(&[';', '=', '"', '\''][..]) || value.trim() != value;
    if needs_quotes {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Splits a connection string into trimmed keys and unquoted values.
///
/// `;` ends a pair except inside a quoted value.
fn split_pairs(conn_str: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = conn_str.chars().peekable();

    loop {
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ';' {
                break;
            }
            key.push(c);
            chars.next();
        }
        let key = key.trim().to_string();

        match chars.next() {
            Some('=') => {}
            end => {
                if !key.is_empty() {
                    return Err(ChError::config(format!(
                        "Invalid connection string segment '{key}'"
                    )));
                }
                if end.is_none() {
                    break;
                }
                continue;
            }
        }

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }

        let value = match chars.peek().copied() {
            Some(quote @ ('"' | '\'')) => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => {
                            if chars.peek() == Some(&quote) {
                                chars.next();
                                value.push(quote);
                            } else {
                                break;
                            }
                        }
                        Some(c) => value.push(c),
                        None => {
                            return Err(ChError::config(format!(
                                "Unterminated quoted value for '{key}'"
                            )))
                        }
                    }
                }
                for c in chars.by_ref() {
                    if c == ';' {
                        break;
                    }
                    if !c.is_whitespace() {
                        return Err(ChError::config(format!(
                            "Unexpected text after quoted value for '{key}'"
                        )));
                    }
                }
                value
            }
            _ => {
                let value: String = chars.by_ref().take_while(|&c| c != ';').collect();
                value.trim().to_string()
            }
        };

        pairs.push((key, value));
    }

    Ok(pairs)
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .to_lowercase()
        .parse()
        .map_err(|_| ChError::config(format!("Invalid value '{value}' for '{key}'")))
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ch-http")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ChError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            ChError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })?;

        if let Some((name, _)) = config.connections.iter().find(|(_, c)| c.timeout_ms == 0) {
            return Err(ChError::config(format!(
                "Configuration error in {}:\n  connection '{name}' has timeout_ms = 0",
                path.display()
            )));
        }

        Ok(config)
    }

    /// Gets a named connection, or the default connection if name is None.
    pub fn get_connection(&self, name: Option<&str>) -> Option<&ConnectionConfig> {
        let key = name.unwrap_or("default");
        self.connections.get(key)
    }
}
