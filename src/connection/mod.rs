//! Connection lifecycle and capability negotiation.
//!
//! A [`Connection`] starts Closed. Opening it runs the version handshake;
//! success moves it to Open with an immutable [`FeatureSet`], and any failure
//! moves it to Broken. Closing never touches the network.

mod handshake;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::decode::RowDecoder;
use crate::error::{ChError, Result};
use crate::protocol::{FeatureSet, ServerVersion};

pub use handshake::PROBE_SQL;

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
    Broken,
}

/// What the handshake learned about the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Negotiated {
    version: ServerVersion,
    features: FeatureSet,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Closed,
    Open(Negotiated),
    Broken,
}

/// A handle to one ClickHouse server over HTTP.
///
/// Safe to share across tasks behind an `Arc`. Pooling of the underlying
/// TCP connections is left to the HTTP client.
pub struct Connection {
    config: RwLock<ConnectionConfig>,
    client: reqwest::Client,
    state: RwLock<Slot>,
    handshake: tokio::sync::Mutex<()>,
    decoder: Option<Arc<dyn RowDecoder>>,
}

impl Connection {
    /// Creates a closed connection from the given settings.
    ///
    /// When sessions are enabled without an explicit id, a random one is
    /// generated here and kept for the lifetime of the connection.
    pub fn new(mut config: ConnectionConfig) -> Result<Self> {
        config.base_url()?;

        if config.use_session && config.session_id.is_none() {
            config.session_id = Some(uuid::Uuid::new_v4().to_string());
        }

        let client = reqwest::Client::builder()
            .gzip(config.compression)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChError::config(format!("Failed to create HTTP client: {e}")))?;

        debug!("Created connection to {}", config.display_string());

        Ok(Self {
            config: RwLock::new(config),
            client,
            state: RwLock::new(Slot::Closed),
            handshake: tokio::sync::Mutex::new(()),
            decoder: None,
        })
    }

    /// Creates a connection from a `Key=Value;` connection string.
    pub fn from_connection_string(conn_str: &str) -> Result<Self> {
        Self::new(ConnectionConfig::from_connection_string(conn_str)?)
    }

    /// Sets the decoder used for reader and scalar executions.
    pub fn with_decoder(mut self, decoder: Arc<dyn RowDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    /// Opens the connection, running the handshake if it is not open yet.
    pub async fn open(&self) -> Result<()> {
        self.open_with(&CancellationToken::new()).await
    }

    /// Opens the connection, abandoning the handshake if `cancel` fires.
    ///
    /// Concurrent callers share a single handshake: the first one probes the
    /// server, the rest wait and observe its outcome. A waiting caller whose
    /// token fires returns `Cancelled` without touching the state.
    pub async fn open_with(&self, cancel: &CancellationToken) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChError::Cancelled),
            guard = self.handshake.lock() => guard,
        };
        if self.is_open() {
            return Ok(());
        }

        match handshake::run(self, cancel).await {
            Ok(version) => {
                let features = FeatureSet::from_version(version);
                info!("Connected to server {} with {:?}", version, features);
                self.set_slot(Slot::Open(Negotiated { version, features }));
                Ok(())
            }
            Err(e) => {
                warn!("Handshake failed: {}", e);
                self.set_slot(Slot::Broken);
                Err(e)
            }
        }
    }

    /// Closes the connection. No request is sent.
    pub fn close(&self) {
        self.set_slot(Slot::Closed);
        debug!("Connection closed");
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        match self.slot() {
            Slot::Closed => ConnectionState::Closed,
            Slot::Open(_) => ConnectionState::Open,
            Slot::Broken => ConnectionState::Broken,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.slot(), Slot::Open(_))
    }

    /// Server version learned during the handshake.
    ///
    /// Fails with `InvalidOperation` unless the connection is open.
    pub fn server_version(&self) -> Result<ServerVersion> {
        self.negotiated().map(|n| n.version)
    }

    /// Capabilities negotiated during the handshake.
    ///
    /// Fails with `InvalidOperation` unless the connection is open.
    pub fn features(&self) -> Result<FeatureSet> {
        self.negotiated().map(|n| n.features)
    }

    /// Snapshot of the current settings, including the session id in use.
    pub fn config(&self) -> ConnectionConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.config().session_id
    }

    /// Adds or replaces a server setting sent with every request.
    pub fn set_custom_setting(&self, name: impl Into<String>, value: impl Into<String>) {
        self.update_config(|c| {
            c.settings.insert(name.into(), value.into());
        });
    }

    /// Removes a server setting, returning its previous value.
    pub fn remove_custom_setting(&self, name: &str) -> Option<String> {
        self.update_config(|c| c.settings.remove(name))
    }

    /// Replaces the credentials used for subsequent requests.
    pub fn set_credentials(&self, user: impl Into<String>, password: impl Into<String>) {
        self.update_config(|c| {
            c.user = user.into();
            c.password = password.into();
        });
    }

    /// Switches the database used for subsequent requests.
    pub fn change_database(&self, database: impl Into<String>) {
        self.update_config(|c| c.database = Some(database.into()));
    }

    /// Changes the default request timeout, at millisecond precision.
    ///
    /// Fails with a config error for timeouts under one millisecond and
    /// leaves the current timeout in place.
    pub fn set_timeout(&self, timeout: Duration) -> Result<()> {
        self.update_config(|c| c.set_timeout(timeout))
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub(crate) fn decoder(&self) -> Option<Arc<dyn RowDecoder>> {
        self.decoder.clone()
    }

    fn negotiated(&self) -> Result<Negotiated> {
        match self.slot() {
            Slot::Open(n) => Ok(n),
            Slot::Closed => Err(ChError::invalid_operation(
                "connection is closed; call open() before reading negotiated features",
            )),
            Slot::Broken => Err(ChError::invalid_operation(
                "connection is broken; reopen it before reading negotiated features",
            )),
        }
    }

    fn slot(&self) -> Slot {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_slot(&self, slot: Slot) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = slot;
    }

    fn update_config<T>(&self, f: impl FnOnce(&mut ConnectionConfig) -> T) -> T {
        f(&mut self.config.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// Marks the connection open without a handshake.
    #[cfg(test)]
    pub(crate) fn force_open(&self, version: ServerVersion) {
        self.set_slot(Slot::Open(Negotiated {
            version,
            features: FeatureSet::from_version(version),
        }));
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("server", &self.config().display_string())
            .field("state", &self.state())
            .finish()
    }
}
