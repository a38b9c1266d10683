//! The version probe run when a connection opens.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Connection;
use crate::error::{ChError, Result};
use crate::protocol::ServerVersion;
use crate::query::QueryExecutor;

/// Query sent to learn the server version.
pub const PROBE_SQL: &str = "SELECT version() FORMAT TSV";

/// First two bytes of every gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Sends the probe and parses the reported version.
pub(super) async fn run(connection: &Connection, cancel: &CancellationToken) -> Result<ServerVersion> {
    let executor = QueryExecutor::new(connection);
    let request = executor.prepare_raw(PROBE_SQL, None)?;
    let response = executor.send(request, cancel).await?;

    let body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ChError::Cancelled),
        body = response.bytes() => body?,
    };

    debug!("Version probe returned {} bytes", body.len());
    parse_probe_body(&body)
}

/// Validates the raw probe body and parses the version from it.
fn parse_probe_body(body: &[u8]) -> Result<ServerVersion> {
    if body.starts_with(&GZIP_MAGIC) {
        return Err(ChError::config(
            "Server response is gzip-compressed but was not decompressed; \
             check the HTTP client's decompression settings",
        ));
    }

    let text = String::from_utf8_lossy(body);
    if text.trim().is_empty() {
        return Err(ChError::config("Server returned an empty version string"));
    }

    ServerVersion::parse(&text)
}
