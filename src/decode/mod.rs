//! Row decoding seam.
//!
//! The driver never parses result bodies itself. Read-shaped executions ask
//! the server for `RowBinaryWithNamesAndTypes`, and a [`RowDecoder`] turns
//! that byte stream into rows.

mod mock;

pub use mock::MockRowDecoder;

use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::Row;

/// Output format requested for read-shaped executions.
pub const ROW_FORMAT: &str = "RowBinaryWithNamesAndTypes";

/// Raw response body as it arrives from the transport.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Decoded rows, consumed once, front to back.
pub type RowStream = BoxStream<'static, Result<Row>>;

/// Turns a self-describing binary body (column names and types embedded)
/// into typed rows.
pub trait RowDecoder: Send + Sync {
    /// Decodes the body lazily; the stream ends after the last row.
    fn decode(&self, body: ByteStream) -> RowStream;
}
