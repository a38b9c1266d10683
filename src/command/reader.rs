//! Forward-only row reader over a streaming response.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::decode::{ByteStream, RowDecoder, RowStream};
use crate::error::{ChError, Result};
use crate::query::QueryStats;
use crate::types::{Row, Value};

/// Rows of one result set, decoded lazily as the body arrives.
///
/// The reader is single-pass: rows can be read once, in order, and there is
/// no way to rewind. Cancelling the command's token interrupts a pending read.
pub struct QueryReader {
    rows: RowStream,
    cancel: CancellationToken,
    stats: Option<QueryStats>,
    rows_read: u64,
}

impl QueryReader {
    pub(crate) fn new(
        response: reqwest::Response,
        decoder: Arc<dyn RowDecoder>,
        cancel: CancellationToken,
    ) -> Self {
        let stats = QueryStats::from_headers(response.headers());
        let body: ByteStream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ChError::from))
            .boxed();

        Self {
            rows: decoder.decode(body),
            cancel,
            stats,
            rows_read: 0,
        }
    }

    /// Reads the next row, or `None` once the result set is exhausted.
    pub async fn next(&mut self) -> Option<Result<Row>> {
        let row = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Some(Err(ChError::Cancelled)),
            row = self.rows.next() => row,
        };
        if matches!(row, Some(Ok(_))) {
            self.rows_read += 1;
        }
        row
    }

    /// Reads the first column of the next row.
    ///
    /// Returns `None` when there are no more rows or the row has no columns.
    pub async fn next_scalar(&mut self) -> Result<Option<Value>> {
        match self.next().await {
            Some(row) => Ok(row?.into_iter().next()),
            None => Ok(None),
        }
    }

    /// Reads all remaining rows.
    pub async fn collect_rows(mut self) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// Converts the reader into a plain stream that still honours cancellation.
    pub fn into_stream(self) -> BoxStream<'static, Result<Row>> {
        futures::stream::unfold(self, |mut reader| async move {
            reader.next().await.map(|row| (row, reader))
        })
        .boxed()
    }

    /// Number of rows returned so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Server summary sent with the response headers, if any.
    pub fn stats(&self) -> Option<QueryStats> {
        self.stats
    }
}

impl std::fmt::Debug for QueryReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryReader")
            .field("rows_read", &self.rows_read)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
