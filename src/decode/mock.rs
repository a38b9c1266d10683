//! Mock row decoder for testing.
//!
//! Treats the body as tab-separated text, one row per line, every column a
//! string. Good enough to drive the reader and scalar paths against a stub
//! server.

use futures::StreamExt;

use super::{ByteStream, RowDecoder, RowStream};
use crate::error::{ChError, Result};
use crate::types::{Row, Value};

/// A decoder that splits the buffered body into lines and tabs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockRowDecoder;

impl MockRowDecoder {
    /// Creates a new mock decoder.
    pub fn new() -> Self {
        Self
    }
}

fn parse_rows(body: &[u8]) -> Result<Vec<Row>> {
    let text = std::str::from_utf8(body)
        .map_err(|e| ChError::config(format!("Mock decoder expects UTF-8 text: {e}")))?;
    Ok(text
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| line.split('\t').map(Value::from).collect())
        .collect())
}

impl RowDecoder for MockRowDecoder {
    fn decode(&self, body: ByteStream) -> RowStream {
        let rows = async move {
            let mut buf = Vec::new();
            let mut body = body;
            while let Some(chunk) = body.next().await {
                buf.extend_from_slice(&chunk?);
            }
            parse_rows(&buf)
        };

        futures::stream::once(rows)
            .flat_map(|result| match result {
                Ok(rows) => futures::stream::iter(rows.into_iter().map(Ok)).boxed(),
                Err(e) => futures::stream::once(async move { Err(e) }).boxed(),
            })
            .boxed()
    }
}
