//! Progress summary reported by the server in `X-ClickHouse-Summary`.

use serde::{Deserialize, Deserializer};

/// Header carrying the JSON summary of a finished query.
pub const SUMMARY_HEADER: &str = "x-clickhouse-summary";

/// Row and byte counters for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct QueryStats {
    #[serde(default, deserialize_with = "number_or_string")]
    pub read_rows: u64,
    #[serde(default, deserialize_with = "number_or_string")]
    pub read_bytes: u64,
    #[serde(default, deserialize_with = "number_or_string")]
    pub written_rows: u64,
    #[serde(default, deserialize_with = "number_or_string")]
    pub written_bytes: u64,
    #[serde(default, deserialize_with = "number_or_string")]
    pub total_rows_to_read: u64,
    #[serde(default, deserialize_with = "number_or_string")]
    pub result_rows: u64,
}

impl QueryStats {
    /// Parses the summary header of a response, if present and well-formed.
    pub fn from_headers(headers: &reqwest::header::HeaderMap) -> Option<Self> {
        let raw = headers.get(SUMMARY_HEADER)?.to_str().ok()?;
        serde_json::from_str(raw).ok()
    }
}

/// The server quotes its counters (`"read_rows":"1"`); accept both forms.
fn number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
