//! Request building and transport for query execution.
//!
//! Everything up to [`QueryExecutor::send`] is synchronous: parameter
//! formatting, template substitution, URL and body construction. Only the
//! HTTP round-trip awaits, and it races the caller's cancellation token.

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::Response;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use super::CommandShape;
use crate::config::{validate_timeout, ConnectionConfig};
use crate::connection::Connection;
use crate::error::{ChError, Result};
use crate::params::{format_http, format_literal, is_http_expressible, substitute, Parameters};
use crate::protocol::FeatureSet;

/// Header carrying the numeric exception code on failed queries.
const EXCEPTION_CODE_HEADER: &str = "x-clickhouse-exception-code";

/// Response bodies the driver knows how to hand on.
const ACCEPT_TYPES: &str = "application/json, text/csv, application/octet-stream";

const SQL_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Query-string prefix for native parameters.
const HTTP_PARAM_PREFIX: &str = "param_";

/// Per-execution options supplied by the command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Client-chosen query id, visible in `system.query_log`.
    pub query_id: Option<String>,
    /// Overrides the connection's request timeout.
    pub timeout: Option<Duration>,
}

/// How parameters reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterStrategy {
    /// No parameters were bound.
    None,
    /// Sent as `param_<name>` query pairs.
    Native,
    /// Formatted as literals and substituted into the SQL text.
    Literal,
}

/// A fully built request, ready to send.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// Target URL including connection and parameter query pairs.
    pub url: Url,
    /// SQL as written by the caller, kept for error reports.
    pub source_sql: String,
    /// SQL sent as the request body.
    pub sql: String,
    /// Whether the body is gzip-compressed.
    pub compress: bool,
    pub timeout: Duration,
    pub strategy: ParameterStrategy,
    authorization: String,
}

impl PreparedRequest {
    /// Encodes the request body, compressing it when enabled.
    pub fn body(&self) -> Result<Vec<u8>> {
        if !self.compress {
            return Ok(self.sql.as_bytes().to_vec());
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(self.sql.as_bytes())
            .and_then(|_| encoder.finish())
            .map_err(|e| ChError::config(format!("Failed to compress request body: {e}")))
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> &str {
        &self.authorization
    }
}

/// Executes statements on behalf of a command.
pub struct QueryExecutor<'c> {
    connection: &'c Connection,
}

impl<'c> QueryExecutor<'c> {
    /// Creates an executor bound to the given connection.
    pub fn new(connection: &'c Connection) -> Self {
        Self { connection }
    }

    /// Runs `sql` and returns the successful response for the caller to read.
    ///
    /// Parameters force the connection open first, since the encoding
    /// strategy depends on the negotiated features. Without parameters a
    /// closed connection stays closed.
    pub async fn execute(
        &self,
        sql: &str,
        params: &Parameters,
        shape: CommandShape,
        options: &ExecuteOptions,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        if cancel.is_cancelled() {
            return Err(ChError::Cancelled);
        }

        let features = if params.is_empty() {
            None
        } else {
            validate(params)?;
            self.connection.open_with(cancel).await?;
            Some(self.connection.features()?)
        };

        let request = self.prepare(sql, params, shape, features, options)?;
        self.send(request, cancel).await
    }

    /// Builds the request for `sql` without sending it.
    ///
    /// Native parameters are used when the server supports them and every
    /// bound type is expressible that way; otherwise all parameters are
    /// substituted as literals.
    pub fn prepare(
        &self,
        sql: &str,
        params: &Parameters,
        shape: CommandShape,
        features: Option<FeatureSet>,
        options: &ExecuteOptions,
    ) -> Result<PreparedRequest> {
        let config = self.connection.config();
        let mut pairs = connection_pairs(&config, options.query_id.as_deref());

        let strategy = if params.is_empty() {
            ParameterStrategy::None
        } else if use_native(params, features)? {
            ParameterStrategy::Native
        } else {
            ParameterStrategy::Literal
        };

        let body_sql = match strategy {
            ParameterStrategy::None => sql.to_string(),
            ParameterStrategy::Native => {
                for param in params {
                    pairs.push((
                        format!("{HTTP_PARAM_PREFIX}{}", param.name),
                        format_http(param)?,
                    ));
                }
                sql.to_string()
            }
            ParameterStrategy::Literal => {
                let literals = params
                    .iter()
                    .map(|p| -> Result<(String, String)> {
                        Ok((p.name.clone(), format_literal(p)?))
                    })
                    .collect::<Result<HashMap<_, _>>>()?;
                substitute(sql, &literals)?
            }
        };

        Ok(PreparedRequest {
            url: build_url(&config, &pairs)?,
            source_sql: sql.to_string(),
            sql: shape.apply(&body_sql),
            compress: config.compression,
            timeout: request_timeout(&config, options.timeout)?,
            strategy,
            authorization: basic_auth(&config),
        })
    }

    /// Builds a request that sends `sql` exactly as given.
    pub(crate) fn prepare_raw(
        &self,
        sql: &str,
        options: Option<&ExecuteOptions>,
    ) -> Result<PreparedRequest> {
        let config = self.connection.config();
        let query_id = options.and_then(|o| o.query_id.as_deref());
        let pairs = connection_pairs(&config, query_id);

        Ok(PreparedRequest {
            url: build_url(&config, &pairs)?,
            source_sql: sql.to_string(),
            sql: sql.to_string(),
            compress: config.compression,
            timeout: request_timeout(&config, options.and_then(|o| o.timeout))?,
            strategy: ParameterStrategy::None,
            authorization: basic_auth(&config),
        })
    }

    /// Sends a prepared request, mapping non-success statuses to server errors.
    pub async fn send(&self, request: PreparedRequest, cancel: &CancellationToken) -> Result<Response> {
        let body = request.body()?;

        let mut builder = self
            .connection
            .client()
            .post(request.url.clone())
            .timeout(request.timeout)
            .header(AUTHORIZATION, request.authorization())
            .header(ACCEPT, ACCEPT_TYPES)
            .header(CONTENT_TYPE, SQL_CONTENT_TYPE);
        if request.compress {
            builder = builder.header(CONTENT_ENCODING, "gzip");
        }

        debug!(
            strategy = ?request.strategy,
            "Sending {} byte query to {}",
            body.len(),
            request.url.path()
        );

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChError::Cancelled),
            response = builder.body(body).send() => response?,
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let header_code = response
            .headers()
            .get(EXCEPTION_CODE_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse().ok());

        let message = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChError::Cancelled),
            text = response.text() => text?,
        };

        debug!("Server rejected query with HTTP {}", status.as_u16());

        Err(ChError::Server {
            status: status.as_u16(),
            code: header_code.or_else(|| parse_exception_code(&message)),
            message,
            sql: request.source_sql,
        })
    }
}

/// Checks every parameter's type tag and value before any network call.
fn validate(params: &Parameters) -> Result<()> {
    for param in params {
        format_literal(param)?;
    }
    Ok(())
}

fn use_native(params: &Parameters, features: Option<FeatureSet>) -> Result<bool> {
    let Some(features) = features else {
        return Ok(false);
    };
    if !features.contains(FeatureSet::HTTP_PARAMETERS) {
        return Ok(false);
    }
    for param in params {
        if !is_http_expressible(&param.param_type()?, features) {
            debug!(
                "Parameter '{}' ({}) cannot be sent natively; substituting literals",
                param.name, param.type_tag
            );
            return Ok(false);
        }
    }
    Ok(true)
}

/// Query pairs every request carries, in a stable order.
fn connection_pairs(config: &ConnectionConfig, query_id: Option<&str>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Some(database) = &config.database {
        pairs.push(("database".to_string(), database.clone()));
    }
    if config.use_session {
        if let Some(session_id) = &config.session_id {
            pairs.push(("session_id".to_string(), session_id.clone()));
        }
    }
    if let Some(query_id) = query_id {
        pairs.push(("query_id".to_string(), query_id.to_string()));
    }
    if config.compression {
        pairs.push(("enable_http_compression".to_string(), "1".to_string()));
    }
    for (name, value) in &config.settings {
        pairs.push((name.clone(), value.clone()));
    }
    pairs
}

fn build_url(config: &ConnectionConfig, pairs: &[(String, String)]) -> Result<Url> {
    let mut url = config.base_url()?;
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
    Ok(url)
}

/// The per-execution timeout if set, else the connection's.
fn request_timeout(config: &ConnectionConfig, timeout: Option<Duration>) -> Result<Duration> {
    match timeout {
        Some(timeout) => validate_timeout(timeout).map(|_| timeout),
        None => Ok(config.timeout()),
    }
}

fn basic_auth(config: &ConnectionConfig) -> String {
    let credentials = format!("{}:{}", config.user, config.password);
    format!("Basic {}", BASE64.encode(credentials))
}

/// Extracts `62` from bodies such as `Code: 62. DB::Exception: ...`.
fn parse_exception_code(message: &str) -> Option<u32> {
    let rest = message.trim_start().strip_prefix("Code:")?.trim_start();
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}
