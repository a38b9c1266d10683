//! Command façade: SQL text plus parameters, executed on a connection.

mod reader;

pub use reader::QueryReader;

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::Connection;
use crate::error::{ChError, Result};
use crate::params::{Parameter, Parameters};
use crate::query::{CommandShape, ExecuteOptions, QueryExecutor, QueryStats};
use crate::types::Value;

/// A SQL statement bound to a connection.
///
/// Each command owns its cancellation token. Cancelling it aborts only the
/// requests this command issued; other commands on the same connection are
/// unaffected. Cancelling after an execution has finished has no effect on
/// that execution, but the token stays cancelled, so set a fresh one with
/// [`Command::set_cancellation_token`] before running the command again.
#[derive(Debug)]
pub struct Command<'c> {
    connection: Option<&'c Connection>,
    sql: String,
    params: Parameters,
    options: ExecuteOptions,
    cancel: CancellationToken,
    last_stats: Option<QueryStats>,
}

impl<'c> Command<'c> {
    /// Creates a command without a connection.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            connection: None,
            sql: sql.into(),
            params: Parameters::new(),
            options: ExecuteOptions::default(),
            cancel: CancellationToken::new(),
            last_stats: None,
        }
    }

    /// Creates a command on the given connection.
    pub fn on(connection: &'c Connection, sql: impl Into<String>) -> Self {
        Self::new(sql).with_connection(connection)
    }

    /// Attaches the command to a connection.
    pub fn with_connection(mut self, connection: &'c Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Binds a parameter, replacing any previous one with the same name.
    pub fn bind(
        mut self,
        name: impl Into<String>,
        type_tag: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.params.insert(Parameter::new(name, type_tag, value));
        self
    }

    /// Sets a per-command timeout that overrides the connection's.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Sets the query id sent to the server.
    pub fn with_query_id(mut self, query_id: impl Into<String>) -> Self {
        self.options.query_id = Some(query_id.into());
        self
    }

    pub fn set_connection(&mut self, connection: Option<&'c Connection>) {
        self.connection = connection;
    }

    pub fn set_sql(&mut self, sql: impl Into<String>) {
        self.sql = sql.into();
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn add_parameter(&mut self, param: Parameter) {
        self.params.insert(param);
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.params
    }

    /// Returns a handle to this command's cancellation token.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Replaces the cancellation token used by subsequent executions.
    pub fn set_cancellation_token(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    /// Cancels any in-flight execution of this command.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Server summary of the most recent execution, if the server sent one.
    pub fn query_stats(&self) -> Option<QueryStats> {
        self.last_stats
    }

    /// Executes a statement and returns the affected row count.
    ///
    /// The count is the integer the body starts with; bodies that do not
    /// start with one count as zero.
    pub async fn execute_non_query(&mut self) -> Result<u64> {
        let body = self.execute_raw().await?;
        Ok(parse_affected_rows(&body))
    }

    /// Executes a statement and returns the response body as text, in
    /// whatever format the statement requested (tab-separated by default).
    pub async fn execute_raw(&mut self) -> Result<String> {
        let response = self.send(CommandShape::NonQuery).await?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ChError::Cancelled),
            text = response.text() => Ok(text?),
        }
    }

    /// Executes a query and returns the first column of the first row.
    pub async fn execute_scalar(&mut self) -> Result<Option<Value>> {
        let mut reader = self.execute_reader().await?;
        reader.next_scalar().await
    }

    /// Executes a query and returns a reader over all rows.
    pub async fn execute_reader(&mut self) -> Result<QueryReader> {
        self.execute_reader_with(CommandShape::Default).await
    }

    /// Executes a query with the given shape and returns a reader.
    pub async fn execute_reader_with(&mut self, shape: CommandShape) -> Result<QueryReader> {
        if shape == CommandShape::NonQuery {
            return Err(ChError::invalid_operation(
                "non-query executions do not produce rows",
            ));
        }
        let decoder = self
            .require_connection()?
            .decoder()
            .ok_or_else(|| ChError::config("Connection has no row decoder configured"))?;

        let response = self.send(shape).await?;
        Ok(QueryReader::new(response, decoder, self.cancel.clone()))
    }

    async fn send(&mut self, shape: CommandShape) -> Result<reqwest::Response> {
        let connection = self.require_connection()?;
        debug!(?shape, params = self.params.len(), "Executing command");

        let response = QueryExecutor::new(connection)
            .execute(&self.sql, &self.params, shape, &self.options, &self.cancel)
            .await?;
        self.last_stats = QueryStats::from_headers(response.headers());
        Ok(response)
    }

    fn require_connection(&self) -> Result<&'c Connection> {
        self.connection
            .ok_or_else(|| ChError::config("Command has no connection"))
    }
}

/// Parses the integer a non-query body starts with, defaulting to zero.
fn parse_affected_rows(body: &str) -> u64 {
    let digits: String = body
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().unwrap_or(0)
}
