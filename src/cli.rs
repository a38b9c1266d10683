//! Command-line argument parsing for chq.

use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;

use ch_http::config::ConnectionConfig;
use ch_http::error::{ChError, Result};
use ch_http::params::{ParamType, Parameter};
use ch_http::types::Value;
use chrono::{NaiveDate, NaiveDateTime};
use clap::Parser;
use rust_decimal::Decimal;

/// Run a query against ClickHouse over its HTTP interface.
#[derive(Parser, Debug)]
#[command(name = "chq")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// SQL to execute; read from stdin when omitted or "-"
    #[arg(value_name = "SQL")]
    pub sql: Option<String>,

    /// Connection string (e.g., "Host=localhost;Port=8123;Database=default")
    #[arg(long, value_name = "CONNECTION_STRING", env = "CLICKHOUSE_CONNECTION_STRING")]
    pub dsn: Option<String>,

    /// Server host
    #[arg(short = 'H', long, value_name = "HOST")]
    pub host: Option<String>,

    /// HTTP interface port
    #[arg(short = 'p', long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Database name
    #[arg(short = 'd', long, value_name = "DATABASE")]
    pub database: Option<String>,

    /// User name
    #[arg(short = 'U', long, value_name = "USER")]
    pub user: Option<String>,

    /// Use named connection from config
    #[arg(short = 'c', long, value_name = "NAME")]
    pub connection: Option<String>,

    /// Config file path
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Query parameter as name:Type=value (repeatable)
    #[arg(short = 'P', long = "param", value_name = "NAME:TYPE=VALUE")]
    pub params: Vec<String>,

    /// Query id reported to the server
    #[arg(long, value_name = "ID")]
    pub query_id: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Only run the handshake and print the server version
    #[arg(long)]
    pub version_only: bool,

    /// Enable debug logging for the driver
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path (custom or default).
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(ch_http::config::Config::default_path)
    }

    /// Returns the named connection, if specified.
    pub fn connection_name(&self) -> Option<&str> {
        self.connection.as_deref()
    }

    /// Builds a connection config from CLI arguments only.
    pub fn to_connection_config(&self) -> Result<Option<ConnectionConfig>> {
        if let Some(dsn) = &self.dsn {
            return Ok(Some(ConnectionConfig::from_connection_string(dsn)?));
        }

        if self.host.is_some() || self.port.is_some() || self.database.is_some() || self.user.is_some() {
            let mut config = ConnectionConfig::default();
            if let Some(host) = &self.host {
                config.host = host.clone();
            }
            if let Some(port) = self.port {
                config.port = port;
            }
            config.database = self.database.clone();
            if let Some(user) = &self.user {
                config.user = user.clone();
            }
            return Ok(Some(config));
        }

        Ok(None)
    }

    /// Returns the SQL text from the argument or stdin.
    pub fn read_sql(&self) -> Result<String> {
        match self.sql.as_deref() {
            Some(sql) if sql != "-" => Ok(sql.to_string()),
            _ => {
                let mut sql = String::new();
                std::io::stdin()
                    .read_to_string(&mut sql)
                    .map_err(|e| ChError::config(format!("Failed to read SQL from stdin: {e}")))?;
                if sql.trim().is_empty() {
                    return Err(ChError::config("No SQL given"));
                }
                Ok(sql)
            }
        }
    }

    /// Parses every `--param` argument.
    pub fn parameters(&self) -> Result<Vec<Parameter>> {
        self.params.iter().map(|raw| parse_param_arg(raw)).collect()
    }
}

/// Parses `name:Type=value` into a parameter.
pub fn parse_param_arg(raw: &str) -> Result<Parameter> {
    let invalid = || ChError::config(format!("Invalid parameter '{raw}'. Expected name:Type=value"));

    let (decl, value) = raw.split_once('=').ok_or_else(invalid)?;
    let (name, type_tag) = decl.split_once(':').ok_or_else(invalid)?;
    if name.trim().is_empty() {
        return Err(invalid());
    }

    let ty = ParamType::parse(type_tag)?;
    let value = parse_value(name, &ty, value)?;
    Ok(Parameter::new(name.trim(), type_tag.trim(), value))
}

/// Converts command-line text into a value of the declared type.
fn parse_value(name: &str, ty: &ParamType, raw: &str) -> Result<Value> {
    let bad = |e: &dyn std::fmt::Display| ChError::invalid_value(name, format!("'{raw}': {e}"));

    let value = match ty {
        ParamType::Nullable(_) if raw == "\\N" || raw.eq_ignore_ascii_case("null") => Value::Null,
        ParamType::Nullable(inner) => parse_value(name, inner, raw)?,
        ParamType::Bool => Value::Bool(raw.parse().map_err(|e| bad(&e))?),
        ParamType::Int8 | ParamType::Int16 | ParamType::Int32 | ParamType::Int64 => {
            Value::Int(raw.parse().map_err(|e| bad(&e))?)
        }
        ParamType::UInt8 | ParamType::UInt16 | ParamType::UInt32 | ParamType::UInt64 => {
            Value::UInt(raw.parse().map_err(|e| bad(&e))?)
        }
        ParamType::Float32 | ParamType::Float64 => Value::Float(raw.parse().map_err(|e| bad(&e))?),
        ParamType::Decimal { .. } => Value::Decimal(Decimal::from_str(raw).map_err(|e| bad(&e))?),
        ParamType::String | ParamType::FixedString(_) => Value::String(raw.to_string()),
        ParamType::Date | ParamType::Date32 => {
            Value::Date(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| bad(&e))?)
        }
        ParamType::DateTime(_) | ParamType::DateTime64 { .. } => Value::DateTime(
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map_err(|e| bad(&e))?,
        ),
        ParamType::Uuid => Value::Uuid(uuid::Uuid::parse_str(raw).map_err(|e| bad(&e))?),
        ParamType::IPv4 | ParamType::IPv6 => Value::Ip(raw.parse().map_err(|e| bad(&e))?),
        ParamType::Array(_) | ParamType::Map(_, _) => {
            return Err(ChError::invalid_value(
                name,
                format!("{ty} values cannot be given on the command line"),
            ))
        }
    };
    Ok(value)
}
