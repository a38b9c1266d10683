//! ch-http - An async ClickHouse driver over the HTTP interface.
//!
//! A [`Connection`] negotiates server capabilities once, on first open.
//! A [`Command`] sends SQL with typed parameters, either as native HTTP
//! parameters or as escaped literals depending on what the server supports,
//! and hands the response to a [`RowDecoder`](decode::RowDecoder).

pub mod command;
pub mod config;
pub mod connection;
pub mod decode;
pub mod error;
pub mod logging;
pub mod params;
pub mod protocol;
pub mod query;
pub mod types;

pub use command::{Command, QueryReader};
pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionState};
pub use error::{ChError, Result};
pub use params::{ParamType, Parameter, Parameters};
pub use protocol::{FeatureSet, ServerVersion};
pub use query::{CommandShape, QueryStats};
pub use types::{Row, Value};
