//! Query execution: request building, transport and result metadata.

mod executor;
mod shape;
mod stats;

pub use executor::{ExecuteOptions, ParameterStrategy, PreparedRequest, QueryExecutor};
pub use shape::CommandShape;
pub use stats::QueryStats;
