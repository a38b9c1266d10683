//! Query parameters: type tags, value formatting and template substitution.

pub mod format;
pub mod template;
mod types;

pub use format::{format_http, format_literal, is_http_expressible};
pub use template::substitute;
pub use types::{ParamType, Parameter, Parameters};
