//! Parameter type tags and the parameter collection.

use std::fmt;
use std::str::FromStr;

use crate::error::{ChError, Result};
use crate::types::Value;

/// A parsed ClickHouse type tag such as `Nullable(Array(String))`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Decimal { precision: u8, scale: u8 },
    String,
    FixedString(usize),
    Date,
    Date32,
    DateTime(Option<String>),
    DateTime64 { precision: u8, timezone: Option<String> },
    Uuid,
    IPv4,
    IPv6,
    Nullable(Box<ParamType>),
    Array(Box<ParamType>),
    Map(Box<ParamType>, Box<ParamType>),
}

impl ParamType {
    /// Parses a type tag. Unknown tags fail with `UnsupportedParameterType`.
    pub fn parse(tag: &str) -> Result<Self> {
        let unsupported = || ChError::UnsupportedParameterType(tag.to_string());
        let tag_trimmed = tag.trim();

        let (name, args) = match tag_trimmed.find('(') {
            Some(open) => {
                let inner = tag_trimmed[open + 1..]
                    .strip_suffix(')')
                    .ok_or_else(unsupported)?;
                (tag_trimmed[..open].trim(), split_args(inner))
            }
            None => (tag_trimmed, Vec::new()),
        };

        let parsed = match (name, args.as_slice()) {
            ("Bool" | "Boolean", []) => Self::Bool,
            ("Int8", []) => Self::Int8,
            ("Int16", []) => Self::Int16,
            ("Int32", []) => Self::Int32,
            ("Int64", []) => Self::Int64,
            ("UInt8", []) => Self::UInt8,
            ("UInt16", []) => Self::UInt16,
            ("UInt32", []) => Self::UInt32,
            ("UInt64", []) => Self::UInt64,
            ("Float32", []) => Self::Float32,
            ("Float64", []) => Self::Float64,
            ("Decimal", [p, s]) => Self::Decimal {
                precision: parse_number(p).ok_or_else(unsupported)?,
                scale: parse_number(s).ok_or_else(unsupported)?,
            },
            ("Decimal32", [s]) => decimal_with(9, s).ok_or_else(unsupported)?,
            ("Decimal64", [s]) => decimal_with(18, s).ok_or_else(unsupported)?,
            ("Decimal128", [s]) => decimal_with(38, s).ok_or_else(unsupported)?,
            ("Decimal256", [s]) => decimal_with(76, s).ok_or_else(unsupported)?,
            ("String", []) => Self::String,
            ("FixedString", [n]) => Self::FixedString(n.parse().map_err(|_| unsupported())?),
            ("Date", []) => Self::Date,
            ("Date32", []) => Self::Date32,
            ("DateTime", []) => Self::DateTime(None),
            ("DateTime", [tz]) => Self::DateTime(Some(parse_quoted(tz).ok_or_else(unsupported)?)),
            ("DateTime64", [p]) => Self::DateTime64 {
                precision: parse_precision(p).ok_or_else(unsupported)?,
                timezone: None,
            },
            ("DateTime64", [p, tz]) => Self::DateTime64 {
                precision: parse_precision(p).ok_or_else(unsupported)?,
                timezone: Some(parse_quoted(tz).ok_or_else(unsupported)?),
            },
            ("UUID", []) => Self::Uuid,
            ("IPv4", []) => Self::IPv4,
            ("IPv6", []) => Self::IPv6,
            ("Nullable", [inner]) => Self::Nullable(Box::new(Self::parse(inner)?)),
            ("LowCardinality", [inner]) => Self::parse(inner)?,
            ("Array", [inner]) => Self::Array(Box::new(Self::parse(inner)?)),
            ("Map", [k, v]) => Self::Map(Box::new(Self::parse(k)?), Box::new(Self::parse(v)?)),
            _ => return Err(unsupported()),
        };

        if let Self::Decimal { precision, scale } = parsed {
            if precision == 0 || precision > 76 || scale > precision {
                return Err(unsupported());
            }
        }

        Ok(parsed)
    }
}

/// Splits a type argument list on commas that are not nested in parentheses
/// or quotes.
fn split_args(inner: &str) -> Vec<&str> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut start = 0;

    for (i, c) in inner.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth = depth.saturating_sub(1),
            ',' if !in_quote && depth == 0 => {
                args.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }

    let last = inner[start..].trim();
    if !last.is_empty() || !args.is_empty() {
        args.push(last);
    }
    args
}

fn parse_number(s: &str) -> Option<u8> {
    s.trim().parse().ok()
}

fn parse_precision(s: &str) -> Option<u8> {
    parse_number(s).filter(|p| *p <= 9)
}

fn parse_quoted(s: &str) -> Option<String> {
    s.trim()
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
        .map(str::to_string)
}

fn decimal_with(precision: u8, scale: &str) -> Option<ParamType> {
    Some(ParamType::Decimal {
        precision,
        scale: parse_number(scale)?,
    })
}

impl FromStr for ParamType {
    type Err = ChError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "Bool"),
            Self::Int8 => write!(f, "Int8"),
            Self::Int16 => write!(f, "Int16"),
            Self::Int32 => write!(f, "Int32"),
            Self::Int64 => write!(f, "Int64"),
            Self::UInt8 => write!(f, "UInt8"),
            Self::UInt16 => write!(f, "UInt16"),
            Self::UInt32 => write!(f, "UInt32"),
            Self::UInt64 => write!(f, "UInt64"),
            Self::Float32 => write!(f, "Float32"),
            Self::Float64 => write!(f, "Float64"),
            Self::Decimal { precision, scale } => write!(f, "Decimal({precision}, {scale})"),
            Self::String => write!(f, "String"),
            Self::FixedString(n) => write!(f, "FixedString({n})"),
            Self::Date => write!(f, "Date"),
            Self::Date32 => write!(f, "Date32"),
            Self::DateTime(None) => write!(f, "DateTime"),
            Self::DateTime(Some(tz)) => write!(f, "DateTime('{tz}')"),
            Self::DateTime64 {
                precision,
                timezone: None,
            } => write!(f, "DateTime64({precision})"),
            Self::DateTime64 {
                precision,
                timezone: Some(tz),
            } => write!(f, "DateTime64({precision}, '{tz}')"),
            Self::Uuid => write!(f, "UUID"),
            Self::IPv4 => write!(f, "IPv4"),
            Self::IPv6 => write!(f, "IPv6"),
            Self::Nullable(inner) => write!(f, "Nullable({inner})"),
            Self::Array(inner) => write!(f, "Array({inner})"),
            Self::Map(k, v) => write!(f, "Map({k}, {v})"),
        }
    }
}

/// A named, typed query parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name as it appears in `{name:Type}` placeholders.
    pub name: String,
    /// Declared type tag, parsed when the parameter is formatted.
    pub type_tag: String,
    /// The value to send.
    pub value: Value,
}

impl Parameter {
    /// Creates a new parameter.
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
            value: value.into(),
        }
    }

    /// Parses the declared type tag.
    pub fn param_type(&self) -> Result<ParamType> {
        ParamType::parse(&self.type_tag)
    }
}

/// Ordered parameter collection with unique names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    items: Vec<Parameter>,
}

impl Parameters {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, replacing any existing one with the same name.
    pub fn insert(&mut self, param: Parameter) {
        match self.items.iter_mut().find(|p| p.name == param.name) {
            Some(existing) => *existing = param,
            None => self.items.push(param),
        }
    }

    /// Looks up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.items.iter().find(|p| p.name == name)
    }

    /// Removes a parameter by name, returning it if present.
    pub fn remove(&mut self, name: &str) -> Option<Parameter> {
        let index = self.items.iter().position(|p| p.name == name)?;
        Some(self.items.remove(index))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<Parameter> for Parameters {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        let mut params = Self::new();
        for p in iter {
            params.insert(p);
        }
        params
    }
}
