//! Rendering parameter values as SQL literals or HTTP parameter values.
//!
//! The literal form is substituted straight into the query text, so every
//! string that reaches it is quoted and escaped. The HTTP form follows the
//! server's text format for `param_<name>` query pairs; percent-encoding of
//! the final pair is left to the URL builder.

use std::net::IpAddr;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use rust_decimal::Decimal;

use super::types::{ParamType, Parameter};
use crate::error::{ChError, Result};
use crate::protocol::FeatureSet;
use crate::types::Value;

/// Formats a parameter as a SQL literal for inline substitution.
pub fn format_literal(param: &Parameter) -> Result<String> {
    let ty = param.param_type()?;
    literal(&param.name, &ty, &param.value)
}

/// Formats a parameter as the value of a `param_<name>` query pair.
pub fn format_http(param: &Parameter) -> Result<String> {
    let ty = param.param_type()?;
    http(&param.name, &ty, &param.value, false)
}

/// Returns true if the server can receive this type as a native HTTP parameter.
pub fn is_http_expressible(ty: &ParamType, features: FeatureSet) -> bool {
    match ty {
        ParamType::Uuid => features.contains(FeatureSet::UUID_PARAMETERS),
        ParamType::Map(k, v) => {
            features.contains(FeatureSet::MAP_TYPE)
                && is_http_expressible(k, features)
                && is_http_expressible(v, features)
        }
        ParamType::DateTime64 { .. } => features.contains(FeatureSet::DATETIME64),
        ParamType::Decimal { .. } => features.contains(FeatureSet::DECIMALS),
        ParamType::IPv4 | ParamType::IPv6 => features.contains(FeatureSet::IPV6),
        ParamType::Date32 => features.contains(FeatureSet::DATE32),
        ParamType::Bool => features.contains(FeatureSet::BOOL_TYPE),
        ParamType::Nullable(inner) | ParamType::Array(inner) => {
            is_http_expressible(inner, features)
        }
        _ => true,
    }
}

fn literal(name: &str, ty: &ParamType, value: &Value) -> Result<String> {
    if let ParamType::Nullable(inner) = ty {
        return match value {
            Value::Null => Ok("NULL".to_string()),
            v => literal(name, inner, v),
        };
    }

    let text = match ty {
        ParamType::Array(inner) => {
            let items = as_array(name, ty, value)?
                .iter()
                .map(|v| literal(name, inner, v))
                .collect::<Result<Vec<_>>>()?;
            format!("[{}]", items.join(", "))
        }
        ParamType::Map(k, v) => {
            let mut parts = Vec::new();
            for (key, val) in as_map(name, ty, value)? {
                parts.push(literal(name, k, key)?);
                parts.push(literal(name, v, val)?);
            }
            format!("map({})", parts.join(", "))
        }
        ParamType::String | ParamType::FixedString(_) => quote(&as_text(name, ty, value)?),
        ParamType::Date => format!("toDate({})", quote(&date_text(name, ty, value)?)),
        ParamType::Date32 => format!("toDate32({})", quote(&date_text(name, ty, value)?)),
        ParamType::DateTime(tz) => {
            let dt = quote(&datetime_text(name, ty, value, 0)?);
            match tz {
                Some(tz) => format!("toDateTime({dt}, {})", quote(tz)),
                None => format!("toDateTime({dt})"),
            }
        }
        ParamType::DateTime64 {
            precision,
            timezone,
        } => {
            let dt = quote(&datetime_text(name, ty, value, *precision)?);
            match timezone {
                Some(tz) => format!("toDateTime64({dt}, {precision}, {})", quote(tz)),
                None => format!("toDateTime64({dt}, {precision})"),
            }
        }
        ParamType::Decimal { precision, scale } => {
            let bits = match precision {
                0..=9 => 32,
                10..=18 => 64,
                19..=38 => 128,
                _ => 256,
            };
            let d = as_decimal(name, ty, value)?;
            format!("toDecimal{bits}({}, {scale})", quote(&d.to_string()))
        }
        ParamType::Uuid => format!("toUUID({})", quote(&uuid_text(name, ty, value)?)),
        ParamType::IPv4 => format!("toIPv4({})", quote(&ip_text(name, ty, value)?)),
        ParamType::IPv6 => format!("toIPv6({})", quote(&ip_text(name, ty, value)?)),
        scalar => scalar_text(name, scalar, value)?,
    };
    Ok(text)
}

fn http(name: &str, ty: &ParamType, value: &Value, nested: bool) -> Result<String> {
    if let ParamType::Nullable(inner) = ty {
        return match value {
            Value::Null if nested => Ok("NULL".to_string()),
            Value::Null => Ok("\\N".to_string()),
            v => http(name, inner, v, nested),
        };
    }

    let text = match ty {
        ParamType::Array(inner) => {
            let items = as_array(name, ty, value)?
                .iter()
                .map(|v| http(name, inner, v, true))
                .collect::<Result<Vec<_>>>()?;
            format!("[{}]", items.join(","))
        }
        ParamType::Map(k, v) => {
            let mut parts = Vec::new();
            for (key, val) in as_map(name, ty, value)? {
                parts.push(format!(
                    "{}:{}",
                    http(name, k, key, true)?,
                    http(name, v, val, true)?
                ));
            }
            format!("{{{}}}", parts.join(","))
        }
        ParamType::String | ParamType::FixedString(_) => {
            let s = as_text(name, ty, value)?;
            if nested {
                quote(&s)
            } else {
                escape_tsv(&s)
            }
        }
        ParamType::Date | ParamType::Date32 => quote_if(nested, date_text(name, ty, value)?),
        ParamType::DateTime(_) => quote_if(nested, datetime_text(name, ty, value, 0)?),
        ParamType::DateTime64 { precision, .. } => {
            quote_if(nested, datetime_text(name, ty, value, *precision)?)
        }
        ParamType::Decimal { .. } => as_decimal(name, ty, value)?.to_string(),
        ParamType::Uuid => quote_if(nested, uuid_text(name, ty, value)?),
        ParamType::IPv4 | ParamType::IPv6 => quote_if(nested, ip_text(name, ty, value)?),
        scalar => scalar_text(name, scalar, value)?,
    };
    Ok(text)
}

/// Bool, integer and float values render the same in both encodings.
fn scalar_text(name: &str, ty: &ParamType, value: &Value) -> Result<String> {
    let text = match ty {
        ParamType::Bool => match value {
            Value::Bool(b) => b.to_string(),
            other => return Err(mismatch(name, ty, other)),
        },
        ParamType::Int8 => int_in_range(name, ty, value, i8::MIN.into(), i8::MAX.into())?,
        ParamType::Int16 => int_in_range(name, ty, value, i16::MIN.into(), i16::MAX.into())?,
        ParamType::Int32 => int_in_range(name, ty, value, i32::MIN.into(), i32::MAX.into())?,
        ParamType::Int64 => int_in_range(name, ty, value, i64::MIN.into(), i64::MAX.into())?,
        ParamType::UInt8 => int_in_range(name, ty, value, 0, u8::MAX.into())?,
        ParamType::UInt16 => int_in_range(name, ty, value, 0, u16::MAX.into())?,
        ParamType::UInt32 => int_in_range(name, ty, value, 0, u32::MAX.into())?,
        ParamType::UInt64 => int_in_range(name, ty, value, 0, u64::MAX.into())?,
        ParamType::Float32 | ParamType::Float64 => match value {
            Value::Float(x) => float_text(*x),
            Value::Int(i) => i.to_string(),
            Value::UInt(u) => u.to_string(),
            other => return Err(mismatch(name, ty, other)),
        },
        other => return Err(ChError::UnsupportedParameterType(other.to_string())),
    };
    Ok(text)
}

fn int_in_range(name: &str, ty: &ParamType, value: &Value, min: i128, max: i128) -> Result<String> {
    let n: i128 = match value {
        Value::Int(i) => (*i).into(),
        Value::UInt(u) => (*u).into(),
        other => return Err(mismatch(name, ty, other)),
    };
    if n < min || n > max {
        return Err(ChError::invalid_value(
            name,
            format!("{n} is out of range for {ty}"),
        ));
    }
    Ok(n.to_string())
}

fn float_text(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        (if x > 0.0 { "inf" } else { "-inf" }).to_string()
    } else {
        x.to_string()
    }
}

fn as_text(name: &str, ty: &ParamType, value: &Value) -> Result<String> {
    let s = match value {
        Value::String(s) => s.clone(),
        other => return Err(mismatch(name, ty, other)),
    };
    if let ParamType::FixedString(n) = ty {
        if s.len() > *n {
            return Err(ChError::invalid_value(
                name,
                format!("{} bytes do not fit in {ty}", s.len()),
            ));
        }
    }
    Ok(s)
}

fn as_decimal(name: &str, ty: &ParamType, value: &Value) -> Result<Decimal> {
    match value {
        Value::Decimal(d) => Ok(*d),
        Value::Int(i) => Ok(Decimal::from(*i)),
        Value::UInt(u) => Ok(Decimal::from(*u)),
        other => Err(mismatch(name, ty, other)),
    }
}

fn as_array<'v>(name: &str, ty: &ParamType, value: &'v Value) -> Result<&'v [Value]> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(mismatch(name, ty, other)),
    }
}

fn as_map<'v>(name: &str, ty: &ParamType, value: &'v Value) -> Result<&'v [(Value, Value)]> {
    match value {
        Value::Map(entries) => Ok(entries),
        other => Err(mismatch(name, ty, other)),
    }
}

fn date_text(name: &str, ty: &ParamType, value: &Value) -> Result<String> {
    let date: NaiveDate = match value {
        Value::Date(d) => *d,
        Value::DateTime(dt) => dt.date(),
        other => return Err(mismatch(name, ty, other)),
    };
    Ok(date.format("%Y-%m-%d").to_string())
}

fn datetime_text(name: &str, ty: &ParamType, value: &Value, precision: u8) -> Result<String> {
    let dt: NaiveDateTime = match value {
        Value::DateTime(dt) => *dt,
        Value::Date(d) => d.and_time(chrono::NaiveTime::MIN),
        other => return Err(mismatch(name, ty, other)),
    };
    let mut text = dt.format("%Y-%m-%d %H:%M:%S").to_string();
    if precision > 0 {
        let nanos = dt.nanosecond() % 1_000_000_000;
        let fraction = nanos / 10u32.pow(9 - u32::from(precision));
        text.push_str(&format!(".{:0width$}", fraction, width = usize::from(precision)));
    }
    Ok(text)
}

fn uuid_text(name: &str, ty: &ParamType, value: &Value) -> Result<String> {
    match value {
        Value::Uuid(u) => Ok(u.to_string()),
        Value::String(s) => uuid::Uuid::parse_str(s)
            .map(|u| u.to_string())
            .map_err(|e| ChError::invalid_value(name, format!("not a UUID: {e}"))),
        other => Err(mismatch(name, ty, other)),
    }
}

fn ip_text(name: &str, ty: &ParamType, value: &Value) -> Result<String> {
    let ip: IpAddr = match value {
        Value::Ip(ip) => *ip,
        Value::String(s) => s
            .parse()
            .map_err(|e| ChError::invalid_value(name, format!("not an IP address: {e}")))?,
        other => return Err(mismatch(name, ty, other)),
    };
    match (ty, ip) {
        (ParamType::IPv4, IpAddr::V6(_)) => Err(ChError::invalid_value(
            name,
            format!("{ip} is not an IPv4 address"),
        )),
        _ => Ok(ip.to_string()),
    }
}

fn mismatch(name: &str, ty: &ParamType, value: &Value) -> ChError {
    if value.is_null() {
        return ChError::invalid_value(name, format!("NULL requires Nullable({ty})"));
    }
    ChError::invalid_value(name, format!("{} value cannot be sent as {ty}", value.kind()))
}

/// Single-quotes a string, escaping backslashes and quotes.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn quote_if(nested: bool, s: String) -> String {
    if nested {
        quote(&s)
    } else {
        s
    }
}

/// Escapes a top-level string for the server's tab-separated text format.
fn escape_tsv(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}
