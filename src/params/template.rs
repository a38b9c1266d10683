//! `{name:Type}` placeholder substitution for servers without native
//! HTTP parameters.

use std::collections::HashMap;

use crate::error::{ChError, Result};

/// Replaces every `{name:Type}` placeholder with the pre-formatted literal
/// stored under `name`.
///
/// A placeholder runs from `{` to the first following `}`, and the name is
/// everything before the last `:` inside it. Text outside placeholders is
/// copied unchanged. Braces cannot be escaped: a `{` without a closing `}`
/// is rejected, and a lone `}` is copied as-is.
pub fn substitute(sql: &str, literals: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;
    let mut offset = 0;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);

        let after_open = &rest[open + 1..];
        let close = after_open
            .find('}')
            .ok_or(ChError::UnterminatedPlaceholder(offset + open))?;
        let placeholder = &after_open[..close];

        let (name, _type_tag) = placeholder
            .rsplit_once(':')
            .ok_or_else(|| ChError::MissingTypeAnnotation(placeholder.to_string()))?;
        let name = name.trim();

        let literal = literals
            .get(name)
            .ok_or_else(|| ChError::ParameterNotFound(name.to_string()))?;
        out.push_str(literal);

        let consumed = open + 1 + close + 1;
        rest = &rest[consumed..];
        offset += consumed;
    }

    out.push_str(rest);
    Ok(out)
}
