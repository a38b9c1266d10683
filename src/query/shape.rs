//! Execution shapes and the SQL suffix each one appends.

use crate::decode::ROW_FORMAT;

/// The kind of result a command asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandShape {
    /// All rows.
    #[default]
    Default,
    /// At most one row.
    SingleRow,
    /// Column metadata only.
    SchemaOnly,
    /// Statements whose body is read as plain text, not as rows.
    NonQuery,
}

impl CommandShape {
    /// Row-limiting clause appended to the statement.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::SingleRow => " LIMIT 1",
            Self::SchemaOnly => " LIMIT 0",
            Self::Default | Self::NonQuery => "",
        }
    }

    /// Whether the `FORMAT` directive for the row decoder is appended.
    pub fn emits_format(self) -> bool {
        match self {
            Self::Default | Self::SingleRow | Self::SchemaOnly => true,
            Self::NonQuery => false,
        }
    }

    /// Appends the shape's suffix and format directive to `sql`.
    ///
    /// Trailing whitespace and semicolons are dropped first so the suffix
    /// lands inside the statement.
    pub fn apply(self, sql: &str) -> String {
        let base = sql.trim_end_matches(|c: char| c.is_whitespace() || c == ';');
        let mut out = String::with_capacity(base.len() + 48);
        out.push_str(base);
        out.push_str(self.suffix());
        if self.emits_format() {
            out.push_str(" FORMAT ");
            out.push_str(ROW_FORMAT);
        }
        out
    }
}
