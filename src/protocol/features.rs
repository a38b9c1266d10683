//! Capability flags derived from the server version.

use std::fmt;
use std::ops::BitOr;

use super::ServerVersion;

/// Immutable set of server capabilities.
///
/// Computed once from the version reported during the handshake and never
/// mutated afterwards.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeatureSet(u16);

impl FeatureSet {
    /// No capabilities.
    pub const NONE: Self = Self(0);

    /// Parameters can be sent as `param_<name>` query-string pairs.
    pub const HTTP_PARAMETERS: Self = Self(1 << 0);

    /// `Decimal(P, S)` with the full precision range.
    pub const DECIMALS: Self = Self(1 << 1);

    /// `DateTime64` with sub-second precision.
    pub const DATETIME64: Self = Self(1 << 2);

    /// `{name:Type}` placeholders inside the query body.
    pub const INLINE_QUERY: Self = Self(1 << 3);

    /// `IPv4` / `IPv6` column and parameter types.
    pub const IPV6: Self = Self(1 << 4);

    /// UUID values accepted as native parameters.
    pub const UUID_PARAMETERS: Self = Self(1 << 5);

    /// The `Map(K, V)` container type.
    pub const MAP_TYPE: Self = Self(1 << 6);

    /// The experimental `JSON` object type.
    pub const JSON_TYPE: Self = Self(1 << 7);

    /// The native `Bool` type.
    pub const BOOL_TYPE: Self = Self(1 << 8);

    /// The extended-range `Date32` type.
    pub const DATE32: Self = Self(1 << 9);

    /// Each flag is enabled when the server version is strictly greater
    /// than its threshold.
    const THRESHOLDS: [(Self, ServerVersion, &'static str); 10] = [
        (
            Self::HTTP_PARAMETERS,
            ServerVersion::new(19, 11, 3, 11),
            "http_parameters",
        ),
        (Self::DECIMALS, ServerVersion::new(20, 0, 0, 0), "decimals"),
        (
            Self::DATETIME64,
            ServerVersion::new(20, 1, 2, 4),
            "datetime64",
        ),
        (
            Self::INLINE_QUERY,
            ServerVersion::new(20, 5, 0, 0),
            "inline_query",
        ),
        (Self::IPV6, ServerVersion::new(21, 0, 0, 0), "ipv6"),
        (
            Self::UUID_PARAMETERS,
            ServerVersion::new(21, 1, 2, 0),
            "uuid_parameters",
        ),
        (Self::MAP_TYPE, ServerVersion::new(21, 1, 2, 0), "map"),
        (Self::JSON_TYPE, ServerVersion::new(21, 9, 0, 0), "json"),
        (Self::BOOL_TYPE, ServerVersion::new(21, 12, 0, 0), "bool"),
        (Self::DATE32, ServerVersion::new(22, 1, 0, 0), "date32"),
    ];

    /// Derives the capability set supported by the given server version.
    pub fn from_version(version: ServerVersion) -> Self {
        Self::THRESHOLDS
            .iter()
            .filter(|(_, threshold, _)| version > *threshold)
            .fold(Self::NONE, |acc, (flag, _, _)| acc | *flag)
    }

    /// Returns true if every flag in `other` is also set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Returns true if no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for FeatureSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::THRESHOLDS
            .iter()
            .filter(|(flag, _, _)| self.contains(*flag))
            .map(|(_, _, name)| *name)
            .collect();
        write!(f, "FeatureSet({})", names.join(" | "))
    }
}
