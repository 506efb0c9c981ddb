use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::ValidationError;

/// Wall-clock instant pinned to UTC, written as RFC3339 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Parses an RFC3339 string. Offsets other than `Z`/`+00:00` are rejected.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        OffsetDateTime::parse(input, &Rfc3339)
            .ok()
            .filter(|value| value.offset() == UtcOffset::UTC)
            .map(Self)
            .ok_or_else(|| ValidationError::TimestampNotUtc {
                value: input.to_owned(),
            })
    }

    /// Out-of-range values collapse to the Unix epoch.
    pub fn from_unix_millis(millis: i64) -> Self {
        let nanos = i128::from(millis).saturating_mul(1_000_000);
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map(Self)
            .unwrap_or(Self(OffsetDateTime::UNIX_EPOCH))
    }

    pub fn unix_millis(self) -> i64 {
        i64::try_from(self.0.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
    }

    /// Time from `self` to `later`, floored at zero.
    pub fn elapsed_until(self, later: Self) -> Duration {
        (later.0 - self.0).max(Duration::ZERO)
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.0.unix_timestamp().to_string())
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl TryFrom<String> for UtcDateTime {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<UtcDateTime> for String {
    fn from(value: UtcDateTime) -> Self {
        value.format_rfc3339()
    }
}
