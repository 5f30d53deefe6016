use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::ValidationError;

/// Timezone-naive point in time with microsecond resolution.
///
/// This is the time key of every stored metric row. Offsets supplied by
/// callers are normalised to UTC and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(PrimitiveDateTime);

impl Timestamp {
    /// Parse one of the accepted textual forms.
    ///
    /// Accepted: `YYYY-MM-DD`, `YYYYMMDD`, `YYYY/MM/DD`, `YYYY-MM-DD HH:MM[:SS[.f]]`
    /// (space or `T` separator) and RFC 3339 with an offset.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        let invalid = || ValidationError::InvalidTimestamp {
            value: input.to_owned(),
        };
        if trimmed.is_empty() {
            return Err(invalid());
        }

        if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
            let utc = parsed.to_offset(UtcOffset::UTC);
            return Ok(Self::from_primitive(PrimitiveDateTime::new(
                utc.date(),
                utc.time(),
            )));
        }

        if trimmed.len() == 8 && trimmed.bytes().all(|byte| byte.is_ascii_digit()) {
            return parse_compact_date(trimmed).map(Self::from_date).ok_or_else(invalid);
        }

        if trimmed.len() == 10 {
            let dashed = trimmed.replace('/', "-");
            return Date::parse(&dashed, format_description!("[year]-[month]-[day]"))
                .map(Self::from_date)
                .map_err(|_| invalid());
        }

        let mut normalized = trimmed.replace('/', "-");
        if normalized.as_bytes().get(10) == Some(&b'T') {
            normalized.replace_range(10..11, " ");
        }
        PrimitiveDateTime::parse(
            &normalized,
            format_description!(
                "[year]-[month]-[day] [hour]:[minute][optional [:[second][optional [.[subsecond]]]]]"
            ),
        )
        .map(Self::from_primitive)
        .map_err(|_| invalid())
    }

    /// Midnight of the given calendar date.
    pub fn from_date(date: Date) -> Self {
        Self(PrimitiveDateTime::new(date, Time::MIDNIGHT))
    }

    /// Wrap a primitive date-time, truncating to microseconds.
    pub fn from_primitive(value: PrimitiveDateTime) -> Self {
        let micros = value.nanosecond() / 1_000 * 1_000;
        Self(value.replace_nanosecond(micros).unwrap_or(value))
    }

    pub fn date(self) -> Date {
        self.0.date()
    }

    pub fn hour(self) -> u8 {
        self.0.hour()
    }

    /// Signed distance from `earlier` to `self`.
    pub fn duration_since(self, earlier: Self) -> Duration {
        self.0 - earlier.0
    }

    /// Canonical text form used on the database boundary and in output:
    /// `YYYY-MM-DD HH:MM:SS` with `.ffffff` appended when sub-second parts exist.
    pub fn to_sql_string(self) -> String {
        let base = self
            .0
            .format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second]"
            ))
            .unwrap_or_else(|_| String::from("<unformattable>"));
        let micros = self.0.microsecond();
        if micros == 0 {
            base
        } else {
            format!("{base}.{micros:06}")
        }
    }
}

fn parse_compact_date(digits: &str) -> Option<Date> {
    let year: i32 = digits.get(0..4)?.parse().ok()?;
    let month: u8 = digits.get(4..6)?.parse().ok()?;
    let day: u8 = digits.get(6..8)?.parse().ok()?;
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_sql_string())
    }
}

impl TryFrom<&str> for Timestamp {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_sql_string())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}
