//! Column type descriptors and the per-column value-hydration hook.
//!
//! [`ColumnType`] describes the PostgreSQL type of an own (non-relation)
//! column. The hydrator passes every returned JSON column value through
//! [`ColumnType::hydrate`], which normalizes driver output (date and
//! timestamp strings, UUID casing) into canonical form. Hydration is
//! idempotent: feeding a hydrated value back through the hook returns an
//! equal value.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use graphfetch_core::{FetchError, FetchResult};
use serde_json::Value as Json;

/// The PostgreSQL type of a non-relation column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ColumnType {
    /// BOOLEAN.
    Boolean,
    /// SMALLINT.
    SmallInt,
    /// INTEGER.
    Integer,
    /// BIGINT.
    BigInt,
    /// DOUBLE PRECISION.
    DoublePrecision,
    /// NUMERIC (rendered by `row_to_json` as a JSON number).
    Numeric,
    /// TEXT / VARCHAR.
    Text,
    /// DATE.
    Date,
    /// TIMESTAMP WITHOUT TIME ZONE.
    Timestamp,
    /// TIMESTAMP WITH TIME ZONE.
    TimestampTz,
    /// TIME WITHOUT TIME ZONE.
    Time,
    /// UUID.
    Uuid,
    /// JSON / JSONB.
    Json,
    /// BYTEA (rendered by `row_to_json` as a hex-escaped string).
    Bytea,
}

impl ColumnType {
    /// Returns the SQL column type name on PostgreSQL.
    pub const fn pg_type(&self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::SmallInt => "SMALLINT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::DoublePrecision => "DOUBLE PRECISION",
            Self::Numeric => "NUMERIC",
            Self::Text => "TEXT",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
            Self::TimestampTz => "TIMESTAMPTZ",
            Self::Time => "TIME",
            Self::Uuid => "UUID",
            Self::Json => "JSONB",
            Self::Bytea => "BYTEA",
        }
    }

    /// Passes one JSON column value through the driver hydration hook.
    ///
    /// Nulls pass through untouched. Temporal strings are parsed and
    /// re-emitted in canonical form; UUIDs are lowercased. All other types
    /// are returned as-is.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if a non-null value does not parse as the
    /// declared column type.
    pub fn hydrate(&self, value: Json) -> FetchResult<Json> {
        if value.is_null() {
            return Ok(value);
        }
        match self {
            Self::Date => {
                let s = expect_str(&value, "DATE")?;
                let d = NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|e| FetchError::DatabaseError(format!("Bad DATE '{s}': {e}")))?;
                Ok(Json::String(d.format("%Y-%m-%d").to_string()))
            }
            Self::Timestamp => {
                let s = expect_str(&value, "TIMESTAMP")?;
                let dt = parse_naive_datetime(s)?;
                Ok(Json::String(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            }
            Self::TimestampTz => {
                let s = expect_str(&value, "TIMESTAMPTZ")?;
                let dt = parse_datetime_tz(s)?;
                Ok(Json::String(
                    dt.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
                ))
            }
            Self::Time => {
                let s = expect_str(&value, "TIME")?;
                let t = NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                    .map_err(|e| FetchError::DatabaseError(format!("Bad TIME '{s}': {e}")))?;
                Ok(Json::String(t.format("%H:%M:%S%.f").to_string()))
            }
            Self::Uuid => {
                let s = expect_str(&value, "UUID")?;
                let u = uuid::Uuid::parse_str(s)
                    .map_err(|e| FetchError::DatabaseError(format!("Bad UUID '{s}': {e}")))?;
                Ok(Json::String(u.to_string()))
            }
            Self::Boolean
            | Self::SmallInt
            | Self::Integer
            | Self::BigInt
            | Self::DoublePrecision
            | Self::Numeric
            | Self::Text
            | Self::Json
            | Self::Bytea => Ok(value),
        }
    }
}

fn expect_str<'a>(value: &'a Json, ty: &str) -> FetchResult<&'a str> {
    value
        .as_str()
        .ok_or_else(|| FetchError::DatabaseError(format!("Expected {ty} string, got {value}")))
}

/// Parses a timestamp string in either ISO-8601 `T` form or the space-separated
/// form `row_to_json` emits for `timestamp without time zone`.
fn parse_naive_datetime(s: &str) -> FetchResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|e| FetchError::DatabaseError(format!("Bad TIMESTAMP '{s}': {e}")))
}

/// Parses a timestamptz string. PostgreSQL may emit a bare `+00` offset,
/// which RFC 3339 parsing rejects, so that form gets an explicit `:00`.
fn parse_datetime_tz(s: &str) -> FetchResult<DateTime<chrono::Utc>> {
    let candidate = if s.len() >= 3 && matches!(&s[s.len() - 3..s.len() - 2], "+" | "-") {
        format!("{s}:00")
    } else {
        s.to_string()
    };
    let normalized = candidate.replacen(' ', "T", 1);
    DateTime::parse_from_rfc3339(&normalized)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| FetchError::DatabaseError(format!("Bad TIMESTAMPTZ '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_passes_through() {
        assert_eq!(ColumnType::Date.hydrate(Json::Null).unwrap(), Json::Null);
    }

    #[test]
    fn test_scalar_passes_through() {
        assert_eq!(
            ColumnType::Integer.hydrate(Json::from(7)).unwrap(),
            Json::from(7)
        );
        assert_eq!(
            ColumnType::Boolean.hydrate(Json::from(false)).unwrap(),
            Json::from(false)
        );
    }

    #[test]
    fn test_date_normalizes() {
        let v = ColumnType::Date
            .hydrate(Json::from("2024-01-15"))
            .unwrap();
        assert_eq!(v, Json::from("2024-01-15"));
    }

    #[test]
    fn test_timestamp_space_form() {
        let v = ColumnType::Timestamp
            .hydrate(Json::from("2024-01-15 12:30:00.5"))
            .unwrap();
        assert_eq!(v, Json::from("2024-01-15T12:30:00.5"));
    }

    #[test]
    fn test_timestamptz_bare_offset() {
        let v = ColumnType::TimestampTz
            .hydrate(Json::from("2024-01-15T12:30:00+00"))
            .unwrap();
        assert_eq!(v, Json::from("2024-01-15T12:30:00Z"));
    }

    #[test]
    fn test_uuid_lowercases() {
        let v = ColumnType::Uuid
            .hydrate(Json::from("A0EEBC99-9C0B-4EF8-BB6D-6BB9BD380A11"))
            .unwrap();
        assert_eq!(v, Json::from("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11"));
    }

    #[test]
    fn test_hydrate_is_idempotent() {
        let cases = vec![
            (ColumnType::Date, Json::from("2024-01-15")),
            (ColumnType::Timestamp, Json::from("2024-01-15 12:30:00")),
            (ColumnType::TimestampTz, Json::from("2024-01-15T12:30:00+00")),
            (ColumnType::Time, Json::from("12:30:00")),
            (ColumnType::Uuid, Json::from("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11")),
            (ColumnType::Integer, Json::from(42)),
            (ColumnType::Text, Json::from("hello")),
        ];
        for (ty, raw) in cases {
            let once = ty.hydrate(raw).unwrap();
            let twice = ty.hydrate(once.clone()).unwrap();
            assert_eq!(once, twice, "{ty:?} hydration must be idempotent");
        }
    }

    #[test]
    fn test_bad_date_errors() {
        assert!(ColumnType::Date.hydrate(Json::from("not-a-date")).is_err());
    }

    #[test]
    fn test_pg_type() {
        assert_eq!(ColumnType::BigInt.pg_type(), "BIGINT");
        assert_eq!(ColumnType::Json.pg_type(), "JSONB");
    }
}
