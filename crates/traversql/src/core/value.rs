//! Column values as they flow from the store to the statement generator.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A single column value.
///
/// Produced by a [`SourcePool`](crate::source::SourcePool) when decoding rows and
/// consumed by the statement generator, which matches over every variant.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 16-bit signed integer (smallint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real/float4).
    F32(f32),

    /// 64-bit floating point (double precision/float8).
    F64(f64),

    /// Arbitrary precision numeric.
    Decimal(Decimal),

    /// Text data, including columns cast to text on select.
    Text(String),

    /// Binary data (bytea).
    Bytes(Vec<u8>),

    /// UUID value.
    Uuid(Uuid),

    /// Date without time component.
    Date(NaiveDate),

    /// Time of day without zone.
    Time(NaiveTime),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// Structured JSON document (mapping or sequence).
    Json(serde_json::Value),

    /// Value of a type the decoder does not recognise, kept as its text form.
    Unknown(String),
}

impl SqlValue {
    /// Parse a user-supplied key value: integers become `I64`, anything else stays text.
    pub fn parse_key(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(n) => SqlValue::I64(n),
            Err(_) => SqlValue::Text(raw.to_string()),
        }
    }

    /// Build a value from the text form PostgreSQL prints for `data_type`
    /// (ISO `DateStyle`).
    ///
    /// Numeric and temporal values that have no typed representation, such
    /// as `NaN`, `infinity` or numerics past 28 significant digits, are kept
    /// verbatim as [`SqlValue::Unknown`].
    pub fn from_pg_text(data_type: &str, text: String) -> Self {
        let parsed = match data_type.trim().to_lowercase().as_str() {
            "numeric" | "decimal" => Decimal::from_str_exact(&text).ok().map(SqlValue::Decimal),
            "date" => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .ok()
                .map(SqlValue::Date),
            "timestamp" | "timestamp without time zone" => {
                NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f")
                    .ok()
                    .map(SqlValue::DateTime)
            }
            "timestamptz" | "timestamp with time zone" => {
                DateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S%.f%#z")
                    .ok()
                    .map(SqlValue::DateTimeOffset)
            }
            _ => return SqlValue::Text(text),
        };
        parsed.unwrap_or(SqlValue::Unknown(text))
    }

    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Integer view of the value, for any integer width.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I16(v) => Some(i64::from(*v)),
            SqlValue::I32(v) => Some(i64::from(*v)),
            SqlValue::I64(v) => Some(*v),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// The value as PostgreSQL would print it for `value::text`.
    ///
    /// Returns `None` for NULL.
    pub fn to_text(&self) -> Option<String> {
        let text = match self {
            SqlValue::Null => return None,
            SqlValue::Bool(v) => v.to_string(),
            SqlValue::I16(v) => v.to_string(),
            SqlValue::I32(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F32(v) => v.to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Text(v) | SqlValue::Unknown(v) => v.clone(),
            SqlValue::Bytes(v) => format!("\\x{}", hex::encode(v)),
            SqlValue::Uuid(v) => v.hyphenated().to_string(),
            SqlValue::Date(v) => v.format("%Y-%m-%d").to_string(),
            SqlValue::Time(v) => v.format("%H:%M:%S%.f").to_string(),
            SqlValue::DateTime(v) => v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            SqlValue::DateTimeOffset(v) => v.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            SqlValue::Json(v) => v.to_string(),
        };
        Some(text)
    }

    /// Normalised form used for key comparison and ledgers.
    pub fn key_part(&self) -> KeyPart {
        match self {
            SqlValue::Null => KeyPart::Null,
            SqlValue::I16(_) | SqlValue::I32(_) | SqlValue::I64(_) => {
                KeyPart::Int(self.as_i64().unwrap_or_default())
            }
            SqlValue::Text(s) => KeyPart::Text(s.clone()),
            other => KeyPart::Text(other.to_text().unwrap_or_default()),
        }
    }

    /// Value equality where floats compare bitwise, so NaN equals itself.
    pub fn same_as(&self, other: &SqlValue) -> bool {
        match (self, other) {
            (SqlValue::F32(a), SqlValue::F32(b)) => a.to_bits() == b.to_bits(),
            (SqlValue::F64(a), SqlValue::F64(b)) => a.to_bits() == b.to_bits(),
            (a, b) => a == b,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::I16(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Hashable, width-independent form of a key value.
///
/// Integers of every width collapse to `Int` so a key read from an `int4`
/// column matches the same key typed on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Null,
    Int(i64),
    Text(String),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Null => f.write_str("NULL"),
            KeyPart::Int(n) => write!(f, "{}", n),
            KeyPart::Text(s) => write!(f, "{:?}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_key() {
        assert_eq!(SqlValue::parse_key("42"), SqlValue::I64(42));
        assert_eq!(SqlValue::parse_key("-7"), SqlValue::I64(-7));
        assert_eq!(SqlValue::parse_key("abc"), SqlValue::Text("abc".into()));
        assert_eq!(SqlValue::parse_key("4.5"), SqlValue::Text("4.5".into()));
    }

    #[test]
    fn test_key_part_normalises_integer_widths() {
        assert_eq!(SqlValue::I16(3).key_part(), SqlValue::I64(3).key_part());
        assert_eq!(SqlValue::I32(3).key_part(), KeyPart::Int(3));
        assert_ne!(SqlValue::I32(3).key_part(), SqlValue::Text("3".into()).key_part());
        assert_eq!(SqlValue::Null.key_part(), KeyPart::Null);
    }

    #[test]
    fn test_to_text() {
        let id = Uuid::nil();
        assert_eq!(
            SqlValue::Uuid(id).to_text().as_deref(),
            Some("00000000-0000-0000-0000-000000000000")
        );
        assert_eq!(SqlValue::Bytes(vec![0xde, 0xad]).to_text().as_deref(), Some("\\xdead"));
        assert_eq!(SqlValue::Null.to_text(), None);
        assert_eq!(
            SqlValue::Json(serde_json::json!({"a": 1})).to_text().as_deref(),
            Some(r#"{"a":1}"#)
        );
    }

    #[test]
    fn test_same_as_handles_nan() {
        assert!(SqlValue::F64(f64::NAN).same_as(&SqlValue::F64(f64::NAN)));
        assert!(!SqlValue::F64(1.0).same_as(&SqlValue::F64(2.0)));
        assert!(SqlValue::Text("a".into()).same_as(&SqlValue::Text("a".into())));
    }

    #[test]
    fn test_from_pg_text_numeric() {
        assert_eq!(
            SqlValue::from_pg_text("numeric", "99.99".into()),
            SqlValue::Decimal(Decimal::new(9999, 2))
        );
        assert_eq!(
            SqlValue::from_pg_text("numeric", "NaN".into()),
            SqlValue::Unknown("NaN".into())
        );
        let wide = format!("1{}", "0".repeat(40));
        assert_eq!(
            SqlValue::from_pg_text("numeric", wide.clone()),
            SqlValue::Unknown(wide)
        );
        assert_eq!(
            SqlValue::from_pg_text("decimal", "0.12345678901234567890123456789".into()),
            SqlValue::Unknown("0.12345678901234567890123456789".into())
        );
    }

    #[test]
    fn test_from_pg_text_temporal() {
        assert_eq!(
            SqlValue::from_pg_text("date", "2024-02-29".into()),
            SqlValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert_eq!(
            SqlValue::from_pg_text("date", "infinity".into()),
            SqlValue::Unknown("infinity".into())
        );
        assert_eq!(
            SqlValue::from_pg_text("timestamp without time zone", "-infinity".into()),
            SqlValue::Unknown("-infinity".into())
        );
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_milli_opt(3, 4, 5, 250)
            .unwrap();
        assert_eq!(
            SqlValue::from_pg_text("timestamp", "2024-01-02 03:04:05.25".into()),
            SqlValue::DateTime(ts)
        );
        match SqlValue::from_pg_text("timestamptz", "2024-01-02 03:04:05+02".into()) {
            SqlValue::DateTimeOffset(v) => {
                assert_eq!(v.offset().local_minus_utc(), 7200);
                assert_eq!(v.naive_local(), ts.with_nanosecond(0).unwrap());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            SqlValue::from_pg_text("timestamptz", "infinity".into()),
            SqlValue::Unknown("infinity".into())
        );
    }

    #[test]
    fn test_from_pg_text_other_types_stay_text() {
        assert_eq!(
            SqlValue::from_pg_text("uuid", "nope".into()),
            SqlValue::Text("nope".into())
        );
    }

    #[test]
    fn test_from_option() {
        let v: SqlValue = Option::<i32>::None.into();
        assert!(v.is_null());
        let v: SqlValue = Some(5i32).into();
        assert_eq!(v, SqlValue::I32(5));
    }
}
