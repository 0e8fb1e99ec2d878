//! Built-in scalar codecs.

use crate::codec::{Codec, TypeCategory};
use crate::error::{CallerError, CallerResult};
use crate::models::SqlValue;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const TIMESTAMPTZ_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

/// 2^63: floats in `[-I64_LIMIT, I64_LIMIT)` fit an `i64` after truncation.
const I64_LIMIT: f64 = 9_223_372_036_854_775_808.0;

/// Codec for one scalar type, driven by its category.
///
/// Deserialization accepts the textual form a text-protocol driver returns
/// as well as values the driver already typed.
#[derive(Debug, Clone)]
pub struct ScalarCodec {
    name: String,
    category: TypeCategory,
}

impl ScalarCodec {
    pub fn new(name: impl Into<String>, category: TypeCategory) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }

    pub fn category(&self) -> TypeCategory {
        self.category
    }

    fn cast(&self, value: &SqlValue) -> CallerResult<SqlValue> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }
        if let SqlValue::Array(_) = value {
            return Err(self.mismatch(value));
        }
        match self.category {
            TypeCategory::Integer => self.cast_integer(value),
            TypeCategory::Float => self.cast_float(value),
            TypeCategory::Decimal => self.cast_decimal(value),
            TypeCategory::Boolean => self.cast_boolean(value),
            TypeCategory::Text => Ok(match value {
                SqlValue::Text(_) => value.clone(),
                other => SqlValue::Text(other.to_string()),
            }),
            TypeCategory::Binary => self.cast_binary(value),
            TypeCategory::Json => self.cast_json(value),
            TypeCategory::Uuid => self.cast_uuid(value),
            TypeCategory::Date => self.cast_date(value),
            TypeCategory::Timestamp => self.cast_timestamp(value),
            TypeCategory::TimestampTz => self.cast_timestamptz(value),
            TypeCategory::Unknown => Ok(value.clone()),
        }
    }

    fn mismatch(&self, value: &SqlValue) -> CallerError {
        CallerError::decode(
            &self.name,
            format!("unsupported {} value: {}", value.type_name(), value),
        )
    }

    fn invalid(&self, text: &str) -> CallerError {
        CallerError::decode(&self.name, format!("invalid input syntax: {text:?}"))
    }

    fn out_of_range(&self, value: &SqlValue) -> CallerError {
        CallerError::decode(&self.name, format!("value out of range: {value}"))
    }

    /// Bounds of the integer type this codec stands for.
    fn integer_range(&self) -> (i64, i64) {
        match self.name.as_str() {
            "smallint" => (i16::MIN.into(), i16::MAX.into()),
            "integer" => (i32::MIN.into(), i32::MAX.into()),
            _ => (i64::MIN, i64::MAX),
        }
    }

    fn cast_integer(&self, value: &SqlValue) -> CallerResult<SqlValue> {
        let int = match value {
            SqlValue::Int(v) => *v,
            SqlValue::Float(v) if v.is_finite() => {
                let truncated = v.trunc();
                if !(-I64_LIMIT..I64_LIMIT).contains(&truncated) {
                    return Err(self.out_of_range(value));
                }
                truncated as i64
            }
            SqlValue::Text(s) | SqlValue::Decimal(s) => {
                s.trim().parse().map_err(|_| self.invalid(s))?
            }
            other => return Err(self.mismatch(other)),
        };
        let (min, max) = self.integer_range();
        if (min..=max).contains(&int) {
            Ok(SqlValue::Int(int))
        } else {
            Err(self.out_of_range(value))
        }
    }

    fn cast_float(&self, value: &SqlValue) -> CallerResult<SqlValue> {
        match value {
            SqlValue::Float(_) => Ok(value.clone()),
            SqlValue::Int(v) => Ok(SqlValue::Float(*v as f64)),
            SqlValue::Text(s) | SqlValue::Decimal(s) => parse_float(s)
                .map(SqlValue::Float)
                .ok_or_else(|| self.invalid(s)),
            other => Err(self.mismatch(other)),
        }
    }

    fn cast_decimal(&self, value: &SqlValue) -> CallerResult<SqlValue> {
        match value {
            SqlValue::Decimal(_) => Ok(value.clone()),
            SqlValue::Int(v) => Ok(SqlValue::Decimal(v.to_string())),
            SqlValue::Float(v) if v.is_finite() => Ok(SqlValue::Decimal(v.to_string())),
            SqlValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.eq_ignore_ascii_case("NaN") || trimmed.parse::<f64>().is_ok() {
                    Ok(SqlValue::Decimal(trimmed.to_string()))
                } else {
                    Err(self.invalid(s))
                }
            }
            other => Err(self.mismatch(other)),
        }
    }

    fn cast_boolean(&self, value: &SqlValue) -> CallerResult<SqlValue> {
        match value {
            SqlValue::Bool(_) => Ok(value.clone()),
            SqlValue::Int(0) => Ok(SqlValue::Bool(false)),
            SqlValue::Int(1) => Ok(SqlValue::Bool(true)),
            SqlValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "t" | "true" | "1" | "y" | "yes" | "on" => Ok(SqlValue::Bool(true)),
                "f" | "false" | "0" | "n" | "no" | "off" => Ok(SqlValue::Bool(false)),
                _ => Err(self.invalid(s)),
            },
            other => Err(self.mismatch(other)),
        }
    }

    fn cast_binary(&self, value: &SqlValue) -> CallerResult<SqlValue> {
        match value {
            SqlValue::Bytes(_) => Ok(value.clone()),
            SqlValue::Text(s) => match s.strip_prefix("\\x") {
                Some(hex) => decode_hex(hex)
                    .map(SqlValue::Bytes)
                    .ok_or_else(|| self.invalid(s)),
                None => Ok(SqlValue::Bytes(s.as_bytes().to_vec())),
            },
            other => Err(self.mismatch(other)),
        }
    }

    fn cast_json(&self, value: &SqlValue) -> CallerResult<SqlValue> {
        match value {
            SqlValue::Json(_) => Ok(value.clone()),
            SqlValue::Text(s) => serde_json::from_str(s)
                .map(SqlValue::Json)
                .map_err(|e| CallerError::decode(&self.name, e.to_string())),
            other => Ok(SqlValue::Json(other.to_json())),
        }
    }

    fn cast_uuid(&self, value: &SqlValue) -> CallerResult<SqlValue> {
        match value {
            SqlValue::Uuid(_) => Ok(value.clone()),
            SqlValue::Text(s) => uuid::Uuid::parse_str(s.trim())
                .map(SqlValue::Uuid)
                .map_err(|e| CallerError::decode(&self.name, e.to_string())),
            other => Err(self.mismatch(other)),
        }
    }

    fn cast_date(&self, value: &SqlValue) -> CallerResult<SqlValue> {
        match value {
            SqlValue::Date(_) => Ok(value.clone()),
            SqlValue::Timestamp(v) => Ok(SqlValue::Date(v.date())),
            SqlValue::TimestampTz(v) => Ok(SqlValue::Date(v.date_naive())),
            SqlValue::Text(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                .map(SqlValue::Date)
                .map_err(|_| self.invalid(s)),
            other => Err(self.mismatch(other)),
        }
    }

    fn cast_timestamp(&self, value: &SqlValue) -> CallerResult<SqlValue> {
        match value {
            SqlValue::Timestamp(_) => Ok(value.clone()),
            SqlValue::TimestampTz(v) => Ok(SqlValue::Timestamp(v.naive_utc())),
            SqlValue::Date(v) => Ok(SqlValue::Timestamp(v.and_time(chrono::NaiveTime::MIN))),
            SqlValue::Text(s) => parse_timestamp(s.trim())
                .map(SqlValue::Timestamp)
                .ok_or_else(|| self.invalid(s)),
            other => Err(self.mismatch(other)),
        }
    }

    fn cast_timestamptz(&self, value: &SqlValue) -> CallerResult<SqlValue> {
        match value {
            SqlValue::TimestampTz(_) => Ok(value.clone()),
            SqlValue::Timestamp(v) => Ok(SqlValue::TimestampTz(v.and_utc())),
            SqlValue::Date(v) => Ok(SqlValue::TimestampTz(
                v.and_time(chrono::NaiveTime::MIN).and_utc(),
            )),
            SqlValue::Text(s) => parse_timestamptz(s.trim())
                .map(SqlValue::TimestampTz)
                .ok_or_else(|| self.invalid(s)),
            other => Err(self.mismatch(other)),
        }
    }
}

impl Codec for ScalarCodec {
    fn name(&self) -> &str {
        &self.name
    }

    fn deserialize(&self, raw: &SqlValue) -> CallerResult<SqlValue> {
        self.cast(raw)
    }

    fn serialize(&self, value: &SqlValue) -> CallerResult<SqlValue> {
        self.cast(value)
    }
}

fn parse_float(text: &str) -> Option<f64> {
    match text.trim() {
        "NaN" => Some(f64::NAN),
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        other => other.parse().ok(),
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, DATE_FORMAT)
                .ok()
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
}

fn parse_timestamptz(text: &str) -> Option<DateTime<Utc>> {
    TIMESTAMPTZ_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(text, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(text).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| parse_timestamp(text).map(|naive| naive.and_utc()))
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|idx| u8::from_str_radix(hex.get(idx..idx + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    fn codec(category: TypeCategory) -> ScalarCodec {
        ScalarCodec::new("test", category)
    }

    #[test]
    fn test_integer_from_text() {
        let c = codec(TypeCategory::Integer);
        assert_eq!(c.deserialize(&"42".into()).unwrap(), SqlValue::Int(42));
        assert_eq!(c.deserialize(&SqlValue::Int(7)).unwrap(), SqlValue::Int(7));
        assert!(matches!(
            c.deserialize(&"forty".into()),
            Err(CallerError::Decode { .. })
        ));
    }

    #[test]
    fn test_float_outside_i64_is_rejected() {
        let c = ScalarCodec::new("bigint", TypeCategory::Integer);
        assert_eq!(c.serialize(&SqlValue::Float(-2.9)).unwrap(), SqlValue::Int(-2));
        assert_eq!(
            c.serialize(&SqlValue::Float(-9_223_372_036_854_775_808.0)).unwrap(),
            SqlValue::Int(i64::MIN)
        );
        assert!(matches!(
            c.serialize(&SqlValue::Float(1e20)),
            Err(CallerError::Decode { .. })
        ));
        assert!(c.serialize(&SqlValue::Float(9_223_372_036_854_775_808.0)).is_err());
        assert!(c.serialize(&SqlValue::Float(f64::INFINITY)).is_err());
    }

    #[test]
    fn test_integer_widths_are_enforced() {
        let int4 = ScalarCodec::new("integer", TypeCategory::Integer);
        assert_eq!(
            int4.serialize(&SqlValue::Int(i64::from(i32::MAX))).unwrap(),
            SqlValue::Int(i64::from(i32::MAX))
        );
        assert!(int4.serialize(&SqlValue::Int(3_000_000_000)).is_err());
        assert!(int4.deserialize(&"-2147483649".into()).is_err());

        let int2 = ScalarCodec::new("smallint", TypeCategory::Integer);
        assert_eq!(int2.serialize(&SqlValue::Int(-32768)).unwrap(), SqlValue::Int(-32768));
        assert!(int2.serialize(&SqlValue::Int(40_000)).is_err());
        assert!(int2.serialize(&SqlValue::Float(32768.5)).is_err());
    }

    #[test]
    fn test_null_passes_every_codec() {
        for category in [
            TypeCategory::Integer,
            TypeCategory::Boolean,
            TypeCategory::Json,
            TypeCategory::TimestampTz,
        ] {
            assert_eq!(codec(category).deserialize(&SqlValue::Null).unwrap(), SqlValue::Null);
        }
    }

    #[test]
    fn test_boolean_text_forms() {
        let c = codec(TypeCategory::Boolean);
        assert_eq!(c.deserialize(&"t".into()).unwrap(), SqlValue::Bool(true));
        assert_eq!(c.deserialize(&"FALSE".into()).unwrap(), SqlValue::Bool(false));
        assert_eq!(c.deserialize(&SqlValue::Int(1)).unwrap(), SqlValue::Bool(true));
        assert!(c.deserialize(&"maybe".into()).is_err());
    }

    #[test]
    fn test_float_special_values() {
        let c = codec(TypeCategory::Float);
        assert_eq!(
            c.deserialize(&"Infinity".into()).unwrap(),
            SqlValue::Float(f64::INFINITY)
        );
        assert_eq!(c.deserialize(&"1.5".into()).unwrap(), SqlValue::Float(1.5));
    }

    #[test]
    fn test_decimal_keeps_text() {
        let c = codec(TypeCategory::Decimal);
        assert_eq!(
            c.deserialize(&"12.50".into()).unwrap(),
            SqlValue::Decimal("12.50".to_string())
        );
        assert!(c.deserialize(&"12,50".into()).is_err());
    }

    #[test]
    fn test_binary_hex_text() {
        let c = codec(TypeCategory::Binary);
        assert_eq!(
            c.deserialize(&"\\x0aff".into()).unwrap(),
            SqlValue::Bytes(vec![0x0a, 0xff])
        );
        assert!(c.deserialize(&"\\x0".into()).is_err());
    }

    #[test]
    fn test_json_from_text() {
        let c = codec(TypeCategory::Json);
        assert_eq!(
            c.deserialize(&r#"{"a":[1,2]}"#.into()).unwrap(),
            SqlValue::Json(serde_json::json!({"a": [1, 2]}))
        );
    }

    #[test]
    fn test_timestamp_text_forms() {
        let c = codec(TypeCategory::Timestamp);
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_time(NaiveTime::from_hms_milli_opt(10, 30, 0, 250).unwrap());
        assert_eq!(
            c.deserialize(&"2024-03-01 10:30:00.25".into()).unwrap(),
            SqlValue::Timestamp(expected)
        );
    }

    #[test]
    fn test_timestamptz_with_short_offset() {
        let c = codec(TypeCategory::TimestampTz);
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(
            c.deserialize(&"2024-03-01 10:00:00+02".into()).unwrap(),
            SqlValue::TimestampTz(expected)
        );
    }

    #[test]
    fn test_scalar_rejects_arrays() {
        let c = codec(TypeCategory::Integer);
        assert!(c.deserialize(&SqlValue::Array(vec![])).is_err());
    }

    #[test]
    fn test_unknown_is_identity() {
        let c = codec(TypeCategory::Unknown);
        let raw = SqlValue::Text("(1,2)".to_string());
        assert_eq!(c.deserialize(&raw).unwrap(), raw);
    }

    #[test]
    fn test_encode_uses_wire_form() {
        assert_eq!(codec(TypeCategory::Boolean).encode(&"yes".into()).unwrap(), "t");
        assert_eq!(codec(TypeCategory::Integer).encode(&SqlValue::Null).unwrap(), "NULL");
        assert!(codec(TypeCategory::Integer).encode(&"x".into()).is_err());
    }
}
