//! Positional bind substitution.
//!
//! Replaces each `?` placeholder in a SQL template with the quoted literal
//! of the matching bind value. Placeholders inside single-quoted literals
//! and double-quoted identifiers are left untouched.

use crate::codec::encode_array_literal;
use crate::error::{CallerError, CallerResult};
use crate::models::SqlValue;

/// Substitute `binds` into the `?` placeholders of `sql`.
pub fn sanitize_sql_array(sql: &str, binds: &[SqlValue]) -> CallerResult<String> {
    let positions = placeholder_positions(sql);
    if positions.len() != binds.len() {
        return Err(CallerError::BindArity {
            expected: positions.len(),
            given: binds.len(),
        });
    }

    let mut out = String::with_capacity(sql.len() + binds.len() * 8);
    let mut last = 0;
    for (pos, bind) in positions.iter().zip(binds) {
        out.push_str(&sql[last..*pos]);
        out.push_str(&quote_bound_value(bind));
        last = pos + 1;
    }
    out.push_str(&sql[last..]);
    Ok(out)
}

/// Quote a bind value. Arrays expand to a comma-separated list so they can
/// fill an `IN (?)` clause; an empty array becomes `NULL`.
pub fn quote_bound_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Array(items) if items.is_empty() => "NULL".to_string(),
        SqlValue::Array(items) => items.iter().map(quote).collect::<Vec<_>>().join(","),
        other => quote(other),
    }
}

/// Render a value as a SQL literal.
pub fn quote(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(true) => "TRUE".to_string(),
        SqlValue::Bool(false) => "FALSE".to_string(),
        SqlValue::Int(v) => v.to_string(),
        SqlValue::Float(v) if v.is_finite() => v.to_string(),
        SqlValue::Float(v) if v.is_nan() => "'NaN'".to_string(),
        SqlValue::Float(v) if *v > 0.0 => "'Infinity'".to_string(),
        SqlValue::Float(_) => "'-Infinity'".to_string(),
        SqlValue::Decimal(v) if is_numeric_literal(v) => v.clone(),
        SqlValue::Decimal(v) => quote_string(v),
        SqlValue::Text(v) => quote_string(v),
        SqlValue::Bytes(_) | SqlValue::Uuid(_) | SqlValue::Date(_) => {
            quote_string(&value.to_string())
        }
        SqlValue::Json(v) => quote_string(&v.to_string()),
        SqlValue::Timestamp(v) => quote_string(&v.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        SqlValue::TimestampTz(v) => {
            quote_string(&v.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string())
        }
        SqlValue::Array(items) => quote_string(&encode_array_literal(items)),
    }
}

fn quote_string(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// `[+-]digits[.digits][e[+-]digits]`, with at least one mantissa digit.
fn is_numeric_literal(text: &str) -> bool {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, Some(exponent)),
        None => (unsigned, None),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    let mantissa_ok = !(whole.is_empty() && fraction.is_empty()) && digits(whole) && digits(fraction);
    let exponent_ok = exponent.is_none_or(|exp| {
        let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
        !exp.is_empty() && digits(exp)
    });
    mantissa_ok && exponent_ok
}

/// Byte offsets of the `?` placeholders outside quoted sections.
fn placeholder_positions(sql: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut in_literal = false;
    let mut in_identifier = false;
    for (idx, c) in sql.char_indices() {
        match c {
            '\'' if !in_identifier => in_literal = !in_literal,
            '"' if !in_literal => in_identifier = !in_identifier,
            '?' if !in_literal && !in_identifier => positions.push(idx),
            _ => {}
        }
    }
    positions
}
