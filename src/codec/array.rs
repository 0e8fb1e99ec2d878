//! PostgreSQL array codec and text literal format.
//!
//! Literals follow the server's `array_out` rules: an element is
//! double-quoted when it is empty, spells `NULL`, or contains whitespace,
//! braces, commas, quotes or backslashes. Quotes and backslashes inside a
//! quoted element are backslash-escaped.

use crate::codec::Codec;
use crate::error::{CallerError, CallerResult};
use crate::models::SqlValue;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;

/// Array variant of an element codec.
#[derive(Debug, Clone)]
pub struct ArrayCodec {
    name: String,
    element: Arc<dyn Codec>,
}

impl ArrayCodec {
    pub fn new(element: Arc<dyn Codec>) -> Self {
        Self {
            name: format!("{}[]", element.name()),
            element,
        }
    }

    pub fn element(&self) -> &Arc<dyn Codec> {
        &self.element
    }

    /// Serialize application values into the array representation.
    pub fn serialize_array(&self, values: &[SqlValue]) -> CallerResult<ArrayData> {
        let values = values
            .iter()
            .map(|v| self.serialize_element(v))
            .collect::<CallerResult<Vec<_>>>()?;
        Ok(ArrayData {
            element_type: self.element.name().to_string(),
            values,
        })
    }

    fn serialize_element(&self, value: &SqlValue) -> CallerResult<SqlValue> {
        match value {
            SqlValue::Array(items) => items
                .iter()
                .map(|v| self.serialize_element(v))
                .collect::<CallerResult<Vec<_>>>()
                .map(SqlValue::Array),
            other => self.element.serialize(other),
        }
    }

    fn deserialize_element(&self, value: &SqlValue) -> CallerResult<SqlValue> {
        match value {
            SqlValue::Array(items) => items
                .iter()
                .map(|v| self.deserialize_element(v))
                .collect::<CallerResult<Vec<_>>>()
                .map(SqlValue::Array),
            other => self.element.deserialize(other),
        }
    }
}

impl Codec for ArrayCodec {
    fn name(&self) -> &str {
        &self.name
    }

    fn deserialize(&self, raw: &SqlValue) -> CallerResult<SqlValue> {
        match raw {
            SqlValue::Null => Ok(SqlValue::Null),
            SqlValue::Array(_) => self.deserialize_element(raw),
            SqlValue::Text(literal) => {
                let items = parse_array_literal(literal)?;
                self.deserialize_element(&SqlValue::Array(items))
            }
            other => Err(CallerError::decode(
                &self.name,
                format!("expected an array, got {}", other.type_name()),
            )),
        }
    }

    fn serialize(&self, value: &SqlValue) -> CallerResult<SqlValue> {
        match value {
            SqlValue::Null => Ok(SqlValue::Null),
            SqlValue::Array(items) => Ok(SqlValue::Array(self.serialize_array(items)?.values)),
            other => Err(CallerError::decode(
                &self.name,
                format!("expected an array, got {}", other.type_name()),
            )),
        }
    }
}

/// Serialized array values, ready to be encoded as a literal.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayData {
    element_type: String,
    values: Vec<SqlValue>,
}

impl ArrayData {
    pub fn element_type(&self) -> &str {
        &self.element_type
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Render the `{...}` text literal.
    pub fn encode(&self) -> String {
        encode_array_literal(&self.values)
    }
}

/// Render values as a PostgreSQL array literal.
pub fn encode_array_literal(values: &[SqlValue]) -> String {
    let mut out = String::from("{");
    for (idx, value) in values.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        match value {
            SqlValue::Null => out.push_str("NULL"),
            SqlValue::Array(items) => out.push_str(&encode_array_literal(items)),
            other => push_element(&mut out, &encode_text(other)),
        }
    }
    out.push('}');
    out
}

fn push_element(out: &mut String, text: &str) {
    if !needs_quotes(text) {
        out.push_str(text);
        return;
    }
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

fn needs_quotes(text: &str) -> bool {
    text.is_empty()
        || text.eq_ignore_ascii_case("NULL")
        || text
            .chars()
            .any(|c| matches!(c, '{' | '}' | ',' | '"' | '\\') || c.is_whitespace())
}

/// Text wire form of a single non-null value.
pub fn encode_text(value: &SqlValue) -> String {
    match value {
        SqlValue::Bool(true) => "t".to_string(),
        SqlValue::Bool(false) => "f".to_string(),
        SqlValue::Float(v) if v.is_nan() => "NaN".to_string(),
        SqlValue::Float(v) if v.is_infinite() => {
            let text = if *v > 0.0 { "Infinity" } else { "-Infinity" };
            text.to_string()
        }
        SqlValue::Timestamp(v) => v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        SqlValue::TimestampTz(v) => v.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string(),
        SqlValue::Array(items) => encode_array_literal(items),
        other => other.to_string(),
    }
}

/// Parse a PostgreSQL array literal into text, null and nested array elements.
pub fn parse_array_literal(literal: &str) -> CallerResult<Vec<SqlValue>> {
    let trimmed = literal.trim();
    // Skip an explicit dimension decoration such as "[1:3]={...}"
    let body = match trimmed.find('=') {
        Some(idx) if trimmed.starts_with('[') => trimmed[idx + 1..].trim_start(),
        _ => trimmed,
    };

    let mut chars = body.chars().peekable();
    let items = parse_level(&mut chars, literal)?;
    if chars.any(|c| !c.is_whitespace()) {
        return Err(malformed(literal, "unexpected characters after array end"));
    }
    Ok(items)
}

fn parse_level(chars: &mut Peekable<Chars<'_>>, literal: &str) -> CallerResult<Vec<SqlValue>> {
    if chars.next() != Some('{') {
        return Err(malformed(literal, "missing '{'"));
    }
    let mut items = Vec::new();
    skip_whitespace(chars);
    if chars.peek() == Some(&'}') {
        chars.next();
        return Ok(items);
    }

    loop {
        skip_whitespace(chars);
        match chars.peek() {
            Some('{') => items.push(SqlValue::Array(parse_level(chars, literal)?)),
            Some('"') => {
                chars.next();
                items.push(SqlValue::Text(parse_quoted(chars, literal)?));
            }
            Some(_) => {
                let mut raw = String::new();
                while let Some(&c) = chars.peek() {
                    if c == ',' || c == '}' {
                        break;
                    }
                    raw.push(c);
                    chars.next();
                }
                let raw = raw.trim();
                if raw.is_empty() {
                    return Err(malformed(literal, "empty element"));
                }
                items.push(if raw.eq_ignore_ascii_case("NULL") {
                    SqlValue::Null
                } else {
                    SqlValue::Text(raw.to_string())
                });
            }
            None => return Err(malformed(literal, "unterminated array")),
        }
        skip_whitespace(chars);
        match chars.next() {
            Some(',') => continue,
            Some('}') => return Ok(items),
            _ => return Err(malformed(literal, "expected ',' or '}'")),
        }
    }
}

fn parse_quoted(chars: &mut Peekable<Chars<'_>>, literal: &str) -> CallerResult<String> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('\\') => match chars.next() {
                Some(c) => out.push(c),
                None => return Err(malformed(literal, "dangling escape")),
            },
            Some('"') => return Ok(out),
            Some(c) => out.push(c),
            None => return Err(malformed(literal, "unterminated quoted element")),
        }
    }
}

fn skip_whitespace(chars: &mut Peekable<Chars<'_>>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn malformed(literal: &str, reason: &str) -> CallerError {
    CallerError::decode("array", format!("malformed array literal {literal:?}: {reason}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{ScalarCodec, TypeCategory};
    use rand::Rng;

    fn integer_array() -> ArrayCodec {
        ArrayCodec::new(Arc::new(ScalarCodec::new("integer", TypeCategory::Integer)))
    }

    fn text_array() -> ArrayCodec {
        ArrayCodec::new(Arc::new(ScalarCodec::new("text", TypeCategory::Text)))
    }

    #[test]
    fn test_encode_integers() {
        let data = integer_array()
            .serialize_array(&[1.into(), 2.into(), 3.into()])
            .unwrap();
        assert_eq!(data.encode(), "{1,2,3}");
        assert_eq!(data.element_type(), "integer");
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(integer_array().serialize_array(&[]).unwrap().encode(), "{}");
    }

    #[test]
    fn test_encode_casts_elements() {
        let data = integer_array()
            .serialize_array(&["7".into(), SqlValue::Null])
            .unwrap();
        assert_eq!(data.encode(), "{7,NULL}");
        assert!(integer_array().serialize_array(&["x".into()]).is_err());
    }

    #[test]
    fn test_encode_quotes_special_text() {
        let data = text_array()
            .serialize_array(&[
                "plain".into(),
                "with space".into(),
                "".into(),
                "null".into(),
                r#"say "hi""#.into(),
                r"back\slash".into(),
                "a,b".into(),
            ])
            .unwrap();
        assert_eq!(
            data.encode(),
            r#"{plain,"with space","","null","say \"hi\"","back\\slash","a,b"}"#
        );
    }

    #[test]
    fn test_encode_nested_and_booleans() {
        let nested = encode_array_literal(&[
            SqlValue::Array(vec![1.into(), 2.into()]),
            SqlValue::Array(vec![3.into(), 4.into()]),
        ]);
        assert_eq!(nested, "{{1,2},{3,4}}");
        assert_eq!(encode_array_literal(&[true.into(), false.into()]), "{t,f}");
    }

    #[test]
    fn test_parse_literal() {
        let parsed = parse_array_literal(r#"{1, "two words",NULL,"NULL",{3}}"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                SqlValue::Text("1".to_string()),
                SqlValue::Text("two words".to_string()),
                SqlValue::Null,
                SqlValue::Text("NULL".to_string()),
                SqlValue::Array(vec![SqlValue::Text("3".to_string())]),
            ]
        );
        assert_eq!(parse_array_literal("[0:1]={5,6}").unwrap().len(), 2);
        assert!(parse_array_literal("{1,2").is_err());
        assert!(parse_array_literal("{1,,2}").is_err());
        assert!(parse_array_literal("{1} x").is_err());
    }

    #[test]
    fn test_deserialize_array_column() {
        let value = integer_array()
            .deserialize(&SqlValue::Text("{1,NULL,3}".to_string()))
            .unwrap();
        assert_eq!(
            value,
            SqlValue::Array(vec![SqlValue::Int(1), SqlValue::Null, SqlValue::Int(3)])
        );
        assert!(integer_array().deserialize(&SqlValue::Int(1)).is_err());
    }

    #[test]
    fn test_random_text_survives_literal_quoting() {
        let alphabet: Vec<char> = "ab {},\"\\\tN U L".chars().collect();
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let len = rng.gen_range(0..8);
            let text: String = (0..len)
                .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
                .collect();
            let literal = encode_array_literal(&[SqlValue::Text(text.clone())]);
            let parsed = parse_array_literal(&literal).unwrap();
            assert_eq!(parsed, vec![SqlValue::Text(text)], "literal {literal}");
        }
    }
}
