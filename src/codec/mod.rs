//! Typed conversion between raw database values and application values.
//!
//! # Architecture
//!
//! Conversion uses a two-phase approach:
//! 1. a type name (from column metadata or the caller) is normalized and
//!    resolved to a codec through a [`TypeRegistry`]
//! 2. the codec deserializes raw values, or serializes application values,
//!    for that one type
//!
//! Array types wrap their element codec in an [`ArrayCodec`], which also
//! renders the `{...}` literal used to bind arrays.

pub mod array;
pub mod category;
pub mod registry;
pub mod scalar;

pub use array::{ArrayCodec, ArrayData, encode_array_literal, encode_text, parse_array_literal};
pub use category::{TypeCategory, categorize_type, normalize_type_name};
pub use registry::TypeRegistry;
pub use scalar::ScalarCodec;

use crate::error::CallerResult;
use crate::models::SqlValue;
use std::fmt;

/// Converts values of one database type.
pub trait Codec: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Convert a raw value as returned by the driver.
    fn deserialize(&self, raw: &SqlValue) -> CallerResult<SqlValue>;

    /// Convert an application value into the form stored for this type.
    fn serialize(&self, value: &SqlValue) -> CallerResult<SqlValue>;

    /// Text wire form of one value of this type.
    fn encode(&self, value: &SqlValue) -> CallerResult<String> {
        Ok(match self.serialize(value)? {
            SqlValue::Null => "NULL".to_string(),
            serialized => encode_text(&serialized),
        })
    }
}
