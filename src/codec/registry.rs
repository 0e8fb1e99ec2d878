//! Type name to codec registry.

use crate::codec::{ArrayCodec, Codec, ScalarCodec, TypeCategory, normalize_type_name};
use crate::error::{CallerError, CallerResult};
use crate::models::ColumnType;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

static GLOBAL_REGISTRY: OnceLock<Arc<TypeRegistry>> = OnceLock::new();

/// Canonical PostgreSQL type names and their categories.
const POSTGRES_TYPES: &[(&str, TypeCategory)] = &[
    ("integer", TypeCategory::Integer),
    ("bigint", TypeCategory::Integer),
    ("smallint", TypeCategory::Integer),
    ("decimal", TypeCategory::Decimal),
    ("real", TypeCategory::Float),
    ("double", TypeCategory::Float),
    ("boolean", TypeCategory::Boolean),
    ("text", TypeCategory::Text),
    ("char", TypeCategory::Text),
    ("time", TypeCategory::Text),
    ("binary", TypeCategory::Binary),
    ("json", TypeCategory::Json),
    ("uuid", TypeCategory::Uuid),
    ("date", TypeCategory::Date),
    ("timestamp", TypeCategory::Timestamp),
    ("timestamptz", TypeCategory::TimestampTz),
];

/// Maps type names to codecs. Names are normalized on registration and
/// lookup, so `int4`, `INTEGER` and `integer` share one codec.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    codecs: HashMap<String, Arc<dyn Codec>>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in PostgreSQL scalar types.
    pub fn postgres() -> Self {
        let mut registry = Self::new();
        for (name, category) in POSTGRES_TYPES {
            registry.register(name, Arc::new(ScalarCodec::new(*name, *category)));
        }
        registry
    }

    /// Process-wide default registry, built on first use.
    pub fn global() -> Arc<TypeRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(TypeRegistry::postgres()))
            .clone()
    }

    /// Register (or replace) the codec for a type name.
    pub fn register(&mut self, name: &str, codec: Arc<dyn Codec>) {
        self.codecs.insert(normalize_type_name(name), codec);
    }

    pub fn with_codec(mut self, name: &str, codec: Arc<dyn Codec>) -> Self {
        self.register(name, codec);
        self
    }

    /// Look up a codec by name. `integer[]` and `_int4` resolve to array codecs.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Codec>> {
        self.lookup_column(&ColumnType::parse(name))
    }

    /// Resolve the codec for a declared column type.
    pub fn lookup_column(&self, column_type: &ColumnType) -> Option<Arc<dyn Codec>> {
        let element = self.codecs.get(&normalize_type_name(&column_type.name))?;
        if column_type.array {
            Some(Arc::new(ArrayCodec::new(element.clone())))
        } else {
            Some(element.clone())
        }
    }

    /// Array codec for the named element type.
    pub fn lookup_array(&self, name: &str) -> CallerResult<ArrayCodec> {
        let element_name = ColumnType::parse(name).name;
        self.codecs
            .get(&normalize_type_name(&element_name))
            .map(|element| ArrayCodec::new(element.clone()))
            .ok_or_else(|| CallerError::unknown_type(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.codecs.contains_key(&normalize_type_name(name))
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}
