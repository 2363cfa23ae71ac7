//! tree-convert
//!
//! Type-directed conversions between structured in-memory values and JSON
//! trees.
//!
//! # Crates
//!
//! - `convert_core` - type descriptors, values, record/enum/variant
//!   declarations, constraints and error types
//! - `json_convert` - the converter registry, forward conversion, reverse
//!   resolvers, standard adapters and ad-hoc schemas
//!
//! This crate re-exports both and adds the text helpers that go through
//! `serde_json`'s encoder and decoder.
//!
//! # Example
//!
//! ```ignore
//! use tree_convert::{from_json_str, to_json_string, RecordDef, TypeDescriptor};
//!
//! let folder = RecordDef::builder("Folder")
//!     .field("name", TypeDescriptor::STRING)
//!     .field("subfolders", TypeDescriptor::list(TypeDescriptor::SelfRef))
//!     .build()?;
//!
//! let value = from_json_str(r#"{"name": "main", "subfolders": []}"#, &folder.descriptor())?;
//! assert_eq!(to_json_string(&value)?, r#"{"name":"main","subfolders":[]}"#);
//! ```

use serde_json::Value as Json;
use thiserror::Error as ThisError;

pub use convert_core::{
    compare_values, Bound, Constraint, Constructor, ConversionError, ConversionResult,
    CustomValue, CustomValueBase, DeclarationError, EnumDef, EnumMember, EnumRef, EnumValue,
    ErrorKind, ExtraKeyPolicy, FieldDef, LiteralValue, MapLike, Presence, RecordBuilder,
    RecordDef, RecordRef, RecordValue, ScalarKind, SequenceLike, SetLike, TypeDescriptor,
    UnsupportedTypeError, Value, VariantFamily, VariantRef, VariantTag,
};
pub use json_convert::{
    standard, ConversionConfig, Converter, Date, DateTime, Decimal, ForwardFn, OnExtraKey,
    Registry, Resolver, ReverseFactory, Schema, SchemaField, TreeConvertible, Uuid, WeakConverter,
};

/// Every failure this crate can report.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The tree does not fit the requested type.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// No converter exists for the requested type or value.
    #[error(transparent)]
    Unsupported(#[from] UnsupportedTypeError),

    /// A type was declared inconsistently.
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    /// The text is not valid JSON.
    #[error("Invalid JSON text: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<json_convert::Error> for Error {
    fn from(err: json_convert::Error) -> Self {
        match err {
            json_convert::Error::Conversion(err) => Error::Conversion(err),
            json_convert::Error::Unsupported(err) => Error::Unsupported(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Encode `value` as JSON text using the global registry.
pub fn to_json_string(value: &Value) -> Result<String> {
    to_json_string_with(Registry::global(), value)
}

/// Encode `value` as JSON text using `registry`.
pub fn to_json_string_with(registry: &Registry, value: &Value) -> Result<String> {
    let tree = registry.to_tree(value)?;
    Ok(serde_json::to_string(tree.as_ref())?)
}

/// Decode JSON text and convert it to `descriptor` using the global registry.
pub fn from_json_str(text: &str, descriptor: &TypeDescriptor) -> Result<Value> {
    from_json_str_with(Registry::global(), text, descriptor, &ConversionConfig::default())
}

/// Decode JSON text and convert it to `descriptor` using `registry` and
/// `config`.
pub fn from_json_str_with(
    registry: &Registry,
    text: &str,
    descriptor: &TypeDescriptor,
    config: &ConversionConfig,
) -> Result<Value> {
    let tree: Json = serde_json::from_str(text)?;
    tracing::trace!("Decoded {} bytes of JSON text", text.len());
    Ok(registry.convert_with(&tree, descriptor, config)?)
}
