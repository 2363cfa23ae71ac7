//! Core types for type-directed tree conversions.
//!
//! This crate holds everything a conversion is described with, independent of
//! the tree format:
//!
//! - [`types`] - `TypeDescriptor`, the hashable description of a target type
//! - [`values`] - `Value`, the in-memory side of every conversion
//! - [`schema`] - record and enum declarations
//! - [`variant`] - variant families dispatched on a wire label
//! - [`constraint`] - post-conversion validation predicates
//! - [`error`] - conversion, unsupported-type and declaration errors
//!
//! The registry and the converters themselves live in `json-convert`.

pub mod constraint;
pub mod error;
pub mod schema;
pub mod types;
pub mod values;
pub mod variant;

pub use constraint::{Bound, Constraint};
pub use error::{
    ConversionError, ConversionResult, DeclarationError, ErrorKind, UnsupportedTypeError,
};
pub use schema::{
    Constructor, EnumDef, EnumMember, EnumRef, ExtraKeyPolicy, FieldDef, Presence, RecordBuilder,
    RecordDef, RecordRef, VariantTag,
};
pub use types::{LiteralValue, ScalarKind, TypeDescriptor};
pub use values::{
    compare_values, CustomValue, CustomValueBase, EnumValue, MapLike, RecordValue, SequenceLike,
    SetLike, Value,
};
pub use variant::{VariantFamily, VariantRef};
