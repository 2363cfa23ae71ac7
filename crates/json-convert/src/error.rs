//! Error type for one-shot conversions.

use convert_core::{ConversionError, ErrorKind, UnsupportedTypeError};
use serde_json::Value as Json;
use thiserror::Error;

/// Failure of a one-shot conversion: either the converter could not be
/// resolved, or the tree did not fit the type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The tree does not fit the requested type.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// No converter exists for the requested type or value.
    #[error(transparent)]
    Unsupported(#[from] UnsupportedTypeError),
}

/// Result type for one-shot conversions.
pub type Result<T> = std::result::Result<T, Error>;

/// Report a resolution failure that happened while a conversion was already
/// running (deferred converters, per-label variant converters).
pub(crate) fn unsupported_at_runtime(
    tree: &Json,
    type_name: &str,
    err: UnsupportedTypeError,
) -> ConversionError {
    ConversionError::new(ErrorKind::UnsupportedType, tree, type_name).with_detail(err.to_string())
}
