//! Error types for tree conversions.
//!
//! Three families of failures are kept apart:
//!
//! - [`ConversionError`] - the input tree does not fit the requested type. Every
//!   data-validation failure is reported through this one type so callers only
//!   need to handle a single kind.
//! - [`UnsupportedTypeError`] - no resolver or adapter exists for a type or a
//!   value. This is a programming error, not bad input.
//! - [`DeclarationError`] - a record, enum or variant family was declared in an
//!   inconsistent way. Raised when the declaration is made, never deferred.

use std::fmt;

use thiserror::Error;

/// Classification of a [`ConversionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The top-level kind of the tree value does not match the target type.
    ShapeMismatch,
    /// A required field or key is absent from object input.
    MissingRequiredField,
    /// Extra keys were present and the extra-key policy is `Error`.
    UnexpectedField,
    /// A variant label does not resolve to any registered subtype.
    UnknownVariantLabel,
    /// A variant label resolved, but not to a subtype of the requested type.
    VariantNotAssignable,
    /// A converted value failed an attached constraint.
    ConstraintViolation,
    /// A fixed-length tuple received the wrong number of elements.
    ArityMismatch,
    /// The value has the right shape but its content is invalid
    /// (bad base64, an unparseable date, a rejected record constructor).
    InvalidValue,
    /// A converter could not be resolved while the conversion was running.
    UnsupportedType,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ShapeMismatch => "shape mismatch",
            Self::MissingRequiredField => "missing required field",
            Self::UnexpectedField => "unexpected field",
            Self::UnknownVariantLabel => "unknown variant label",
            Self::VariantNotAssignable => "variant not assignable",
            Self::ConstraintViolation => "constraint violation",
            Self::ArityMismatch => "arity mismatch",
            Self::InvalidValue => "invalid value",
            Self::UnsupportedType => "unsupported type",
        };
        f.write_str(name)
    }
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(": {detail}"),
        None => String::new(),
    }
}

/// Failure to convert a tree value into a typed value.
///
/// Carries the offending tree value, the display name of the target type and
/// an optional detail string. Nested conversions propagate the innermost error
/// unchanged, so `value` and `type_name` always describe the exact spot that
/// failed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Cannot convert to {type_name}: {value}{}", detail_suffix(.detail))]
pub struct ConversionError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// The tree value that could not be converted.
    pub value: serde_json::Value,
    /// Display name of the target type.
    pub type_name: String,
    /// Optional free-text detail.
    pub detail: Option<String>,
}

impl ConversionError {
    /// Create a new error without detail.
    pub fn new(kind: ErrorKind, value: &serde_json::Value, type_name: impl fmt::Display) -> Self {
        Self {
            kind,
            value: value.clone(),
            type_name: type_name.to_string(),
            detail: None,
        }
    }

    /// Shorthand for a [`ErrorKind::ShapeMismatch`] error.
    pub fn shape(value: &serde_json::Value, type_name: impl fmt::Display) -> Self {
        Self::new(ErrorKind::ShapeMismatch, value, type_name)
    }

    /// Attach a detail string.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Result type for reverse conversions.
pub type ConversionResult<T> = std::result::Result<T, ConversionError>;

/// No resolver, adapter or forward conversion exists for a type or value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Don't know how to convert {type_name}{}", detail_suffix(.detail))]
pub struct UnsupportedTypeError {
    /// Display name of the type (or the runtime type of a value).
    pub type_name: String,
    /// Optional free-text detail.
    pub detail: Option<String>,
}

impl UnsupportedTypeError {
    /// Create a new error for the given type name.
    pub fn new(type_name: impl fmt::Display) -> Self {
        Self {
            type_name: type_name.to_string(),
            detail: None,
        }
    }

    /// Attach a detail string.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Errors raised while declaring records, enums and variant families.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    /// A label is already registered to a different subtype of the family.
    #[error("Label '{label}' of family '{family}' is already registered to '{existing}'")]
    DuplicateLabel {
        family: String,
        label: String,
        existing: String,
    },

    /// The record already belongs to a variant family or carries an orphan label.
    #[error("Record '{record}' is already tagged with a variant label")]
    AlreadyTagged { record: String },

    /// A node (group or member) with this name already exists in the family.
    #[error("Family '{family}' already has a node named '{name}'")]
    DuplicateNode { family: String, name: String },

    /// A parent node given at registration does not exist in the family.
    #[error("Family '{family}' has no node named '{name}'")]
    UnknownNode { family: String, name: String },

    /// Two fields of a record share the same name or wire name.
    #[error("Record '{record}' declares field '{field}' more than once")]
    DuplicateField { record: String, field: String },

    /// An enum declares the same member twice.
    #[error("Enum '{name}' declares member '{member}' more than once")]
    DuplicateMember { name: String, member: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversion_error_display() {
        let err = ConversionError::shape(&json!([1, 2]), "Brick");
        assert_eq!(err.to_string(), "Cannot convert to Brick: [1,2]");

        let err = ConversionError::new(ErrorKind::ConstraintViolation, &json!(3), "Int")
            .with_detail("Violates constraint: Value must be in range 1..2");
        assert_eq!(
            err.to_string(),
            "Cannot convert to Int: 3: Violates constraint: Value must be in range 1..2"
        );
    }

    #[test]
    fn test_unsupported_type_display() {
        let err = UnsupportedTypeError::new("Callable");
        assert_eq!(err.to_string(), "Don't know how to convert Callable");

        let err = UnsupportedTypeError::new("Folder").with_detail("self reference outside a record");
        assert!(err.to_string().ends_with(": self reference outside a record"));
    }

    #[test]
    fn test_declaration_error_display() {
        let err = DeclarationError::DuplicateLabel {
            family: "Expression".to_string(),
            label: "and".to_string(),
            existing: "And".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Label 'and' of family 'Expression' is already registered to 'And'"
        );
    }
}
