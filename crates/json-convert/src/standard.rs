//! Standard adapter types.
//!
//! Each type wraps an ecosystem type and converts itself through
//! [`TreeConvertible`]. [`install`] registers all of them; registries built
//! with [`Registry::with_standard_adapters`] and the global registry have
//! them from the start.

use std::str::FromStr;

use chrono::{FixedOffset, NaiveDate, SecondsFormat};
use convert_core::CustomValue;
use serde_json::Value as Json;

use crate::convertible::TreeConvertible;
use crate::registry::Registry;

/// Register every standard adapter on `registry`.
pub fn install(registry: &Registry) {
    registry.register_convertible::<Date>();
    registry.register_convertible::<DateTime>();
    registry.register_convertible::<Uuid>();
    registry.register_convertible::<Decimal>();
    tracing::debug!("Installed standard adapters");
}

fn expect_str(tree: &Json) -> Result<&str, String> {
    tree.as_str().ok_or_else(|| "expected a string".to_string())
}

// ============================================================================
// Date and time
// ============================================================================

/// Calendar date, `YYYY-MM-DD` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date(pub NaiveDate);

impl CustomValue for Date {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }
}

impl TreeConvertible for Date {
    const TYPE_NAME: &'static str = "Date";

    fn to_tree(&self) -> Json {
        Json::String(self.0.format("%Y-%m-%d").to_string())
    }

    fn from_tree(tree: &Json) -> Result<Self, String> {
        NaiveDate::parse_from_str(expect_str(tree)?, "%Y-%m-%d")
            .map(Date)
            .map_err(|e| e.to_string())
    }
}

/// Instant with a UTC offset, RFC 3339 on the wire. UTC is written with `Z`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime(pub chrono::DateTime<FixedOffset>);

impl CustomValue for DateTime {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }
}

impl TreeConvertible for DateTime {
    const TYPE_NAME: &'static str = "DateTime";

    fn to_tree(&self) -> Json {
        Json::String(self.0.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    fn from_tree(tree: &Json) -> Result<Self, String> {
        chrono::DateTime::parse_from_rfc3339(expect_str(tree)?)
            .map(DateTime)
            .map_err(|e| e.to_string())
    }
}

// ============================================================================
// Identifiers and numbers
// ============================================================================

/// UUID in its hyphenated text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uuid(pub uuid::Uuid);

impl CustomValue for Uuid {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }
}

impl TreeConvertible for Uuid {
    const TYPE_NAME: &'static str = "Uuid";

    fn to_tree(&self) -> Json {
        Json::String(self.0.to_string())
    }

    fn from_tree(tree: &Json) -> Result<Self, String> {
        uuid::Uuid::parse_str(expect_str(tree)?)
            .map(Uuid)
            .map_err(|e| e.to_string())
    }
}

/// Exact decimal. Written as a string to keep precision; read from a string
/// or an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal(pub rust_decimal::Decimal);

impl CustomValue for Decimal {
    fn type_name(&self) -> &str {
        Self::TYPE_NAME
    }
}

impl TreeConvertible for Decimal {
    const TYPE_NAME: &'static str = "Decimal";

    fn to_tree(&self) -> Json {
        Json::String(self.0.to_string())
    }

    fn from_tree(tree: &Json) -> Result<Self, String> {
        match tree {
            Json::String(s) => rust_decimal::Decimal::from_str(s)
                .map(Decimal)
                .map_err(|e| e.to_string()),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Decimal(rust_decimal::Decimal::from(i)))
                } else if let Some(u) = n.as_u64() {
                    Ok(Decimal(rust_decimal::Decimal::from(u)))
                } else {
                    Err("floating point numbers lose precision; use a string".to_string())
                }
            }
            _ => Err("expected a string or an integer".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convert_core::{ErrorKind, RecordDef, TypeDescriptor, Value};
    use serde_json::json;

    fn registry() -> Registry {
        Registry::with_standard_adapters()
    }

    #[test]
    fn test_date() {
        crate::init_test_logging();
        let registry = registry();
        let value = registry.convert(&json!("2024-02-29"), &Date::descriptor()).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(value.as_custom::<Date>(), Some(&Date(date)));
        assert_eq!(registry.to_tree(&value).unwrap().into_owned(), json!("2024-02-29"));

        let err = match registry.convert(&json!("2023-02-29"), &Date::descriptor()) {
            Err(crate::Error::Conversion(err)) => err,
            other => panic!("Expected Conversion, got {:?}", other),
        };
        assert_eq!(err.kind, ErrorKind::InvalidValue);
    }

    #[test]
    fn test_datetime_writes_utc_as_z() {
        let registry = registry();
        let value = registry
            .convert(&json!("2024-01-15T10:30:00+00:00"), &DateTime::descriptor())
            .unwrap();
        assert_eq!(
            registry.to_tree(&value).unwrap().into_owned(),
            json!("2024-01-15T10:30:00Z")
        );

        let value = registry
            .convert(&json!("2024-01-15T10:30:00.250+02:00"), &DateTime::descriptor())
            .unwrap();
        assert_eq!(
            registry.to_tree(&value).unwrap().into_owned(),
            json!("2024-01-15T10:30:00.250+02:00")
        );
    }

    #[test]
    fn test_uuid() {
        let registry = registry();
        let text = "550e8400-e29b-41d4-a716-446655440000";
        let value = registry.convert(&json!(text), &Uuid::descriptor()).unwrap();
        assert_eq!(
            value.as_custom::<Uuid>(),
            Some(&Uuid(uuid::Uuid::parse_str(text).unwrap()))
        );
        assert_eq!(registry.to_tree(&value).unwrap().into_owned(), json!(text));
        assert!(registry.convert(&json!("not-a-uuid"), &Uuid::descriptor()).is_err());
    }

    #[test]
    fn test_decimal_accepts_strings_and_integers() {
        let registry = registry();
        let value = registry.convert(&json!("123.4500"), &Decimal::descriptor()).unwrap();
        assert_eq!(
            registry.to_tree(&value).unwrap().into_owned(),
            json!("123.4500")
        );

        let value = registry.convert(&json!(42), &Decimal::descriptor()).unwrap();
        assert_eq!(
            value.as_custom::<Decimal>(),
            Some(&Decimal(rust_decimal::Decimal::from(42)))
        );

        let err = match registry.convert(&json!(1.5), &Decimal::descriptor()) {
            Err(crate::Error::Conversion(err)) => err,
            other => panic!("Expected Conversion, got {:?}", other),
        };
        assert_eq!(err.kind, ErrorKind::InvalidValue);
    }

    #[test]
    fn test_adapters_inside_records() {
        let registry = registry();
        let event = RecordDef::builder("Event")
            .field("id", Uuid::descriptor())
            .field("day", Date::descriptor())
            .optional("amount", Decimal::descriptor())
            .build()
            .unwrap();
        let tree = json!({"id": "550e8400-e29b-41d4-a716-446655440000", "day": "2024-05-01"});
        let value = registry.convert(&tree, &event.descriptor()).unwrap();
        let record = value.as_record().unwrap();
        assert_eq!(record.get("amount"), Some(&Value::Null));
        assert_eq!(registry.to_tree(&value).unwrap().into_owned(), tree);
    }

    #[test]
    fn test_empty_registry_lacks_adapters() {
        let err = Registry::new()
            .converter(&TypeDescriptor::custom("Date"))
            .unwrap_err();
        assert_eq!(err.type_name, "Date");
    }
}
