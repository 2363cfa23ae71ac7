//! Types that convert themselves.
//!
//! A [`TreeConvertible`] type carries both directions as methods. Registering
//! it installs a forward adapter for the concrete type and a reverse factory
//! under [`TreeConvertible::TYPE_NAME`].

use convert_core::{ConversionError, CustomValue, ErrorKind, TypeDescriptor, Value};
use serde_json::Value as Json;

use crate::converter::Converter;
use crate::registry::Registry;

/// A custom value type with its own tree conversion methods.
pub trait TreeConvertible: CustomValue + Clone + PartialEq {
    /// Name of the adapter type, as used by [`TypeDescriptor::Custom`].
    const TYPE_NAME: &'static str;

    /// Forward conversion.
    fn to_tree(&self) -> Json;

    /// Reverse conversion. The error string becomes the detail of an
    /// `InvalidValue` conversion error.
    fn from_tree(tree: &Json) -> Result<Self, String>;

    /// Descriptor naming this type.
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::custom(Self::TYPE_NAME)
    }
}

pub(crate) fn register<T: TreeConvertible>(registry: &Registry) {
    registry.register_forward::<T, _>(|value, _registry| Ok(value.to_tree()));
    registry.register_reverse(T::TYPE_NAME, |descriptor, _resolver| {
        let type_name = descriptor.to_string();
        Ok(Converter::new(move |tree, _config| {
            T::from_tree(tree).map(Value::custom).map_err(|detail| {
                ConversionError::new(ErrorKind::InvalidValue, tree, &type_name).with_detail(detail)
            })
        }))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Point stored on the wire as `"x,y"`.
    #[derive(Debug, Clone, PartialEq)]
    struct Point {
        x: i64,
        y: i64,
    }

    impl CustomValue for Point {
        fn type_name(&self) -> &str {
            "Point"
        }
    }

    impl TreeConvertible for Point {
        const TYPE_NAME: &'static str = "Point";

        fn to_tree(&self) -> Json {
            Json::String(format!("{},{}", self.x, self.y))
        }

        fn from_tree(tree: &Json) -> Result<Self, String> {
            let text = tree.as_str().ok_or("expected a string")?;
            let (x, y) = text.split_once(',').ok_or("expected 'x,y'")?;
            let parse = |s: &str| s.trim().parse::<i64>().map_err(|e| e.to_string());
            Ok(Point {
                x: parse(x)?,
                y: parse(y)?,
            })
        }
    }

    #[test]
    fn test_both_directions() {
        crate::init_test_logging();
        let registry = Registry::new();
        registry.register_convertible::<Point>();

        let value = Value::custom(Point { x: 1, y: -2 });
        let tree = registry.to_tree(&value).unwrap().into_owned();
        assert_eq!(tree, json!("1,-2"));
        assert_eq!(registry.convert(&tree, &Point::descriptor()).unwrap(), value);
    }

    #[test]
    fn test_nested_in_containers() {
        let registry = Registry::new();
        registry.register_convertible::<Point>();

        let path = TypeDescriptor::list(Point::descriptor());
        let value = registry.convert(&json!(["0,0", "3,4"]), &path).unwrap();
        assert_eq!(
            value,
            Value::list([
                Value::custom(Point { x: 0, y: 0 }),
                Value::custom(Point { x: 3, y: 4 }),
            ])
        );
    }

    #[test]
    fn test_rejection_is_invalid_value() {
        let registry = Registry::new();
        registry.register_convertible::<Point>();

        let err = match registry.convert(&json!("1;2"), &Point::descriptor()) {
            Err(crate::Error::Conversion(err)) => err,
            other => panic!("Expected Conversion, got {:?}", other),
        };
        assert_eq!(err.kind, ErrorKind::InvalidValue);
        assert_eq!(err.detail.as_deref(), Some("expected 'x,y'"));
    }
}
