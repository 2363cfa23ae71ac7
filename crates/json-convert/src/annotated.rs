//! Reverse converter for annotated types.

use convert_core::{
    Constraint, ConversionError, ErrorKind, TypeDescriptor, UnsupportedTypeError,
};

use crate::converter::Converter;
use crate::resolver::Resolver;

/// Runs the base converter, then every constraint against the converted
/// value in attachment order. The first violation fails the conversion.
pub(crate) fn resolve(
    resolver: &mut Resolver<'_>,
    descriptor: &TypeDescriptor,
    base: &TypeDescriptor,
    constraints: &[Constraint],
) -> Result<Converter, UnsupportedTypeError> {
    let base = resolver.resolve(base)?;
    let constraints = constraints.to_vec();
    let type_name = descriptor.to_string();

    Ok(Converter::new(move |tree, config| {
        let value = base.convert(tree, config)?;
        if let Some(violated) = constraints.iter().find(|c| !c.evaluate(&value)) {
            return Err(
                ConversionError::new(ErrorKind::ConstraintViolation, tree, &type_name)
                    .with_detail(violated.violation_message()),
            );
        }
        Ok(value)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use convert_core::Value;
    use serde_json::json;

    fn aaaaa() -> TypeDescriptor {
        TypeDescriptor::STRING
            .annotate(Constraint::regex("[a]+").unwrap())
            .annotate(Constraint::min_len(5))
    }

    #[test]
    fn test_chained_constraints_all_apply() {
        let registry = Registry::new();
        let ty = aaaaa();

        assert_eq!(
            registry.convert(&json!("aaaaa"), &ty).unwrap(),
            Value::string("aaaaa")
        );

        let err = match registry.convert(&json!("aaaaaaah"), &ty).unwrap_err() {
            crate::Error::Conversion(err) => err,
            other => panic!("Expected Conversion, got {:?}", other),
        };
        assert_eq!(err.kind, ErrorKind::ConstraintViolation);
        assert_eq!(
            err.detail.as_deref(),
            Some("Violates constraint: Regular expression '[a]+'")
        );

        let err = match registry.convert(&json!("aaa"), &ty).unwrap_err() {
            crate::Error::Conversion(err) => err,
            other => panic!("Expected Conversion, got {:?}", other),
        };
        assert_eq!(
            err.detail.as_deref(),
            Some("Violates constraint: Length must be at least 5")
        );
    }

    #[test]
    fn test_base_failure_comes_first() {
        let registry = Registry::new();
        let err = registry
            .converter(&aaaaa())
            .unwrap()
            .convert_default(&json!(12345))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::ShapeMismatch);
        assert_eq!(err.type_name, "String");
    }

    #[test]
    fn test_or_constraint_on_numbers() {
        let registry = Registry::new();
        let ty = TypeDescriptor::INT.annotate(Constraint::max(0).or(Constraint::min(10)));
        let converter = registry.converter(&ty).unwrap();
        assert!(converter.convert_default(&json!(-3)).is_ok());
        assert!(converter.convert_default(&json!(12)).is_ok());
        let err = converter.convert_default(&json!(5)).unwrap_err();
        assert_eq!(
            err.detail.as_deref(),
            Some("Violates constraint: Value must be at most 0 or Value must be at least 10")
        );
    }

    #[test]
    fn test_anonymous_predicate_message() {
        let registry = Registry::new();
        let even = TypeDescriptor::INT
            .annotate(Constraint::anonymous(|v| v.as_i64().is_some_and(|i| i % 2 == 0)));
        let err = registry
            .converter(&even)
            .unwrap()
            .convert_default(&json!(3))
            .unwrap_err();
        assert_eq!(err.detail.as_deref(), Some("Violates a constraint"));
    }
}
