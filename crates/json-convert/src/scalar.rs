//! Reverse converters for leaf types: scalars, literals, enums and `Any`.

use base64::Engine;
use convert_core::{
    ConversionError, EnumRef, EnumValue, ErrorKind, LiteralValue, ScalarKind, TypeDescriptor,
    Value,
};
use serde_json::Value as Json;

use crate::converter::Converter;

/// `Any`: the tree is kept as-is.
pub(crate) fn any() -> Converter {
    Converter::new(|tree, _config| Ok(Value::Tree(tree.clone())))
}

pub(crate) fn scalar(kind: ScalarKind) -> Converter {
    match kind {
        ScalarKind::Null => Converter::new(move |tree, _config| match tree {
            Json::Null => Ok(Value::Null),
            _ => Err(ConversionError::shape(tree, kind)),
        }),
        ScalarKind::Bool => Converter::new(move |tree, _config| match tree {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            _ => Err(ConversionError::shape(tree, kind)),
        }),
        ScalarKind::Int => Converter::new(move |tree, _config| match tree {
            Json::Number(n) => n.as_i64().map(Value::Int).ok_or_else(|| {
                let err = ConversionError::shape(tree, kind);
                if n.is_u64() {
                    err.with_detail("integer out of range")
                } else {
                    err
                }
            }),
            _ => Err(ConversionError::shape(tree, kind)),
        }),
        ScalarKind::Float => Converter::new(move |tree, _config| match tree {
            Json::Number(n) => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| ConversionError::shape(tree, kind)),
            _ => Err(ConversionError::shape(tree, kind)),
        }),
        ScalarKind::String => Converter::new(move |tree, _config| match tree {
            Json::String(s) => Ok(Value::String(s.clone())),
            _ => Err(ConversionError::shape(tree, kind)),
        }),
        ScalarKind::Bytes => Converter::new(move |tree, _config| match tree {
            Json::String(s) => base64::engine::general_purpose::STANDARD
                .decode(s)
                .map(Value::Bytes)
                .map_err(|err| {
                    ConversionError::new(ErrorKind::InvalidValue, tree, kind)
                        .with_detail(format!("invalid base64: {err}"))
                }),
            _ => Err(ConversionError::shape(tree, kind)),
        }),
    }
}

fn literal_matches(option: &LiteralValue, tree: &Json) -> bool {
    match (option, tree) {
        (LiteralValue::Null, Json::Null) => true,
        (LiteralValue::Bool(a), Json::Bool(b)) => a == b,
        (LiteralValue::Int(a), Json::Number(n)) => n.as_i64() == Some(*a),
        (LiteralValue::String(a), Json::String(b)) => a == b,
        _ => false,
    }
}

fn literal_value(option: &LiteralValue) -> Value {
    match option {
        LiteralValue::Null => Value::Null,
        LiteralValue::Bool(b) => Value::Bool(*b),
        LiteralValue::Int(i) => Value::Int(*i),
        LiteralValue::String(s) => Value::String(s.clone()),
    }
}

pub(crate) fn literal(descriptor: &TypeDescriptor, options: &[LiteralValue]) -> Converter {
    let type_name = descriptor.to_string();
    let options = options.to_vec();
    Converter::new(move |tree, _config| {
        options
            .iter()
            .find(|option| literal_matches(option, tree))
            .map(literal_value)
            .ok_or_else(|| ConversionError::shape(tree, &type_name))
    })
}

/// Enum members travel by name, or by number for integer-valued enums.
pub(crate) fn enumeration(def: &EnumRef) -> Converter {
    let def = def.clone();
    Converter::new(move |tree, _config| {
        let member = if def.is_int_valued() {
            match tree.as_i64() {
                Some(n) => def.member_by_value(n),
                None => return Err(ConversionError::shape(tree, def.name())),
            }
        } else {
            match tree.as_str() {
                Some(name) => def.member(name),
                None => return Err(ConversionError::shape(tree, def.name())),
            }
        };
        match member {
            Some(member) => Ok(Value::Enum(EnumValue {
                def: def.clone(),
                member: member.name.clone(),
            })),
            None => Err(ConversionError::new(ErrorKind::InvalidValue, tree, def.name())
                .with_detail("not a member")),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use convert_core::EnumDef;
    use serde_json::json;

    #[test]
    fn test_int_rejects_fractional_and_strings() {
        let int = scalar(ScalarKind::Int);
        assert_eq!(int.convert_default(&json!(42)).unwrap(), Value::Int(42));
        for bad in [json!(4.5), json!("42"), json!(true), json!(null)] {
            let err = int.convert_default(&bad).unwrap_err();
            assert_eq!(err.kind, ErrorKind::ShapeMismatch);
            assert_eq!(err.type_name, "Int");
        }
        let err = int.convert_default(&json!(u64::MAX)).unwrap_err();
        assert_eq!(err.detail.as_deref(), Some("integer out of range"));
    }

    #[test]
    fn test_float_widens_integers() {
        let float = scalar(ScalarKind::Float);
        assert_eq!(float.convert_default(&json!(3)).unwrap(), Value::Float(3.0));
        assert_eq!(float.convert_default(&json!(2.5)).unwrap(), Value::Float(2.5));
        assert!(float.convert_default(&json!("2.5")).is_err());
    }

    #[test]
    fn test_bytes_from_base64() {
        let bytes = scalar(ScalarKind::Bytes);
        assert_eq!(
            bytes.convert_default(&json!("aGVsbG8=")).unwrap(),
            Value::Bytes(b"hello".to_vec())
        );
        let err = bytes.convert_default(&json!("not base64!")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidValue);
    }

    #[test]
    fn test_error_message_format() {
        let err = scalar(ScalarKind::String)
            .convert_default(&json!(7))
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot convert to String: 7");
    }

    #[test]
    fn test_literal_options() {
        let descriptor = TypeDescriptor::literal(["A", "B"]);
        let TypeDescriptor::Literal(options) = &descriptor else {
            panic!("Expected Literal, got {:?}", descriptor);
        };
        let converter = literal(&descriptor, options);
        assert_eq!(converter.convert_default(&json!("B")).unwrap(), Value::string("B"));
        let err = converter.convert_default(&json!("C")).unwrap_err();
        assert_eq!(err.to_string(), "Cannot convert to Literal<\"A\", \"B\">: \"C\"");
    }

    #[test]
    fn test_enums_by_name_and_value() {
        let color = EnumDef::named("Color", ["Red", "Green"]).unwrap();
        let converter = enumeration(&color);
        assert_eq!(
            converter.convert_default(&json!("Green")).unwrap(),
            color.value("Green").unwrap()
        );
        let err = converter.convert_default(&json!("Blue")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidValue);

        let material = EnumDef::int_valued("Material", [("Wood", 1), ("Metal", 2)]).unwrap();
        let converter = enumeration(&material);
        assert_eq!(
            converter.convert_default(&json!(2)).unwrap(),
            material.value("Metal").unwrap()
        );
        assert!(converter.convert_default(&json!("Metal")).is_err());
    }

    #[test]
    fn test_any_keeps_tree() {
        let tree = json!({"a": [1, 2, 3]});
        assert_eq!(any().convert_default(&tree).unwrap(), Value::Tree(tree));
    }
}
