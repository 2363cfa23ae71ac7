//! Reverse converter for sum types.
//!
//! Checks run in a fixed order: object input, label present and a string,
//! label known to the family, member assignable to the requested node, then
//! the member's own record converter. Member converters are cached per label
//! inside the converter; the cache is dropped whenever the family registers
//! a new member or the registry is invalidated.

use std::collections::HashMap;
use std::sync::Arc;

use convert_core::{ConversionError, ErrorKind, RecordRef, VariantFamily, VariantRef};
use parking_lot::Mutex;
use serde_json::Value as Json;

use crate::converter::{Converter, WeakConverter};
use crate::error::unsupported_at_runtime;
use crate::registry::{Registry, WeakRegistry};
use crate::resolver::Resolver;

struct LabelCache {
    generation: u64,
    epoch: u64,
    converters: HashMap<String, WeakConverter>,
}

struct SumType {
    family: Arc<VariantFamily>,
    node: String,
    registry: WeakRegistry,
    labels: Mutex<LabelCache>,
}

impl SumType {
    /// Validate the envelope and return the label with the member it names.
    fn member_of<'t>(&self, tree: &'t Json) -> Result<(&'t str, RecordRef), ConversionError> {
        let object = tree
            .as_object()
            .ok_or_else(|| ConversionError::shape(tree, &self.node))?;
        let label_field = self.family.label_field();
        let label = match object.get(label_field) {
            Some(Json::String(label)) => label.as_str(),
            Some(_) => {
                return Err(ConversionError::shape(tree, &self.node)
                    .with_detail(format!("'{label_field}' must be a string")))
            }
            None => {
                return Err(
                    ConversionError::new(ErrorKind::MissingRequiredField, tree, &self.node)
                        .with_detail(format!("Required key not found: {label_field}")),
                )
            }
        };

        let member = self.family.resolve(label).ok_or_else(|| {
            ConversionError::new(ErrorKind::UnknownVariantLabel, tree, &self.node)
                .with_detail(format!("Unknown label '{label}'"))
        })?;
        if !self.family.is_assignable(member.name(), &self.node) {
            return Err(
                ConversionError::new(ErrorKind::VariantNotAssignable, tree, &self.node)
                    .with_detail(format!("'{}' is not a subtype of '{}'", member.name(), self.node)),
            );
        }
        Ok((label, member))
    }

    fn member_converter(
        &self,
        tree: &Json,
        label: &str,
        member: &RecordRef,
    ) -> Result<Converter, ConversionError> {
        let Some(registry) = self.registry.upgrade() else {
            tracing::warn!("Sum type converter for {} outlived its registry", self.node);
            return Err(ConversionError::new(ErrorKind::UnsupportedType, tree, &self.node)
                .with_detail("registry was dropped"));
        };

        if let Some(hit) = self.cached(&registry, label) {
            return Ok(hit);
        }

        let converter = registry
            .converter(&member.descriptor())
            .map_err(|err| unsupported_at_runtime(tree, member.name(), err))?;
        tracing::debug!(
            "Cached converter for label '{label}' of family '{}'",
            self.family.name()
        );
        self.labels
            .lock()
            .converters
            .insert(label.to_string(), converter.downgrade());
        Ok(converter)
    }

    fn cached(&self, registry: &Registry, label: &str) -> Option<Converter> {
        let mut labels = self.labels.lock();
        let generation = self.family.generation();
        let epoch = registry.epoch();
        if labels.generation != generation || labels.epoch != epoch {
            labels.converters.clear();
            labels.generation = generation;
            labels.epoch = epoch;
            return None;
        }
        labels.converters.get(label).and_then(WeakConverter::upgrade)
    }
}

pub(crate) fn resolve(resolver: &mut Resolver<'_>, node: &VariantRef) -> Converter {
    let registry = resolver.registry();
    let sum = SumType {
        family: Arc::clone(node.family()),
        node: node.node().to_string(),
        registry: registry.downgrade(),
        labels: Mutex::new(LabelCache {
            generation: node.family().generation(),
            epoch: registry.epoch(),
            converters: HashMap::new(),
        }),
    };

    Converter::new(move |tree, config| {
        let (label, member) = sum.member_of(tree)?;
        sum.member_converter(tree, label, &member)?
            .convert(tree, config)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use convert_core::{RecordDef, TypeDescriptor, Value};
    use serde_json::json;

    struct Expressions {
        family: Arc<VariantFamily>,
        literal: RecordRef,
        and: RecordRef,
    }

    fn expressions() -> Expressions {
        let family = VariantFamily::declare("Expression", "type");
        family.declare_group("Binary", None).unwrap();
        let literal = RecordDef::builder("Literal")
            .field("value", TypeDescriptor::BOOL)
            .build()
            .unwrap();
        let and = RecordDef::builder("And")
            .field("left", TypeDescriptor::named("Expression"))
            .field("right", TypeDescriptor::named("Expression"))
            .build()
            .unwrap();
        family.register(&literal, ["literal"], None).unwrap();
        family.register(&and, ["and", "&&"], Some("Binary")).unwrap();
        Expressions {
            family,
            literal,
            and,
        }
    }

    fn registry(expressions: &Expressions) -> Registry {
        let registry = Registry::new();
        registry.declare_family(&expressions.family);
        registry
    }

    #[test]
    fn test_dispatch_on_label() {
        let expressions = expressions();
        let registry = registry(&expressions);
        let value = registry
            .convert(
                &json!({
                    "type": "and",
                    "left": {"type": "literal", "value": true},
                    "right": {"type": "literal", "value": false}
                }),
                &expressions.family.descriptor(),
            )
            .unwrap();
        let record = value.as_record().unwrap();
        assert_eq!(record.def, expressions.and);
        let left = record.get("left").and_then(Value::as_record).unwrap();
        assert_eq!(left.def, expressions.literal);
        assert_eq!(left.get("value"), Some(&Value::Bool(true)));

        // secondary labels resolve to the same member
        let value = registry
            .convert(
                &json!({
                    "type": "&&",
                    "left": {"type": "literal", "value": true},
                    "right": {"type": "literal", "value": true}
                }),
                &expressions.family.descriptor(),
            )
            .unwrap();
        assert_eq!(value.as_record().unwrap().def, expressions.and);
    }

    fn kind_of(registry: &Registry, tree: Json, ty: &TypeDescriptor) -> ErrorKind {
        match registry.convert(&tree, ty) {
            Err(crate::Error::Conversion(err)) => err.kind,
            other => panic!("Expected conversion error, got {:?}", other),
        }
    }

    #[test]
    fn test_error_ordering() {
        let expressions = expressions();
        let registry = registry(&expressions);
        let root = expressions.family.descriptor();
        let binary = TypeDescriptor::SumType(expressions.family.node("Binary").unwrap());

        assert_eq!(kind_of(&registry, json!([]), &root), ErrorKind::ShapeMismatch);
        assert_eq!(
            kind_of(&registry, json!({"value": true}), &root),
            ErrorKind::MissingRequiredField
        );
        assert_eq!(
            kind_of(&registry, json!({"type": 1}), &root),
            ErrorKind::ShapeMismatch
        );
        assert_eq!(
            kind_of(&registry, json!({"type": "Whatever"}), &root),
            ErrorKind::UnknownVariantLabel
        );
        assert_eq!(
            kind_of(&registry, json!({"type": "literal", "value": true}), &binary),
            ErrorKind::VariantNotAssignable
        );
        assert_eq!(
            kind_of(&registry, json!({"type": "literal"}), &root),
            ErrorKind::MissingRequiredField
        );
    }

    #[test]
    fn test_late_registration_is_visible() {
        let expressions = expressions();
        let registry = registry(&expressions);
        let root = expressions.family.descriptor();
        let tree = json!({"type": "not", "operand": {"type": "literal", "value": true}});
        assert_eq!(
            kind_of(&registry, tree.clone(), &root),
            ErrorKind::UnknownVariantLabel
        );

        let not = RecordDef::builder("Not")
            .field("operand", TypeDescriptor::named("Expression"))
            .build()
            .unwrap();
        expressions.family.register(&not, ["not"], None).unwrap();

        let value = registry.convert(&tree, &root).unwrap();
        assert_eq!(value.as_record().unwrap().def, not);
    }

    #[test]
    fn test_member_declaring_label_field_keeps_it() {
        let family = VariantFamily::declare("Event", "kind");
        let custom = RecordDef::builder("Custom")
            .field("kind", TypeDescriptor::STRING)
            .field("payload", TypeDescriptor::Any)
            .build()
            .unwrap();
        family.register(&custom, ["custom"], None).unwrap();

        let registry = Registry::new();
        let value = registry
            .convert(&json!({"kind": "custom", "payload": 1}), &family.descriptor())
            .unwrap();
        let record = value.as_record().unwrap();
        assert_eq!(record.get("kind"), Some(&Value::string("custom")));
    }
}
