//! Reverse converter for records.
//!
//! Checks run in a fixed order so error messages are deterministic:
//!
//! 1. the input must be an object
//! 2. a tagged record checks its label, unless it declares the label key
//!    as an ordinary field
//! 3. declared fields, in declaration order
//! 4. unconsumed keys, per the extra-key policy
//! 5. the constructor hook
//! 6. record-level constraints

use std::collections::HashSet;

use convert_core::{
    ConversionError, ErrorKind, ExtraKeyPolicy, FieldDef, Presence, RecordRef, UnsupportedTypeError,
    Value,
};
use serde_json::Value as Json;

use crate::config::{ConversionConfig, OnExtraKey};
use crate::converter::Converter;
use crate::resolver::Resolver;

struct CompiledField {
    def: FieldDef,
    converter: Converter,
}

enum ExtraKeys {
    Error,
    Ignore,
    CollectInto { field: String, converter: Converter },
}

pub(crate) fn resolve(
    resolver: &mut Resolver<'_>,
    def: &RecordRef,
) -> Result<Converter, UnsupportedTypeError> {
    let mut fields = Vec::with_capacity(def.fields().len());
    for field in def.fields() {
        fields.push(CompiledField {
            def: field.clone(),
            converter: resolver.resolve(&field.ty)?,
        });
    }
    let extra_keys = match def.extra_keys() {
        ExtraKeyPolicy::Error => ExtraKeys::Error,
        ExtraKeyPolicy::Ignore => ExtraKeys::Ignore,
        ExtraKeyPolicy::CollectInto { field, value_type } => ExtraKeys::CollectInto {
            field: field.clone(),
            converter: resolver.resolve(value_type)?,
        },
    };
    let def = def.clone();

    Ok(Converter::new(move |tree, config| {
        let object = tree
            .as_object()
            .ok_or_else(|| ConversionError::shape(tree, def.name()))?;
        let mut consumed: HashSet<&str> = HashSet::with_capacity(object.len());

        if let Some(tag) = def.tag() {
            if !def.declares_wire_name(&tag.label_field) {
                if let Some(label) = object.get(&tag.label_field) {
                    check_label(&def, tree, label, &tag.labels)?;
                    consumed.insert(tag.label_field.as_str());
                }
            }
        }

        let mut record = def.value();
        for field in &fields {
            let wire_name = field.def.wire_name.as_str();
            match (object.get(wire_name), &field.def.presence) {
                (Some(raw), _) => {
                    record.set(field.def.name.clone(), field.converter.convert(raw, config)?);
                    consumed.insert(wire_name);
                }
                (None, Presence::Required) => {
                    return Err(
                        ConversionError::new(ErrorKind::MissingRequiredField, tree, def.name())
                            .with_detail(format!("Required key not found: {wire_name}")),
                    );
                }
                (None, Presence::Default(default)) => {
                    record.set(field.def.name.clone(), default.clone());
                }
                (None, Presence::Omittable) => {}
            }
        }

        if consumed.len() < object.len() {
            let extra = object
                .iter()
                .filter(|(key, _)| !consumed.contains(key.as_str()));
            match &extra_keys {
                ExtraKeys::Error if config.on_extra_key == OnExtraKey::Error => {
                    let keys: Vec<&str> = extra.map(|(key, _)| key.as_str()).collect();
                    return Err(
                        ConversionError::new(ErrorKind::UnexpectedField, tree, def.name())
                            .with_detail(format!("Extra keys: {}", keys.join(", "))),
                    );
                }
                ExtraKeys::Error | ExtraKeys::Ignore => {}
                ExtraKeys::CollectInto { field, converter } => {
                    record.set(field.clone(), collect(extra, converter, config)?);
                }
            }
        } else if let ExtraKeys::CollectInto { field, .. } = &extra_keys {
            record.set(field.clone(), Value::Map(Vec::new()));
        }

        let record = match def.constructor() {
            Some(constructor) => constructor(record).map_err(|detail| {
                ConversionError::new(ErrorKind::InvalidValue, tree, def.name()).with_detail(detail)
            })?,
            None => record,
        };

        let value = Value::Record(record);
        if let Some(violated) = def.constraints().iter().find(|c| !c.evaluate(&value)) {
            return Err(
                ConversionError::new(ErrorKind::ConstraintViolation, tree, def.name())
                    .with_detail(violated.violation_message()),
            );
        }
        Ok(value)
    }))
}

fn check_label(
    def: &RecordRef,
    tree: &Json,
    label: &Json,
    labels: &[String],
) -> Result<(), ConversionError> {
    match label.as_str() {
        Some(label) if labels.iter().any(|l| l == label) => Ok(()),
        Some(label) => Err(
            ConversionError::new(ErrorKind::UnknownVariantLabel, tree, def.name())
                .with_detail(format!("Unexpected label '{label}'")),
        ),
        None => Err(ConversionError::shape(tree, def.name()).with_detail("label is not a string")),
    }
}

fn collect<'a>(
    extra: impl Iterator<Item = (&'a String, &'a Json)>,
    converter: &Converter,
    config: &ConversionConfig,
) -> Result<Value, ConversionError> {
    let mut entries = Vec::new();
    for (key, raw) in extra {
        entries.push((Value::String(key.clone()), converter.convert(raw, config)?));
    }
    Ok(Value::Map(entries))
}
