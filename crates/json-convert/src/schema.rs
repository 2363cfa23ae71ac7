//! Ad-hoc object schemas.
//!
//! A [`Schema`] describes a JSON object without declaring a record type. It
//! converts into a string-keyed [`Value::Map`] keyed by field name.
//!
//! ```ignore
//! let person = Schema::new()
//!     .field("first-name", TypeDescriptor::STRING)
//!     .entry("extra-info", SchemaField::new(TypeDescriptor::optional(TypeDescriptor::STRING)).default(Value::Null));
//! let relaxed = person.extend([("extra-info", None)]).with_extra_data_key("extra");
//! ```

use convert_core::{ConversionError, ErrorKind, Presence, TypeDescriptor, UnsupportedTypeError, Value};
use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::config::{ConversionConfig, OnExtraKey};
use crate::converter::Converter;
use crate::registry::Registry;

const SCHEMA_TYPE_NAME: &str = "Schema";

/// One entry of a [`Schema`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    ty: TypeDescriptor,
    wire_name: Option<String>,
    presence: Option<Presence>,
}

impl SchemaField {
    /// Entry of type `ty`. Whether it is required follows the schema's
    /// `total` flag unless set explicitly.
    pub fn new(ty: TypeDescriptor) -> Self {
        Self {
            ty,
            wire_name: None,
            presence: None,
        }
    }

    /// Read the entry from `wire_name` instead of its own name.
    pub fn wire_name(mut self, wire_name: impl Into<String>) -> Self {
        self.wire_name = Some(wire_name.into());
        self
    }

    /// Use `value` when the key is missing.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.presence = Some(Presence::Default(value.into()));
        self
    }

    /// Always require the key.
    pub fn required(mut self) -> Self {
        self.presence = Some(Presence::Required);
        self
    }

    /// Leave the entry out of the result when the key is missing.
    pub fn omittable(mut self) -> Self {
        self.presence = Some(Presence::Omittable);
        self
    }
}

impl From<TypeDescriptor> for SchemaField {
    fn from(ty: TypeDescriptor) -> Self {
        Self::new(ty)
    }
}

/// Description of a JSON object converted into a map.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    fields: IndexMap<String, SchemaField>,
    total: bool,
    default_type: Option<TypeDescriptor>,
    extra_data_key: Option<String>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            fields: IndexMap::new(),
            total: true,
            default_type: None,
            extra_data_key: None,
        }
    }
}

impl Schema {
    /// Empty, total schema that rejects unknown keys.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry of type `ty`.
    pub fn field(self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.entry(name, SchemaField::new(ty))
    }

    /// Add or replace a fully specified entry.
    pub fn entry(mut self, name: impl Into<String>, field: SchemaField) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// When `false`, entries without an explicit presence may be missing.
    pub fn with_total(mut self, total: bool) -> Self {
        self.total = total;
        self
    }

    /// Accept unknown keys, converting their values as `ty`.
    pub fn with_default_type(mut self, ty: TypeDescriptor) -> Self {
        self.default_type = Some(ty);
        self
    }

    /// Accept unknown keys and gather them in a map under `key`.
    pub fn with_extra_data_key(mut self, key: impl Into<String>) -> Self {
        self.extra_data_key = Some(key.into());
        self
    }

    /// Copy of this schema with entries merged in. `None` removes the entry.
    pub fn extend<I, K>(&self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<SchemaField>)>,
        K: Into<String>,
    {
        let mut extended = self.clone();
        for (name, field) in entries {
            let name = name.into();
            match field {
                Some(field) => {
                    extended.fields.insert(name, field);
                }
                None => {
                    extended.fields.shift_remove(&name);
                }
            }
        }
        extended
    }

    pub fn is_total(&self) -> bool {
        self.total
    }

    fn presence(&self, field: &SchemaField) -> Presence {
        match &field.presence {
            Some(presence) => presence.clone(),
            None if self.total => Presence::Required,
            None => Presence::Omittable,
        }
    }

    /// Build a converter for this schema against `registry`.
    ///
    /// The converter is not cached; keep it if the schema is used repeatedly.
    pub fn compile(&self, registry: &Registry) -> Result<Converter, UnsupportedTypeError> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for (name, field) in &self.fields {
            fields.push(CompiledEntry {
                name: name.clone(),
                wire_name: field.wire_name.clone().unwrap_or_else(|| name.clone()),
                presence: self.presence(field),
                converter: registry.converter(&field.ty)?,
            });
        }

        let extras = match (&self.default_type, &self.extra_data_key) {
            (None, None) => Extras::Reject,
            (default_type, key) => Extras::Keep {
                converter: registry.converter(default_type.as_ref().unwrap_or(&TypeDescriptor::Any))?,
                into: key.clone(),
            },
        };

        Ok(Converter::new(move |tree, config| {
            convert_object(tree, config, &fields, &extras)
        }))
    }

    /// Compile and convert in one step.
    pub fn convert(&self, registry: &Registry, tree: &Json) -> crate::Result<Value> {
        let converter = self.compile(registry)?;
        Ok(converter.convert_default(tree)?)
    }
}

struct CompiledEntry {
    name: String,
    wire_name: String,
    presence: Presence,
    converter: Converter,
}

enum Extras {
    Reject,
    Keep {
        converter: Converter,
        into: Option<String>,
    },
}

fn convert_object(
    tree: &Json,
    config: &ConversionConfig,
    fields: &[CompiledEntry],
    extras: &Extras,
) -> Result<Value, ConversionError> {
    let object = tree
        .as_object()
        .ok_or_else(|| ConversionError::shape(tree, SCHEMA_TYPE_NAME))?;

    let mut result: IndexMap<String, Value> = IndexMap::with_capacity(fields.len());
    let mut found = 0;
    for field in fields {
        match (object.get(&field.wire_name), &field.presence) {
            (Some(raw), _) => {
                result.insert(field.name.clone(), field.converter.convert(raw, config)?);
                found += 1;
            }
            (None, Presence::Required) => {
                return Err(
                    ConversionError::new(ErrorKind::MissingRequiredField, tree, SCHEMA_TYPE_NAME)
                        .with_detail(format!("Required key not found: {}", field.wire_name)),
                );
            }
            (None, Presence::Default(default)) => {
                result.insert(field.name.clone(), default.clone());
            }
            (None, Presence::Omittable) => {}
        }
    }

    if found < object.len() {
        let unknown = object
            .iter()
            .filter(|(key, _)| !fields.iter().any(|f| &f.wire_name == *key));
        match extras {
            Extras::Reject if config.on_extra_key == OnExtraKey::Error => {
                let keys: Vec<&str> = unknown.map(|(key, _)| key.as_str()).collect();
                return Err(
                    ConversionError::new(ErrorKind::UnexpectedField, tree, SCHEMA_TYPE_NAME)
                        .with_detail(format!("Extra keys: {}", keys.join(", "))),
                );
            }
            Extras::Reject => {}
            Extras::Keep { converter, into } => {
                let mut kept = Vec::new();
                for (key, raw) in unknown {
                    kept.push((key.clone(), converter.convert(raw, config)?));
                }
                match into {
                    Some(into) => {
                        let entries = kept
                            .into_iter()
                            .map(|(key, value)| (Value::String(key), value))
                            .collect();
                        result.insert(into.clone(), Value::Map(entries));
                    }
                    None => result.extend(kept),
                }
            }
        }
    }

    Ok(Value::Map(
        result
            .into_iter()
            .map(|(key, value)| (Value::String(key), value))
            .collect(),
    ))
}
