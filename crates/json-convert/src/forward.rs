//! Forward conversion: Value → JSON tree.
//!
//! Dispatch is on the runtime shape of the value. Custom values go to the
//! forward adapter registered for their exact type first, then to their
//! capabilities in the order map, sequence, set.

use std::borrow::Cow;
use std::cmp::Ordering;

use base64::Engine;
use convert_core::{
    compare_values, CustomValue, EnumValue, ExtraKeyPolicy, Presence, RecordValue,
    UnsupportedTypeError, Value,
};
use serde_json::{Map, Number, Value as Json};

use crate::registry::Registry;

type Result<T> = std::result::Result<T, UnsupportedTypeError>;

/// Convert `value` to a tree. `Value::Tree` data is already tree-shaped and
/// comes back borrowed, without a copy.
pub fn to_tree<'a>(registry: &Registry, value: &'a Value) -> Result<Cow<'a, Json>> {
    match value {
        Value::Tree(tree) => Ok(Cow::Borrowed(tree)),
        other => owned(registry, other).map(Cow::Owned),
    }
}

fn owned(registry: &Registry, value: &Value) -> Result<Json> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => Number::from_f64(*f).map(Json::Number).ok_or_else(|| {
            UnsupportedTypeError::new("Float").with_detail(format!("{f} has no tree form"))
        })?,
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(bytes) => Json::String(base64::engine::general_purpose::STANDARD.encode(bytes)),
        Value::List(items) | Value::Tuple(items) => array(registry, items.iter())?,
        Value::Set(members) => array(registry, sorted(members).into_iter())?,
        Value::Map(entries) => Json::Object(object(registry, entries.iter().map(|(k, v)| (k, v)))?),
        Value::Record(record) => Json::Object(record_object(registry, record)?),
        Value::Enum(value) => enum_tree(value)?,
        Value::Custom(custom) => custom_tree(registry, custom.as_ref())?,
        Value::Tree(tree) => tree.clone(),
    })
}

fn array<'v>(registry: &Registry, items: impl Iterator<Item = &'v Value>) -> Result<Json> {
    items
        .map(|item| to_tree(registry, item).map(Cow::into_owned))
        .collect::<Result<Vec<_>>>()
        .map(Json::Array)
}

/// Set members in a deterministic order when they are pairwise orderable,
/// otherwise in their stored order.
fn sorted(members: &[Value]) -> Vec<&Value> {
    let mut items: Vec<&Value> = members.iter().collect();
    if orderable(&items) {
        items.sort_by(|a, b| compare_values(a, b).unwrap_or(Ordering::Equal));
    }
    items
}

fn orderable(items: &[&Value]) -> bool {
    let Some(first) = items.first() else {
        return true;
    };
    if items.iter().any(|item| matches!(item, Value::Tuple(_))) {
        return items
            .iter()
            .enumerate()
            .all(|(i, a)| items[i + 1..].iter().all(|b| compare_values(a, b).is_some()));
    }
    items.iter().all(|item| compare_values(item, first).is_some())
}

/// Keys that are strings stay as-is; any other key is written as the JSON
/// text of its own tree form.
fn key_string(registry: &Registry, key: &Value) -> Result<String> {
    if let Value::String(s) = key {
        return Ok(s.clone());
    }
    Ok(match to_tree(registry, key)?.as_ref() {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn object<'v>(
    registry: &Registry,
    entries: impl Iterator<Item = (&'v Value, &'v Value)>,
) -> Result<Map<String, Json>> {
    let mut object = Map::new();
    for (key, value) in entries {
        object.insert(
            key_string(registry, key)?,
            to_tree(registry, value)?.into_owned(),
        );
    }
    Ok(object)
}

/// Fields are written under their wire names. A null field is left out when
/// its declared type admits null; a missing required field is an error. Tagged records carry their primary label
/// unless they declare the label key themselves.
fn record_object(registry: &Registry, record: &RecordValue) -> Result<Map<String, Json>> {
    let def = &record.def;
    let mut object = Map::new();

    if let Some(tag) = def.tag() {
        if !def.declares_wire_name(&tag.label_field) {
            object.insert(
                tag.label_field.clone(),
                Json::String(tag.primary_label().to_string()),
            );
        }
    }

    for field in def.fields() {
        let Some(value) = record.get(&field.name) else {
            if matches!(field.presence, Presence::Required) {
                return Err(UnsupportedTypeError::new(def.name())
                    .with_detail(format!("missing field '{}'", field.name)));
            }
            continue;
        };
        if value.is_null() && registry.permits_absence(&field.ty) {
            continue;
        }
        object.insert(
            field.wire_name.clone(),
            to_tree(registry, value)?.into_owned(),
        );
    }

    if let ExtraKeyPolicy::CollectInto { field, .. } = def.extra_keys() {
        if let Some(Value::Map(entries)) = record.get(field) {
            for (key, value) in entries {
                let key = key_string(registry, key)?;
                if !object.contains_key(&key) {
                    object.insert(key, to_tree(registry, value)?.into_owned());
                }
            }
        }
    }

    Ok(object)
}

fn enum_tree(value: &EnumValue) -> Result<Json> {
    let member = value.def.member(&value.member).ok_or_else(|| {
        UnsupportedTypeError::new(value.def.name())
            .with_detail(format!("'{}' is not a member", value.member))
    })?;
    Ok(match member.value {
        Some(number) => Json::from(number),
        None => Json::String(member.name.clone()),
    })
}

fn custom_tree(registry: &Registry, custom: &dyn CustomValue) -> Result<Json> {
    if let Some(adapter) = registry.forward_adapter(custom.concrete_type_id()) {
        return adapter(custom, registry);
    }
    if let Some(map) = custom.as_map_like() {
        let entries = map.map_entries();
        return object(registry, entries.iter().map(|(k, v)| (k, v))).map(Json::Object);
    }
    if let Some(sequence) = custom.as_sequence_like() {
        return array(registry, sequence.sequence_items().iter());
    }
    if let Some(set) = custom.as_set_like() {
        let members = set.set_members();
        return array(registry, sorted(&members).into_iter());
    }
    Err(UnsupportedTypeError::new(custom.type_name()))
}
