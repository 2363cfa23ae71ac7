//! Reverse converters for containers: lists, sets, tuples and maps.
//!
//! Element converters are resolved when the container converter is built;
//! elements are converted in input order and the first failure is returned
//! unchanged.

use convert_core::{
    ConversionError, ConversionResult, ErrorKind, TypeDescriptor, UnsupportedTypeError, Value,
};
use serde_json::Value as Json;

use crate::config::ConversionConfig;
use crate::converter::Converter;
use crate::resolver::Resolver;

fn elements(
    tree: &Json,
    element: &Converter,
    config: &ConversionConfig,
    type_name: &str,
) -> ConversionResult<Vec<Value>> {
    let items = tree
        .as_array()
        .ok_or_else(|| ConversionError::shape(tree, type_name))?;
    items
        .iter()
        .map(|item| element.convert(item, config))
        .collect()
}

pub(crate) fn list(
    resolver: &mut Resolver<'_>,
    descriptor: &TypeDescriptor,
    element: &TypeDescriptor,
) -> Result<Converter, UnsupportedTypeError> {
    let element = resolver.resolve(element)?;
    let type_name = descriptor.to_string();
    Ok(Converter::new(move |tree, config| {
        elements(tree, &element, config, &type_name).map(Value::List)
    }))
}

/// Variable-arity tuples are sequences producing `Value::Tuple`.
pub(crate) fn var_tuple(
    resolver: &mut Resolver<'_>,
    descriptor: &TypeDescriptor,
    element: &TypeDescriptor,
) -> Result<Converter, UnsupportedTypeError> {
    let element = resolver.resolve(element)?;
    let type_name = descriptor.to_string();
    Ok(Converter::new(move |tree, config| {
        elements(tree, &element, config, &type_name).map(Value::Tuple)
    }))
}

/// Sets arrive as lists; duplicates collapse to their first occurrence.
pub(crate) fn set(
    resolver: &mut Resolver<'_>,
    descriptor: &TypeDescriptor,
    element: &TypeDescriptor,
) -> Result<Converter, UnsupportedTypeError> {
    let element = resolver.resolve(element)?;
    let type_name = descriptor.to_string();
    Ok(Converter::new(move |tree, config| {
        let items = elements(tree, &element, config, &type_name)?;
        let mut members: Vec<Value> = Vec::with_capacity(items.len());
        for item in items {
            if !members.contains(&item) {
                members.push(item);
            }
        }
        Ok(Value::Set(members))
    }))
}

pub(crate) fn tuple(
    resolver: &mut Resolver<'_>,
    descriptor: &TypeDescriptor,
    positions: &[TypeDescriptor],
) -> Result<Converter, UnsupportedTypeError> {
    let positions = positions
        .iter()
        .map(|position| resolver.resolve(position))
        .collect::<Result<Vec<_>, _>>()?;
    let type_name = descriptor.to_string();
    Ok(Converter::new(move |tree, config| {
        let items = tree
            .as_array()
            .ok_or_else(|| ConversionError::shape(tree, &type_name))?;
        if items.len() != positions.len() {
            return Err(ConversionError::new(ErrorKind::ArityMismatch, tree, &type_name)
                .with_detail(format!(
                    "expected {} elements, got {}",
                    positions.len(),
                    items.len()
                )));
        }
        items
            .iter()
            .zip(&positions)
            .map(|(item, converter)| converter.convert(item, config))
            .collect::<ConversionResult<Vec<_>>>()
            .map(Value::Tuple)
    }))
}

/// Maps arrive as objects. Keys go through the key converter as strings;
/// with `parse_map_keys` a rejected key is retried after parsing it as JSON
/// text, so non-string key types round-trip.
pub(crate) fn map(
    resolver: &mut Resolver<'_>,
    descriptor: &TypeDescriptor,
    key: &TypeDescriptor,
    value: &TypeDescriptor,
) -> Result<Converter, UnsupportedTypeError> {
    let key = resolver.resolve(key)?;
    let value = resolver.resolve(value)?;
    let type_name = descriptor.to_string();
    Ok(Converter::new(move |tree, config| {
        let object = tree
            .as_object()
            .ok_or_else(|| ConversionError::shape(tree, &type_name))?;
        let mut entries = Vec::with_capacity(object.len());
        for (raw_key, raw_value) in object {
            let converted_key = convert_key(&key, raw_key, config)?;
            entries.push((converted_key, value.convert(raw_value, config)?));
        }
        Ok(Value::Map(entries))
    }))
}

fn convert_key(key: &Converter, raw: &str, config: &ConversionConfig) -> ConversionResult<Value> {
    let as_string = Json::String(raw.to_string());
    match key.convert(&as_string, config) {
        Ok(converted) => Ok(converted),
        Err(err) if config.parse_map_keys => match serde_json::from_str::<Json>(raw) {
            Ok(parsed) if !parsed.is_string() => key.convert(&parsed, config).map_err(|_| err),
            _ => Err(err),
        },
        Err(err) => Err(err),
    }
}
