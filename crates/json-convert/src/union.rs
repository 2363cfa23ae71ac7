//! Reverse converter for unions.

use convert_core::{ConversionError, TypeDescriptor, UnsupportedTypeError, Value};

use crate::converter::Converter;
use crate::resolver::Resolver;

/// Alternatives are tried in declaration order and the first success wins.
/// When the union admits `null`, a `null` input short-circuits to
/// `Value::Null`. Per-alternative failures are replaced by one error naming
/// the whole union.
pub(crate) fn resolve(
    resolver: &mut Resolver<'_>,
    descriptor: &TypeDescriptor,
    alternatives: &[TypeDescriptor],
) -> Result<Converter, UnsupportedTypeError> {
    let nullable = alternatives
        .iter()
        .any(|alt| resolver.registry().permits_absence(alt));
    let alternatives = alternatives
        .iter()
        .map(|alt| resolver.resolve(alt))
        .collect::<Result<Vec<_>, _>>()?;
    let type_name = descriptor.to_string();

    Ok(Converter::new(move |tree, config| {
        if nullable && tree.is_null() {
            return Ok(Value::Null);
        }
        alternatives
            .iter()
            .find_map(|alt| alt.convert(tree, config).ok())
            .ok_or_else(|| ConversionError::shape(tree, &type_name).with_detail("no alternative matched"))
    }))
}
