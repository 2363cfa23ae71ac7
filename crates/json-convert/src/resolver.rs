//! Converter resolution.
//!
//! A [`Resolver`] is the explicit context of one converter build. It tracks
//! the descriptors currently under construction and the stack of record
//! types that `SelfRef` refers to. Meeting a descriptor that is already under
//! construction yields a deferred converter that resolves through the
//! registry when first called; deferred converters are never cached.

use std::borrow::Cow;
use std::sync::Arc;

use convert_core::{ConversionError, ErrorKind, TypeDescriptor, UnsupportedTypeError};

use crate::converter::Converter;
use crate::error::unsupported_at_runtime;
use crate::registry::Registry;
use crate::{annotated, container, record, scalar, union, variant};

/// Resolution context handed to resolvers and reverse factories.
pub struct Resolver<'r> {
    registry: &'r Registry,
    in_progress: Vec<TypeDescriptor>,
    self_types: Vec<TypeDescriptor>,
}

impl<'r> Resolver<'r> {
    pub(crate) fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            in_progress: Vec::new(),
            self_types: Vec::new(),
        }
    }

    /// The registry being resolved against.
    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    /// The record type `SelfRef` currently stands for.
    pub fn self_type(&self) -> Option<&TypeDescriptor> {
        self.self_types.last()
    }

    /// Check whether `descriptor` (normalized) is being built further up.
    pub fn is_in_progress(&self, descriptor: &TypeDescriptor) -> bool {
        self.in_progress.contains(descriptor)
    }

    /// Unwrap declared names and replace `SelfRef` with the current self
    /// type. Annotations are kept.
    ///
    /// Names nested inside containers, unions and custom arguments are
    /// expanded as well, so `List<Node>` and `List<Named("Node")>` share one
    /// cache entry. A name whose expansion leads back to itself stays a name.
    pub fn normalize(
        &self,
        descriptor: &TypeDescriptor,
    ) -> Result<TypeDescriptor, UnsupportedTypeError> {
        let mut current = Cow::Borrowed(descriptor);
        let mut names: Vec<Arc<str>> = Vec::new();
        loop {
            match current.as_ref() {
                TypeDescriptor::Named(name) => {
                    if names.contains(name) || names.len() >= Registry::max_alias_depth() {
                        return Err(UnsupportedTypeError::new(name)
                            .with_detail("declaration chain does not terminate"));
                    }
                    let target = self.lookup(name)?;
                    names.push(name.clone());
                    current = Cow::Owned(target);
                }
                TypeDescriptor::SelfRef => current = Cow::Owned(self.require_self_type()?.clone()),
                _ => break,
            }
        }

        let expanded = match self.expand(&current, &mut names, false)? {
            Some(expanded) => expanded,
            None => current.into_owned(),
        };
        if expanded.contains_self_ref() {
            let target = self.require_self_type()?;
            return Ok(expanded.substitute_self(target));
        }
        Ok(expanded)
    }

    fn lookup(&self, name: &Arc<str>) -> Result<TypeDescriptor, UnsupportedTypeError> {
        self.registry
            .declaration(name)
            .ok_or_else(|| UnsupportedTypeError::new(name).with_detail("undeclared name"))
    }

    /// Inline nested names. `stack` holds the names being expanded; in
    /// `strict` mode meeting one of them returns `None` so the enclosing
    /// name is kept instead of growing a new key on every level.
    fn expand(
        &self,
        descriptor: &TypeDescriptor,
        stack: &mut Vec<Arc<str>>,
        strict: bool,
    ) -> Result<Option<TypeDescriptor>, UnsupportedTypeError> {
        let boxed = |inner: &TypeDescriptor, stack: &mut Vec<Arc<str>>| {
            self.expand(inner, stack, strict).map(|e| e.map(Box::new))
        };
        let many = |items: &[TypeDescriptor], stack: &mut Vec<Arc<str>>| {
            items
                .iter()
                .map(|item| self.expand(item, stack, strict))
                .collect::<Result<Option<Vec<_>>, _>>()
        };
        let expanded = match descriptor {
            TypeDescriptor::Named(name) => {
                if stack.contains(name) {
                    return Ok((!strict).then(|| descriptor.clone()));
                }
                let target = self.lookup(name)?;
                stack.push(name.clone());
                let inlined = self.expand(&target, stack, true);
                stack.pop();
                match inlined? {
                    Some(inlined) => Some(inlined),
                    None if strict => None,
                    None => Some(descriptor.clone()),
                }
            }
            TypeDescriptor::List(inner) => boxed(inner, stack)?.map(TypeDescriptor::List),
            TypeDescriptor::Set(inner) => boxed(inner, stack)?.map(TypeDescriptor::Set),
            TypeDescriptor::VarTuple(inner) => boxed(inner, stack)?.map(TypeDescriptor::VarTuple),
            TypeDescriptor::Map(k, v) => match (boxed(k, stack)?, boxed(v, stack)?) {
                (Some(k), Some(v)) => Some(TypeDescriptor::Map(k, v)),
                _ => None,
            },
            TypeDescriptor::Tuple(items) => many(items, stack)?.map(TypeDescriptor::Tuple),
            TypeDescriptor::Union(items) => many(items, stack)?.map(TypeDescriptor::Union),
            TypeDescriptor::Annotated(base, constraints) => boxed(base, stack)?
                .map(|base| TypeDescriptor::Annotated(base, constraints.clone())),
            TypeDescriptor::Custom { name, args } => {
                many(args, stack)?.map(|args| TypeDescriptor::Custom {
                    name: name.clone(),
                    args,
                })
            }
            other => Some(other.clone()),
        };
        Ok(expanded)
    }

    fn require_self_type(&self) -> Result<&TypeDescriptor, UnsupportedTypeError> {
        self.self_type().ok_or_else(|| {
            UnsupportedTypeError::new(TypeDescriptor::SelfRef).with_detail("used outside a record")
        })
    }

    /// Resolve the converter for `descriptor`, building and caching it if
    /// needed. Descriptors carrying closure predicates are built fresh each
    /// time.
    pub fn resolve(&mut self, descriptor: &TypeDescriptor) -> Result<Converter, UnsupportedTypeError> {
        let key = self.normalize(descriptor)?;
        if let Some(hit) = self.registry.cached(&key) {
            tracing::trace!("Converter cache hit for {key}");
            return Ok(hit);
        }
        if self.is_in_progress(&key) {
            tracing::debug!("Deferring converter for self-referencing {key}");
            return Ok(self.deferred(key));
        }

        tracing::debug!("Building converter for {key}");
        self.in_progress.push(key.clone());
        let built = self.build(&key);
        self.in_progress.pop();

        let converter = built?;
        if key.contains_predicate() {
            tracing::trace!("Not caching converter for {key}: closure predicates compare by identity");
        } else {
            self.registry.store(key, converter.clone());
        }
        Ok(converter)
    }

    fn build(&mut self, descriptor: &TypeDescriptor) -> Result<Converter, UnsupportedTypeError> {
        match descriptor {
            TypeDescriptor::Any => Ok(scalar::any()),
            TypeDescriptor::Scalar(kind) => Ok(scalar::scalar(*kind)),
            TypeDescriptor::Literal(options) => Ok(scalar::literal(descriptor, options)),
            TypeDescriptor::Enum(def) => Ok(scalar::enumeration(def)),
            TypeDescriptor::List(element) => container::list(self, descriptor, element),
            TypeDescriptor::Set(element) => container::set(self, descriptor, element),
            TypeDescriptor::Tuple(elements) => container::tuple(self, descriptor, elements),
            TypeDescriptor::VarTuple(element) => container::var_tuple(self, descriptor, element),
            TypeDescriptor::Map(key, value) => container::map(self, descriptor, key, value),
            TypeDescriptor::Record(def) => {
                if let Some(factory) = self.registry.reverse_factory(def.name()) {
                    return factory(descriptor, self);
                }
                self.self_types.push(descriptor.clone());
                let built = record::resolve(self, def);
                self.self_types.pop();
                built
            }
            TypeDescriptor::SumType(node) => Ok(variant::resolve(self, node)),
            TypeDescriptor::Union(alternatives) => union::resolve(self, descriptor, alternatives),
            TypeDescriptor::Annotated(base, constraints) => {
                annotated::resolve(self, descriptor, base, constraints)
            }
            TypeDescriptor::Custom { name, .. } => match self.registry.reverse_factory(name) {
                Some(factory) => factory(descriptor, self),
                None => Err(UnsupportedTypeError::new(descriptor)),
            },
            TypeDescriptor::Named(_) | TypeDescriptor::SelfRef => {
                Err(UnsupportedTypeError::new(descriptor).with_detail("descriptor was not normalized"))
            }
        }
    }

    /// Converter that looks `descriptor` up through the registry on every
    /// call. Holds the registry weakly, so it never keeps it alive.
    fn deferred(&self, descriptor: TypeDescriptor) -> Converter {
        let registry = self.registry.downgrade();
        let type_name = descriptor.to_string();
        Converter::new(move |tree, config| {
            let Some(registry) = registry.upgrade() else {
                tracing::warn!("Deferred converter for {type_name} outlived its registry");
                return Err(ConversionError::new(ErrorKind::UnsupportedType, tree, &type_name)
                    .with_detail("registry was dropped"));
            };
            let converter = registry
                .converter(&descriptor)
                .map_err(|err| unsupported_at_runtime(tree, &type_name, err))?;
            converter.convert(tree, config)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convert_core::{RecordDef, Value};
    use serde_json::json;

    #[test]
    fn test_self_ref_outside_record_is_unsupported() {
        let registry = Registry::new();
        let err = registry
            .converter(&TypeDescriptor::list(TypeDescriptor::SelfRef))
            .unwrap_err();
        assert_eq!(err.detail.as_deref(), Some("used outside a record"));
    }

    #[test]
    fn test_alias_cycle_is_unsupported() {
        let registry = Registry::new();
        registry.declare("A", TypeDescriptor::named("B"));
        registry.declare("B", TypeDescriptor::named("A"));
        let err = registry.converter(&TypeDescriptor::named("A")).unwrap_err();
        assert_eq!(
            err.detail.as_deref(),
            Some("declaration chain does not terminate")
        );
    }

    #[test]
    fn test_self_reference_resolves_lazily() {
        let registry = Registry::new();
        let folder = RecordDef::builder("Folder")
            .field("name", TypeDescriptor::STRING)
            .field("subfolders", TypeDescriptor::list(TypeDescriptor::SelfRef))
            .build()
            .unwrap();

        let converter = registry.converter(&folder.descriptor()).unwrap();
        let value = converter
            .convert_default(&json!({
                "name": "main",
                "subfolders": [{"name": "sub", "subfolders": []}]
            }))
            .unwrap();

        let record = value.as_record().unwrap();
        let subfolders = record.get("subfolders").and_then(Value::as_slice).unwrap();
        assert_eq!(subfolders.len(), 1);
        let sub = subfolders[0].as_record().unwrap();
        assert_eq!(sub.get("name"), Some(&Value::string("sub")));
    }

    #[test]
    fn test_deferred_converter_outliving_registry() {
        let folder = RecordDef::builder("Node")
            .field("children", TypeDescriptor::list(TypeDescriptor::SelfRef))
            .build()
            .unwrap();
        let converter = {
            let registry = Registry::new();
            registry.converter(&folder.descriptor()).unwrap()
        };
        let err = converter
            .convert_default(&json!({"children": [{"children": []}]}))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedType);
        assert_eq!(err.type_name, "Node");
    }

    #[test]
    fn test_nested_names_share_the_record_entry() {
        crate::init_test_logging();
        let registry = Registry::new();
        let node = RecordDef::builder("Node")
            .field("value", TypeDescriptor::INT)
            .build()
            .unwrap();
        registry.declare_record(&node);

        let named = registry
            .converter(&TypeDescriptor::list(TypeDescriptor::named("Node")))
            .unwrap();
        let direct = registry
            .converter(&TypeDescriptor::list(node.descriptor()))
            .unwrap();
        assert!(named.ptr_eq(&direct));

        let resolver = Resolver::new(&registry);
        assert_eq!(
            resolver
                .normalize(&TypeDescriptor::map(
                    TypeDescriptor::STRING,
                    TypeDescriptor::optional(TypeDescriptor::named("Node"))
                ))
                .unwrap(),
            TypeDescriptor::map(TypeDescriptor::STRING, TypeDescriptor::optional(node.descriptor()))
        );
    }

    #[test]
    fn test_recursive_alias_keeps_a_stable_key() {
        let registry = Registry::new();
        registry.declare(
            "Json",
            TypeDescriptor::union([
                TypeDescriptor::INT,
                TypeDescriptor::STRING,
                TypeDescriptor::list(TypeDescriptor::named("Json")),
                TypeDescriptor::map(TypeDescriptor::STRING, TypeDescriptor::named("Json")),
            ]),
        );
        let ty = TypeDescriptor::named("Json");
        let resolver = Resolver::new(&registry);
        let key = resolver.normalize(&ty).unwrap();
        assert_eq!(resolver.normalize(&key).unwrap(), key);
        assert_eq!(
            resolver
                .normalize(&TypeDescriptor::list(ty.clone()))
                .unwrap(),
            TypeDescriptor::list(ty.clone())
        );

        let value = registry
            .convert(&json!({"a": [1, "x", {"b": []}]}), &ty)
            .unwrap();
        let items = value.get_key("a").and_then(Value::as_slice).unwrap();
        assert_eq!(items[0], Value::Int(1));
        assert_eq!(items[1], Value::string("x"));
        assert!(items[2].get_key("b").is_some());

        let cached = registry.cached_count();
        registry.convert(&json!([[[[1]]]]), &ty).unwrap();
        assert_eq!(registry.cached_count(), cached);
    }

    #[test]
    fn test_undeclared_nested_name_is_unsupported() {
        let registry = Registry::new();
        let err = registry
            .converter(&TypeDescriptor::list(TypeDescriptor::named("Missing")))
            .unwrap_err();
        assert_eq!(err.type_name, "Missing");
        assert_eq!(err.detail.as_deref(), Some("undeclared name"));
    }
}
