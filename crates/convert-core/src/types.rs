//! Type descriptors.
//!
//! This module defines `TypeDescriptor`, the immutable description of a
//! conversion target. Descriptors are hashable and compare structurally, so
//! two independently built `List<String>` descriptors are the same cache key.

use std::fmt;
use std::sync::Arc;

use crate::constraint::Constraint;
use crate::schema::{EnumRef, RecordRef};
use crate::variant::VariantRef;

/// Scalar kinds understood natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// `null` only
    Null,
    /// `true` / `false`
    Bool,
    /// Integral numbers
    Int,
    /// Any number; integers are widened
    Float,
    /// Strings
    String,
    /// Base64-encoded strings
    Bytes,
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "Null",
            Self::Bool => "Bool",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::String => "String",
            Self::Bytes => "Bytes",
        };
        f.write_str(name)
    }
}

/// One option of a literal type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for LiteralValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for LiteralValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for LiteralValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Description of a conversion target type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// Anything; the tree is kept as-is
    Any,

    /// Native scalar
    Scalar(ScalarKind),

    /// One of a fixed set of literal values
    Literal(Vec<LiteralValue>),

    /// Declared enum
    Enum(EnumRef),

    /// Ordered homogeneous sequence
    List(Box<TypeDescriptor>),

    /// Unordered homogeneous collection
    Set(Box<TypeDescriptor>),

    /// Fixed-arity tuple, one type per position
    Tuple(Vec<TypeDescriptor>),

    /// Tuple of any length with a single element type
    VarTuple(Box<TypeDescriptor>),

    /// Mapping with typed keys and values
    Map(Box<TypeDescriptor>, Box<TypeDescriptor>),

    /// Declared record
    Record(RecordRef),

    /// Node of a variant family, dispatched on the wire label
    SumType(VariantRef),

    /// First alternative that converts wins
    Union(Vec<TypeDescriptor>),

    /// Base type plus constraints checked after conversion
    Annotated(Box<TypeDescriptor>, Vec<Constraint>),

    /// Alias resolved through the registry's declarations
    Named(Arc<str>),

    /// The innermost record currently being resolved
    SelfRef,

    /// Adapter-provided type, possibly parameterised
    Custom {
        name: Arc<str>,
        args: Vec<TypeDescriptor>,
    },
}

impl TypeDescriptor {
    pub const NULL: Self = Self::Scalar(ScalarKind::Null);
    pub const BOOL: Self = Self::Scalar(ScalarKind::Bool);
    pub const INT: Self = Self::Scalar(ScalarKind::Int);
    pub const FLOAT: Self = Self::Scalar(ScalarKind::Float);
    pub const STRING: Self = Self::Scalar(ScalarKind::String);
    pub const BYTES: Self = Self::Scalar(ScalarKind::Bytes);

    /// `List<element>`
    pub fn list(element: TypeDescriptor) -> Self {
        Self::List(Box::new(element))
    }

    /// `Set<element>`
    pub fn set(element: TypeDescriptor) -> Self {
        Self::Set(Box::new(element))
    }

    /// `Tuple<...>` of fixed arity
    pub fn tuple(elements: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        Self::Tuple(elements.into_iter().collect())
    }

    /// `Tuple<element, ...>`
    pub fn var_tuple(element: TypeDescriptor) -> Self {
        Self::VarTuple(Box::new(element))
    }

    /// `Map<key, value>`
    pub fn map(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    /// Union of alternatives, tried in order.
    pub fn union(alternatives: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        Self::Union(alternatives.into_iter().collect())
    }

    /// `inner | Null`
    pub fn optional(inner: TypeDescriptor) -> Self {
        Self::Union(vec![inner, Self::NULL])
    }

    /// Literal type accepting the given options.
    pub fn literal<I, L>(options: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<LiteralValue>,
    {
        Self::Literal(options.into_iter().map(Into::into).collect())
    }

    /// Alias to a declared name.
    pub fn named(name: &str) -> Self {
        Self::Named(Arc::from(name))
    }

    /// Adapter type without parameters.
    pub fn custom(name: &str) -> Self {
        Self::Custom {
            name: Arc::from(name),
            args: Vec::new(),
        }
    }

    /// Adapter type with parameters.
    pub fn custom_of(name: &str, args: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        Self::Custom {
            name: Arc::from(name),
            args: args.into_iter().collect(),
        }
    }

    /// Attach a constraint. Annotating an annotated type accumulates, so all
    /// constraints run in attachment order.
    pub fn annotate(self, constraint: Constraint) -> Self {
        match self {
            Self::Annotated(base, mut constraints) => {
                constraints.push(constraint);
                Self::Annotated(base, constraints)
            }
            base => Self::Annotated(Box::new(base), vec![constraint]),
        }
    }

    /// Check whether `null` is a legal value of this type without looking
    /// through aliases.
    pub fn permits_absence(&self) -> bool {
        match self {
            Self::Scalar(ScalarKind::Null) => true,
            Self::Literal(options) => options.contains(&LiteralValue::Null),
            Self::Union(alternatives) => alternatives.iter().any(Self::permits_absence),
            Self::Annotated(base, _) => base.permits_absence(),
            _ => false,
        }
    }

    /// Check whether a `SelfRef` occurs anywhere inside this descriptor,
    /// not descending into declared records.
    pub fn contains_self_ref(&self) -> bool {
        match self {
            Self::SelfRef => true,
            Self::List(inner) | Self::Set(inner) | Self::VarTuple(inner) => inner.contains_self_ref(),
            Self::Annotated(inner, _) => inner.contains_self_ref(),
            Self::Map(k, v) => k.contains_self_ref() || v.contains_self_ref(),
            Self::Tuple(items) | Self::Union(items) => items.iter().any(Self::contains_self_ref),
            Self::Custom { args, .. } => args.iter().any(Self::contains_self_ref),
            _ => false,
        }
    }

    /// Whether a closure predicate is attached anywhere in the descriptor,
    /// not descending into declared records.
    pub fn contains_predicate(&self) -> bool {
        match self {
            Self::Annotated(inner, constraints) => {
                constraints.iter().any(Constraint::is_closure) || inner.contains_predicate()
            }
            Self::List(inner) | Self::Set(inner) | Self::VarTuple(inner) => inner.contains_predicate(),
            Self::Map(k, v) => k.contains_predicate() || v.contains_predicate(),
            Self::Tuple(items) | Self::Union(items) => items.iter().any(Self::contains_predicate),
            Self::Custom { args, .. } => args.iter().any(Self::contains_predicate),
            _ => false,
        }
    }

    /// Replace every `SelfRef` with `target`.
    pub fn substitute_self(&self, target: &TypeDescriptor) -> TypeDescriptor {
        if !self.contains_self_ref() {
            return self.clone();
        }
        let sub = |inner: &TypeDescriptor| Box::new(inner.substitute_self(target));
        match self {
            Self::SelfRef => target.clone(),
            Self::List(inner) => Self::List(sub(inner)),
            Self::Set(inner) => Self::Set(sub(inner)),
            Self::VarTuple(inner) => Self::VarTuple(sub(inner)),
            Self::Annotated(inner, constraints) => Self::Annotated(sub(inner), constraints.clone()),
            Self::Map(k, v) => Self::Map(sub(k), sub(v)),
            Self::Tuple(items) => Self::Tuple(items.iter().map(|i| i.substitute_self(target)).collect()),
            Self::Union(items) => Self::Union(items.iter().map(|i| i.substitute_self(target)).collect()),
            Self::Custom { name, args } => Self::Custom {
                name: name.clone(),
                args: args.iter().map(|a| a.substitute_self(target)).collect(),
            },
            other => other.clone(),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[TypeDescriptor], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Scalar(kind) => write!(f, "{kind}"),
            Self::Literal(options) => {
                f.write_str("Literal<")?;
                for (i, option) in options.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{option}")?;
                }
                f.write_str(">")
            }
            Self::Enum(def) => f.write_str(def.name()),
            Self::List(inner) => write!(f, "List<{inner}>"),
            Self::Set(inner) => write!(f, "Set<{inner}>"),
            Self::Tuple(items) => {
                f.write_str("Tuple<")?;
                write_joined(f, items, ", ")?;
                f.write_str(">")
            }
            Self::VarTuple(inner) => write!(f, "Tuple<{inner}, ...>"),
            Self::Map(k, v) => write!(f, "Map<{k}, {v}>"),
            Self::Record(def) => f.write_str(def.name()),
            Self::SumType(variant) => f.write_str(variant.node()),
            Self::Union(items) => write_joined(f, items, " | "),
            Self::Annotated(base, constraints) => {
                write!(f, "{base}")?;
                for constraint in constraints {
                    write!(f, " // {constraint}")?;
                }
                Ok(())
            }
            Self::Named(name) => f.write_str(name),
            Self::SelfRef => f.write_str("Self"),
            Self::Custom { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_str("<")?;
                    write_joined(f, args, ", ")?;
                    f.write_str(">")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_structural_equality_collapses_cache_keys() {
        let mut keys = HashSet::new();
        keys.insert(TypeDescriptor::list(TypeDescriptor::STRING));
        keys.insert(TypeDescriptor::list(TypeDescriptor::STRING));
        keys.insert(TypeDescriptor::list(TypeDescriptor::INT));
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(
            TypeDescriptor::map(TypeDescriptor::STRING, TypeDescriptor::list(TypeDescriptor::INT))
                .to_string(),
            "Map<String, List<Int>>"
        );
        assert_eq!(
            TypeDescriptor::optional(TypeDescriptor::FLOAT).to_string(),
            "Float | Null"
        );
        assert_eq!(
            TypeDescriptor::literal(["A", "B"]).to_string(),
            "Literal<\"A\", \"B\">"
        );
        assert_eq!(
            TypeDescriptor::var_tuple(TypeDescriptor::STRING).to_string(),
            "Tuple<String, ...>"
        );
        assert_eq!(
            TypeDescriptor::custom_of("Deque", [TypeDescriptor::INT]).to_string(),
            "Deque<Int>"
        );
    }

    #[test]
    fn test_annotate_accumulates() {
        let ty = TypeDescriptor::STRING
            .annotate(Constraint::regex("[a]+").unwrap())
            .annotate(Constraint::min_len(5));
        match &ty {
            TypeDescriptor::Annotated(base, constraints) => {
                assert_eq!(**base, TypeDescriptor::STRING);
                assert_eq!(constraints.len(), 2);
            }
            other => panic!("Expected Annotated, got {other:?}"),
        }
        assert_eq!(
            ty.to_string(),
            "String // Regular expression '[a]+' // Length must be at least 5"
        );
    }

    #[test]
    fn test_permits_absence() {
        assert!(TypeDescriptor::optional(TypeDescriptor::INT).permits_absence());
        assert!(TypeDescriptor::NULL.permits_absence());
        assert!(!TypeDescriptor::INT.permits_absence());
        assert!(!TypeDescriptor::Any.permits_absence());
    }

    #[test]
    fn test_substitute_self() {
        let ty = TypeDescriptor::list(TypeDescriptor::SelfRef);
        assert!(ty.contains_self_ref());
        let target = TypeDescriptor::named("Folder");
        assert_eq!(
            ty.substitute_self(&target),
            TypeDescriptor::list(TypeDescriptor::named("Folder"))
        );
        assert!(!TypeDescriptor::INT.contains_self_ref());
    }

    #[test]
    fn test_contains_predicate() {
        let positive = Constraint::predicate("positive", |v| v.as_i64().is_some_and(|i| i > 0));
        let ty = TypeDescriptor::map(TypeDescriptor::STRING, TypeDescriptor::INT.annotate(positive.clone()));
        assert!(ty.contains_predicate());
        assert!(TypeDescriptor::STRING
            .annotate(Constraint::min_len(1).or(positive))
            .contains_predicate());
        assert!(!TypeDescriptor::INT.annotate(Constraint::between(1, 5)).contains_predicate());
        assert!(!TypeDescriptor::list(TypeDescriptor::SelfRef).contains_predicate());
    }
}
