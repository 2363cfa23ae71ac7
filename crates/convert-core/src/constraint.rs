//! Validation constraints attached to types.
//!
//! A constraint is a predicate over a *converted* [`Value`] plus a
//! human-readable name used in the violation message. Constraints are attached
//! to a type with [`TypeDescriptor::annotate`](crate::types::TypeDescriptor::annotate)
//! and compose with [`Constraint::or`].

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use regex::Regex;

use crate::values::{compare_values, Value};

/// Predicate function used by [`Constraint::Predicate`].
pub type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// A bound of a range constraint.
#[derive(Debug, Clone)]
pub enum Bound {
    Int(i64),
    Float(f64),
    String(String),
}

impl Bound {
    fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::Int(*i),
            Self::Float(f) => Value::Float(*f),
            Self::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl PartialEq for Bound {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Bound {}

impl Hash for Bound {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Int(i) => i.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::String(s) => s.hash(state),
        }
    }
}

impl From<i64> for Bound {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Bound {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for Bound {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Bound {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// Regular expression that must match the whole stringified value.
#[derive(Clone)]
pub struct FullMatch {
    pattern: String,
    regex: Regex,
}

impl FullMatch {
    /// The pattern as given by the caller.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Debug for FullMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FullMatch({:?})", self.pattern)
    }
}

/// A validation constraint.
#[derive(Clone)]
pub enum Constraint {
    /// Orderable value within `min..=max`; either bound may be omitted.
    Range {
        min: Option<Bound>,
        max: Option<Bound>,
    },

    /// Length of the value within `min..=max`; either bound may be omitted.
    Len {
        min: Option<usize>,
        max: Option<usize>,
    },

    /// Full match of a regular expression against the stringified value.
    Regex(FullMatch),

    /// Arbitrary predicate.
    Predicate {
        name: Option<String>,
        func: PredicateFn,
    },

    /// Passes when either side passes.
    Or(Box<Constraint>, Box<Constraint>),
}

impl Constraint {
    /// Value in `min..=max`, bounds optional.
    pub fn range(min: Option<Bound>, max: Option<Bound>) -> Self {
        Self::Range { min, max }
    }

    /// Value at least `min`.
    pub fn min(min: impl Into<Bound>) -> Self {
        Self::range(Some(min.into()), None)
    }

    /// Value at most `max`.
    pub fn max(max: impl Into<Bound>) -> Self {
        Self::range(None, Some(max.into()))
    }

    /// Value in `min..=max`.
    pub fn between(min: impl Into<Bound>, max: impl Into<Bound>) -> Self {
        Self::range(Some(min.into()), Some(max.into()))
    }

    /// Length in `min..=max`, bounds optional.
    pub fn len(min: Option<usize>, max: Option<usize>) -> Self {
        Self::Len { min, max }
    }

    /// Length at least `min`.
    pub fn min_len(min: usize) -> Self {
        Self::len(Some(min), None)
    }

    /// Length at most `max`.
    pub fn max_len(max: usize) -> Self {
        Self::len(None, Some(max))
    }

    /// Whole stringified value matches `pattern`.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self::Regex(FullMatch {
            pattern: pattern.to_string(),
            regex,
        }))
    }

    /// Named predicate.
    pub fn predicate<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::Predicate {
            name: Some(name.into()),
            func: Arc::new(func),
        }
    }

    /// Predicate without a name; violations report "Violates a constraint".
    pub fn anonymous<F>(func: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::Predicate {
            name: None,
            func: Arc::new(func),
        }
    }

    /// Combine with logical OR.
    pub fn or(self, other: Constraint) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Whether the constraint holds a caller-supplied closure anywhere.
    ///
    /// Closures compare by identity, so descriptors carrying one never
    /// collapse with a rebuilt copy.
    pub fn is_closure(&self) -> bool {
        match self {
            Self::Predicate { .. } => true,
            Self::Or(a, b) => a.is_closure() || b.is_closure(),
            _ => false,
        }
    }

    /// Evaluate the constraint against a converted value.
    ///
    /// Values the constraint cannot be applied to (a length check on an
    /// integer, a range check across incomparable kinds) fail the check.
    pub fn evaluate(&self, value: &Value) -> bool {
        match self {
            Self::Range { min, max } => {
                let above = min.as_ref().is_none_or(|min| {
                    matches!(
                        compare_values(value, &min.to_value()),
                        Some(Ordering::Greater | Ordering::Equal)
                    )
                });
                let below = max.as_ref().is_none_or(|max| {
                    matches!(
                        compare_values(value, &max.to_value()),
                        Some(Ordering::Less | Ordering::Equal)
                    )
                });
                above && below
            }
            Self::Len { min, max } => match value.len() {
                Some(len) => min.is_none_or(|min| len >= min) && max.is_none_or(|max| len <= max),
                None => false,
            },
            Self::Regex(full) => match stringify(value) {
                Some(text) => full.regex.is_match(&text),
                None => false,
            },
            Self::Predicate { func, .. } => func(value),
            Self::Or(a, b) => a.evaluate(value) || b.evaluate(value),
        }
    }

    /// Human-readable name, if the constraint has one.
    pub fn name(&self) -> Option<String> {
        match self {
            Self::Range { min, max } => Some(range_name("Value", min.as_ref(), max.as_ref())),
            Self::Len { min, max } => Some(range_name("Length", min.as_ref(), max.as_ref())),
            Self::Regex(full) => Some(format!("Regular expression '{}'", full.pattern)),
            Self::Predicate { name, .. } => name.clone(),
            Self::Or(a, b) => match (a.name(), b.name()) {
                (Some(a), Some(b)) => Some(format!("{a} or {b}")),
                _ => None,
            },
        }
    }

    /// Detail string reported when the constraint is violated.
    pub fn violation_message(&self) -> String {
        match self.name() {
            Some(name) => format!("Violates constraint: {name}"),
            None => "Violates a constraint".to_string(),
        }
    }
}

fn range_name<T: fmt::Display>(subject: &str, min: Option<&T>, max: Option<&T>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{subject} must be in range {min}..{max}"),
        (Some(min), None) => format!("{subject} must be at least {min}"),
        (None, Some(max)) => format!("{subject} must be at most {max}"),
        (None, None) => format!("{subject} is unconstrained"),
    }
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Enum(e) => Some(e.member.clone()),
        Value::Tree(serde_json::Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(&name),
            None => f.write_str("<constraint>"),
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range { min, max } => f
                .debug_struct("Range")
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::Len { min, max } => f
                .debug_struct("Len")
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::Regex(full) => fmt::Debug::fmt(full, f),
            Self::Predicate { name, .. } => f.debug_struct("Predicate").field("name", name).finish(),
            Self::Or(a, b) => f.debug_tuple("Or").field(a).field(b).finish(),
        }
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Range { min: a, max: b }, Self::Range { min: c, max: d }) => a == c && b == d,
            (Self::Len { min: a, max: b }, Self::Len { min: c, max: d }) => a == c && b == d,
            (Self::Regex(a), Self::Regex(b)) => a.pattern == b.pattern,
            (Self::Predicate { name: a, func: f }, Self::Predicate { name: b, func: g }) => {
                a == b && Arc::ptr_eq(f, g)
            }
            (Self::Or(a, b), Self::Or(c, d)) => a == c && b == d,
            _ => false,
        }
    }
}

impl Eq for Constraint {}

impl Hash for Constraint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Range { min, max } => {
                min.hash(state);
                max.hash(state);
            }
            Self::Len { min, max } => {
                min.hash(state);
                max.hash(state);
            }
            Self::Regex(full) => full.pattern.hash(state),
            Self::Predicate { name, .. } => name.hash(state),
            Self::Or(a, b) => {
                a.hash(state);
                b.hash(state);
            }
        }
    }
}
