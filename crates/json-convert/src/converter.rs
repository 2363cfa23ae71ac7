//! Compiled reverse converters.

use std::fmt;
use std::sync::{Arc, Weak};

use convert_core::{ConversionResult, Value};
use serde_json::Value as Json;

use crate::config::ConversionConfig;

/// Signature of a compiled reverse converter.
pub type ConvertFn = dyn Fn(&Json, &ConversionConfig) -> ConversionResult<Value> + Send + Sync;

/// A compiled tree → value converter.
///
/// Cheap to clone; clones share the same closure.
#[derive(Clone)]
pub struct Converter(Arc<ConvertFn>);

impl Converter {
    /// Wrap a conversion closure.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&Json, &ConversionConfig) -> ConversionResult<Value> + Send + Sync + 'static,
    {
        Self(Arc::new(func))
    }

    /// Convert `tree` under `config`.
    pub fn convert(&self, tree: &Json, config: &ConversionConfig) -> ConversionResult<Value> {
        (self.0)(tree, config)
    }

    /// Convert `tree` under the default configuration.
    pub fn convert_default(&self, tree: &Json) -> ConversionResult<Value> {
        self.convert(tree, &ConversionConfig::default())
    }

    /// Non-owning handle, used by caches that must not keep a converter
    /// alive on their own.
    pub fn downgrade(&self) -> WeakConverter {
        WeakConverter(Arc::downgrade(&self.0))
    }

    /// Check whether both handles share the same closure.
    pub fn ptr_eq(&self, other: &Converter) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Non-owning handle to a [`Converter`].
#[derive(Clone)]
pub struct WeakConverter(Weak<ConvertFn>);

impl WeakConverter {
    /// Get the converter back if it is still alive.
    pub fn upgrade(&self) -> Option<Converter> {
        self.0.upgrade().map(Converter)
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Converter({:p})", Arc::as_ptr(&self.0))
    }
}
