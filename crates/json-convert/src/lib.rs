//! Registry-driven conversions between `convert-core` values and JSON trees.
//!
//! The tree side is `serde_json::Value`. Converting a tree into a value is
//! type-directed: the caller names a [`TypeDescriptor`] and the [`Registry`]
//! builds (once) and caches a [`Converter`] for it. Converting a value into
//! a tree dispatches on the value itself.
//!
//! # Modules
//!
//! - [`registry`] - converter cache, declarations and adapter tables
//! - [`resolver`] - the resolution context handed to adapter factories
//! - [`config`] - per-call conversion options
//! - [`convertible`] - self-converting adapter types
//! - [`standard`] - date, time, UUID and decimal adapters
//! - [`schema`] - ad-hoc object schemas
//!
//! # Example
//!
//! ```ignore
//! use convert_core::{RecordDef, TypeDescriptor};
//! use json_convert::Registry;
//!
//! let brick = RecordDef::builder("Brick")
//!     .field("width", TypeDescriptor::INT)
//!     .field_with_default("color", TypeDescriptor::STRING, "Red")
//!     .build()?;
//!
//! let registry = Registry::global();
//! let value = registry.convert(&serde_json::json!({"width": 2}), &brick.descriptor())?;
//! let tree = registry.to_tree(&value)?;
//! ```
//!
//! [`TypeDescriptor`]: convert_core::TypeDescriptor

mod annotated;
mod container;
mod forward;
mod record;
mod scalar;
mod union;
mod variant;

pub mod config;
pub mod converter;
pub mod convertible;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod standard;

pub use config::{ConversionConfig, OnExtraKey};
pub use converter::{Converter, WeakConverter};
pub use convertible::TreeConvertible;
pub use error::{Error, Result};
pub use registry::{ForwardFn, Registry, ReverseFactory};
pub use resolver::Resolver;
pub use schema::{Schema, SchemaField};
pub use standard::{Date, DateTime, Decimal, Uuid};

/// Install a test-friendly tracing subscriber once per test binary.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    tracing_subscriber::fmt()
        .with_env_filter("json_convert=debug")
        .with_test_writer()
        .try_init()
        .ok(); // Ignore if already initialized
}
