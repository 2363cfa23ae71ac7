//! Conversion-time configuration.

use serde::Deserialize;

/// What to do with unconsumed object keys when a record keeps the default
/// `Error` extra-key policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnExtraKey {
    /// Follow each record's own policy.
    #[default]
    Error,

    /// Drop extra keys for records whose policy is `Error`.
    Ignore,
}

/// Configuration passed to every converter invocation.
///
/// Cached converters never capture a configuration, so the same converter
/// serves every scope.
///
/// # Example
///
/// ```
/// use json_convert::{ConversionConfig, OnExtraKey};
///
/// let config = ConversionConfig::new()
///     .with_on_extra_key(OnExtraKey::Ignore)
///     .with_parse_map_keys(false);
/// assert!(!config.parse_map_keys);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Extra-key handling override.
    pub on_extra_key: OnExtraKey,

    /// Retry map keys rejected as raw strings after parsing them as JSON
    /// scalars, so `Map<Int, _>` accepts `{"1": ...}`.
    pub parse_map_keys: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            on_extra_key: OnExtraKey::Error,
            parse_map_keys: true,
        }
    }
}

impl ConversionConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that ignores extra keys.
    pub fn ignore_extra_keys() -> Self {
        Self::new().with_on_extra_key(OnExtraKey::Ignore)
    }

    /// Set the extra-key override.
    pub fn with_on_extra_key(mut self, on_extra_key: OnExtraKey) -> Self {
        self.on_extra_key = on_extra_key;
        self
    }

    /// Enable or disable parsing of map keys.
    pub fn with_parse_map_keys(mut self, parse_map_keys: bool) -> Self {
        self.parse_map_keys = parse_map_keys;
        self
    }
}
