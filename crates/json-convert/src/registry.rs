//! The converter registry.
//!
//! A [`Registry`] owns everything conversions are resolved against:
//!
//! - the converter cache, keyed by normalized [`TypeDescriptor`]
//! - named declarations used by [`TypeDescriptor::Named`]
//! - reverse factories for adapter types, keyed by type name
//! - forward adapters, keyed by the concrete Rust type of a custom value
//!
//! Cache reads never lock. A miss takes the build lock (non-blocking first,
//! blocking when contended), checks the cache again and builds the converter
//! through a [`Resolver`]. Every reverse registration and declaration clears
//! the cache while holding the build lock, so a rebuild never observes a
//! half-applied registration.

use std::any::TypeId;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use convert_core::{
    CustomValue, RecordRef, TypeDescriptor, UnsupportedTypeError, Value, VariantFamily,
};
use dashmap::DashMap;
use parking_lot::{ReentrantMutex, RwLock};
use serde_json::Value as Json;

use crate::config::ConversionConfig;
use crate::convertible::TreeConvertible;
use crate::converter::Converter;
use crate::error::Result;
use crate::forward;
use crate::resolver::Resolver;

/// Forward adapter for one concrete custom value type.
pub type ForwardFn =
    Arc<dyn Fn(&dyn CustomValue, &Registry) -> std::result::Result<Json, UnsupportedTypeError> + Send + Sync>;

/// Reverse factory: receives the fully parameterised descriptor and builds a
/// converter, requesting converters for nested descriptors through the
/// resolver.
pub type ReverseFactory = Arc<
    dyn Fn(&TypeDescriptor, &mut Resolver<'_>) -> std::result::Result<Converter, UnsupportedTypeError>
        + Send
        + Sync,
>;

const MAX_ALIAS_DEPTH: usize = 64;

pub(crate) struct Inner {
    cache: DashMap<TypeDescriptor, Converter>,
    build_lock: ReentrantMutex<()>,
    declarations: RwLock<HashMap<Arc<str>, TypeDescriptor>>,
    reverse: RwLock<HashMap<String, ReverseFactory>>,
    forward: RwLock<HashMap<TypeId, ForwardFn>>,
    epoch: AtomicU64,
}

/// Shared handle to a converter registry.
///
/// Clones share the same tables. Most programs use [`Registry::global`];
/// separate registries are useful in tests and for isolated type universes.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

/// Non-owning registry handle held by converters that resolve lazily.
#[derive(Clone)]
pub(crate) struct WeakRegistry(Weak<Inner>);

impl WeakRegistry {
    pub(crate) fn upgrade(&self) -> Option<Registry> {
        self.0.upgrade().map(|inner| Registry { inner })
    }
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry. Built-in descriptor kinds need no
    /// registration; adapter types do.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                cache: DashMap::new(),
                build_lock: ReentrantMutex::new(()),
                declarations: RwLock::new(HashMap::new()),
                reverse: RwLock::new(HashMap::new()),
                forward: RwLock::new(HashMap::new()),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Create a registry with the standard adapters installed.
    pub fn with_standard_adapters() -> Self {
        let registry = Self::new();
        crate::standard::install(&registry);
        registry
    }

    /// The process-wide registry, created with the standard adapters on
    /// first use.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Self::with_standard_adapters)
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.inner))
    }

    /// Counter bumped on every invalidation.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::Acquire)
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Declare `name` as an alias for `descriptor`.
    pub fn declare(&self, name: &str, descriptor: TypeDescriptor) {
        self.mutate(|inner| {
            inner
                .declarations
                .write()
                .insert(Arc::from(name), descriptor);
        });
        tracing::debug!("Declared type '{name}'");
    }

    /// Declare a record under its own name.
    pub fn declare_record(&self, record: &RecordRef) {
        self.declare(record.name(), record.descriptor());
    }

    /// Declare a variant family under its root name.
    pub fn declare_family(&self, family: &Arc<VariantFamily>) {
        self.declare(family.name(), family.descriptor());
    }

    /// Look up a declaration.
    pub fn declaration(&self, name: &str) -> Option<TypeDescriptor> {
        self.inner.declarations.read().get(name).cloned()
    }

    /// Register a reverse factory for the adapter type `name`.
    ///
    /// The factory handles `Custom { name, .. }` descriptors and overrides
    /// the built-in resolver for a record of the same name. A later
    /// registration under the same name replaces the earlier one.
    pub fn register_reverse<F>(&self, name: &str, factory: F)
    where
        F: Fn(&TypeDescriptor, &mut Resolver<'_>) -> std::result::Result<Converter, UnsupportedTypeError>
            + Send
            + Sync
            + 'static,
    {
        let factory: ReverseFactory = Arc::new(factory);
        self.mutate(|inner| {
            inner.reverse.write().insert(name.to_string(), factory);
        });
        tracing::debug!("Registered reverse factory for '{name}'");
    }

    /// Register a forward adapter for the concrete custom type `T`.
    ///
    /// A later registration for the same type replaces the earlier one.
    /// Forward adapters are consulted at conversion time, so the converter
    /// cache is left alone.
    pub fn register_forward<T, F>(&self, adapter: F)
    where
        T: CustomValue,
        F: Fn(&T, &Registry) -> std::result::Result<Json, UnsupportedTypeError> + Send + Sync + 'static,
    {
        let forward: ForwardFn = Arc::new(move |value, registry| match value.downcast_ref::<T>() {
            Some(value) => adapter(value, registry),
            None => Err(UnsupportedTypeError::new(value.type_name())),
        });
        self.inner.forward.write().insert(TypeId::of::<T>(), forward);
        tracing::debug!(
            "Registered forward adapter for '{}'",
            std::any::type_name::<T>()
        );
    }

    /// Register both directions for a type converting itself.
    pub fn register_convertible<T: TreeConvertible>(&self) {
        crate::convertible::register::<T>(self);
    }

    /// Drop every cached converter.
    ///
    /// Needed after changing state the registry cannot observe, such as a
    /// reverse factory's captured data. Registrations made through this
    /// registry invalidate on their own.
    pub fn invalidate(&self) {
        self.mutate(|_| {});
    }

    fn mutate(&self, change: impl FnOnce(&Inner)) {
        let _guard = self.inner.build_lock.lock();
        change(&self.inner);
        let dropped = self.inner.cache.len();
        self.inner.cache.clear();
        self.inner.epoch.fetch_add(1, Ordering::AcqRel);
        tracing::debug!("Invalidated converter cache ({dropped} entries)");
    }

    pub(crate) fn reverse_factory(&self, name: &str) -> Option<ReverseFactory> {
        self.inner.reverse.read().get(name).cloned()
    }

    pub(crate) fn forward_adapter(&self, type_id: TypeId) -> Option<ForwardFn> {
        self.inner.forward.read().get(&type_id).cloned()
    }

    // ========================================================================
    // Reverse conversion
    // ========================================================================

    /// Get the converter for `descriptor`, building and caching it on a miss.
    pub fn converter(
        &self,
        descriptor: &TypeDescriptor,
    ) -> std::result::Result<Converter, UnsupportedTypeError> {
        let mut resolver = Resolver::new(self);
        let key = resolver.normalize(descriptor)?;
        if let Some(hit) = self.cached(&key) {
            tracing::trace!("Converter cache hit for {key}");
            return Ok(hit);
        }

        let _guard = match self.inner.build_lock.try_lock() {
            Some(guard) => guard,
            None => {
                tracing::debug!("Build lock contended while resolving {key}");
                self.inner.build_lock.lock()
            }
        };
        if let Some(hit) = self.cached(&key) {
            return Ok(hit);
        }
        resolver.resolve(&key)
    }

    /// Convert `tree` to `descriptor` under the default configuration.
    pub fn convert(&self, tree: &Json, descriptor: &TypeDescriptor) -> Result<Value> {
        self.convert_with(tree, descriptor, &ConversionConfig::default())
    }

    /// Convert `tree` to `descriptor` under `config`.
    pub fn convert_with(
        &self,
        tree: &Json,
        descriptor: &TypeDescriptor,
        config: &ConversionConfig,
    ) -> Result<Value> {
        let converter = self.converter(descriptor)?;
        Ok(converter.convert(tree, config)?)
    }

    pub(crate) fn cached(&self, key: &TypeDescriptor) -> Option<Converter> {
        self.inner.cache.get(key).map(|entry| entry.value().clone())
    }

    pub(crate) fn store(&self, key: TypeDescriptor, converter: Converter) {
        self.inner.cache.insert(key, converter);
    }

    /// Number of cached converters.
    pub fn cached_count(&self) -> usize {
        self.inner.cache.len()
    }

    // ========================================================================
    // Forward conversion
    // ========================================================================

    /// Convert `value` to a tree. Tree data inside `Value::Tree` is returned
    /// by reference.
    pub fn to_tree<'a>(
        &self,
        value: &'a Value,
    ) -> std::result::Result<Cow<'a, Json>, UnsupportedTypeError> {
        forward::to_tree(self, value)
    }

    /// Check whether `null` is a legal value of `descriptor`, looking
    /// through declared names.
    pub fn permits_absence(&self, descriptor: &TypeDescriptor) -> bool {
        let mut current = Cow::Borrowed(descriptor);
        for _ in 0..MAX_ALIAS_DEPTH {
            match current.as_ref() {
                TypeDescriptor::Named(name) => match self.declaration(name) {
                    Some(target) => current = Cow::Owned(target),
                    None => return false,
                },
                TypeDescriptor::Union(alternatives) => {
                    return alternatives.iter().any(|alt| self.permits_absence(alt))
                }
                TypeDescriptor::Annotated(base, _) => {
                    current = Cow::Owned(base.as_ref().clone());
                }
                other => return other.permits_absence(),
            }
        }
        false
    }

    pub(crate) fn max_alias_depth() -> usize {
        MAX_ALIAS_DEPTH
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("cached", &self.inner.cache.len())
            .field("epoch", &self.epoch())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convert_core::{
        Constraint, ConversionError, ConversionResult, ErrorKind, RecordDef, SequenceLike,
    };
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    #[derive(Debug, Clone, PartialEq)]
    struct Deque(VecDeque<Value>);

    impl SequenceLike for Deque {
        fn sequence_items(&self) -> Vec<Value> {
            self.0.iter().cloned().collect()
        }
    }

    impl CustomValue for Deque {
        fn type_name(&self) -> &str {
            "Deque"
        }

        fn as_sequence_like(&self) -> Option<&dyn SequenceLike> {
            Some(self)
        }
    }

    /// Generic factory: `Deque<T>` resolves its element converter through
    /// the resolver it is handed.
    fn register_deque(registry: &Registry) {
        registry.register_reverse("Deque", |descriptor, resolver| {
            let element = match descriptor {
                TypeDescriptor::Custom { args, .. } if args.len() == 1 => &args[0],
                _ => {
                    return Err(UnsupportedTypeError::new(descriptor)
                        .with_detail("Deque takes exactly one type argument"))
                }
            };
            let element = resolver.resolve(element)?;
            let type_name = descriptor.to_string();
            Ok(Converter::new(move |tree, config| {
                let items = tree
                    .as_array()
                    .ok_or_else(|| ConversionError::shape(tree, &type_name))?;
                let items = items
                    .iter()
                    .map(|item| element.convert(item, config))
                    .collect::<ConversionResult<VecDeque<_>>>()?;
                Ok(Value::custom(Deque(items)))
            }))
        });
    }

    #[test]
    fn test_structurally_equal_descriptors_share_one_entry() {
        let registry = Registry::new();
        let first = registry
            .converter(&TypeDescriptor::list(TypeDescriptor::STRING))
            .unwrap();
        let second = registry
            .converter(&TypeDescriptor::list(TypeDescriptor::STRING))
            .unwrap();
        assert!(first.ptr_eq(&second));
        // List<String> and its String element
        assert_eq!(registry.cached_count(), 2);
    }

    #[test]
    fn test_named_descriptors_normalize_to_target() {
        let registry = Registry::new();
        registry.declare("Names", TypeDescriptor::list(TypeDescriptor::STRING));
        let named = registry.converter(&TypeDescriptor::named("Names")).unwrap();
        let direct = registry
            .converter(&TypeDescriptor::list(TypeDescriptor::STRING))
            .unwrap();
        assert!(named.ptr_eq(&direct));

        let err = registry
            .converter(&TypeDescriptor::named("Missing"))
            .unwrap_err();
        assert_eq!(err.type_name, "Missing");
    }

    #[test]
    fn test_unknown_custom_type_is_unsupported() {
        let registry = Registry::new();
        let err = registry
            .converter(&TypeDescriptor::custom("Path"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Don't know how to convert Path");
    }

    #[test]
    fn test_reverse_registration_invalidates_cache() {
        let registry = Registry::new();
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        registry.register_reverse("Upper", move |descriptor, _resolver| {
            counter.fetch_add(1, Ordering::SeqCst);
            let type_name = descriptor.to_string();
            Ok(Converter::new(move |tree, _config| match tree.as_str() {
                Some(s) => Ok(Value::String(s.to_uppercase())),
                None => Err(ConversionError::shape(tree, &type_name)),
            }))
        });

        let upper = TypeDescriptor::custom("Upper");
        let value = registry.convert(&json!("abc"), &upper).unwrap();
        assert_eq!(value, Value::string("ABC"));
        registry.convert(&json!("def"), &upper).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        let epoch = registry.epoch();
        registry.declare("Other", TypeDescriptor::INT);
        assert!(registry.epoch() > epoch);
        assert_eq!(registry.cached_count(), 0);

        registry.convert(&json!("ghi"), &upper).unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_convert_reports_both_error_categories() {
        let registry = Registry::new();
        let err = registry
            .convert(&json!("x"), &TypeDescriptor::INT)
            .unwrap_err();
        match err {
            crate::Error::Conversion(err) => assert_eq!(err.kind, ErrorKind::ShapeMismatch),
            other => panic!("Expected Conversion, got {:?}", other),
        }

        let err = registry
            .convert(&json!("x"), &TypeDescriptor::custom("Nope"))
            .unwrap_err();
        assert!(matches!(err, crate::Error::Unsupported(_)));
    }

    #[test]
    fn test_permits_absence_through_aliases() {
        let registry = Registry::new();
        registry.declare("MaybeInt", TypeDescriptor::optional(TypeDescriptor::INT));
        assert!(registry.permits_absence(&TypeDescriptor::named("MaybeInt")));
        assert!(!registry.permits_absence(&TypeDescriptor::named("Unknown")));
        assert!(!registry.permits_absence(&TypeDescriptor::INT));
    }

    #[test]
    fn test_same_named_records_get_their_own_converters() {
        crate::init_test_logging();
        let registry = Registry::new();
        let first = RecordDef::builder("Item")
            .field("a", TypeDescriptor::INT)
            .build()
            .unwrap();
        let second = RecordDef::builder("Item")
            .field("b", TypeDescriptor::STRING)
            .build()
            .unwrap();

        let value = registry.convert(&json!({"a": 1}), &first.descriptor()).unwrap();
        assert_eq!(value.as_record().unwrap().def, first);
        assert_eq!(value.as_record().unwrap().get("a"), Some(&Value::Int(1)));

        let value = registry.convert(&json!({"b": "x"}), &second.descriptor()).unwrap();
        assert_eq!(value.as_record().unwrap().def, second);
        assert_eq!(value.as_record().unwrap().get("b"), Some(&Value::string("x")));

        let first_converter = registry.converter(&first.descriptor()).unwrap();
        let second_converter = registry.converter(&second.descriptor()).unwrap();
        assert!(!first_converter.ptr_eq(&second_converter));
    }

    #[test]
    fn test_predicate_annotations_do_not_grow_the_cache() {
        let registry = Registry::new();
        for i in 0..100 {
            let ty = TypeDescriptor::INT.annotate(Constraint::predicate("positive", |v| {
                v.as_i64().is_some_and(|i| i > 0)
            }));
            assert_eq!(registry.convert(&json!(i + 1), &ty).unwrap(), Value::Int(i + 1));
        }
        // Only the Int base converter is kept
        assert_eq!(registry.cached_count(), 1);

        let ty = TypeDescriptor::list(TypeDescriptor::INT.annotate(Constraint::anonymous(|_| false)));
        let err = registry.convert(&json!([1]), &ty).unwrap_err();
        match err {
            crate::Error::Conversion(err) => assert_eq!(err.kind, ErrorKind::ConstraintViolation),
            other => panic!("Expected Conversion, got {:?}", other),
        }
        assert_eq!(registry.cached_count(), 1);

        let ty = TypeDescriptor::INT.annotate(Constraint::between(1, 5));
        registry.convert(&json!(3), &ty).unwrap();
        registry.convert(&json!(4), &ty).unwrap();
        assert_eq!(registry.cached_count(), 2);
    }

    #[test]
    fn test_generic_custom_factory() {
        crate::init_test_logging();
        let registry = Registry::new();
        register_deque(&registry);

        let ints = TypeDescriptor::custom_of("Deque", [TypeDescriptor::INT]);
        let value = registry.convert(&json!([1, 2, 3]), &ints).unwrap();
        assert_eq!(
            value.as_custom::<Deque>(),
            Some(&Deque(VecDeque::from([Value::Int(1), Value::Int(2), Value::Int(3)])))
        );
        let err = registry.convert(&json!([1, "x"]), &ints).unwrap_err();
        match err {
            crate::Error::Conversion(err) => assert_eq!(err.type_name, "Int"),
            other => panic!("Expected Conversion, got {:?}", other),
        }

        let folder = RecordDef::builder("Folder")
            .field("name", TypeDescriptor::STRING)
            .field("children", TypeDescriptor::custom_of("Deque", [TypeDescriptor::SelfRef]))
            .build()
            .unwrap();
        let tree = json!({"name": "root", "children": [{"name": "leaf", "children": []}]});
        let value = registry.convert(&tree, &folder.descriptor()).unwrap();
        let leaf = Value::Record(
            folder
                .value()
                .with("name", "leaf")
                .with("children", Value::custom(Deque(VecDeque::new()))),
        );
        let expected = Value::Record(
            folder
                .value()
                .with("name", "root")
                .with("children", Value::custom(Deque(VecDeque::from([leaf])))),
        );
        assert_eq!(value, expected);
        assert_eq!(registry.to_tree(&value).unwrap().into_owned(), tree);

        let err = registry
            .converter(&TypeDescriptor::custom("Deque"))
            .unwrap_err();
        assert_eq!(err.detail.as_deref(), Some("Deque takes exactly one type argument"));
    }
}
