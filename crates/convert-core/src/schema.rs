//! Record and enum declarations.
//!
//! ## Type Hierarchy
//!
//! - `FieldDef` - One record field: internal name, wire name, type, presence
//! - `RecordDef` - A record type with its fields and extra-key policy
//! - `EnumDef` - A closed set of named (optionally integer-valued) members
//!
//! Declarations are shared through [`RecordRef`] / [`EnumRef`] handles, which
//! compare and hash by type name so they can live inside cache keys.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::{Arc, OnceLock};

use crate::constraint::Constraint;
use crate::error::DeclarationError;
use crate::types::TypeDescriptor;
use crate::values::{EnumValue, RecordValue, Value};

// ============================================================================
// Fields
// ============================================================================

/// Whether a field must be present in object input.
#[derive(Debug, Clone, PartialEq)]
pub enum Presence {
    /// The key must be present.
    Required,

    /// When absent, a deep copy of the default is used.
    Default(Value),

    /// When absent, the field is left out of the record.
    Omittable,
}

/// One field of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Name of the field in the record value
    pub name: String,

    /// Name of the key on the wire
    pub wire_name: String,

    /// Declared type of the field
    pub ty: TypeDescriptor,

    /// Presence policy
    pub presence: Presence,
}

impl FieldDef {
    /// Create a required field whose wire name equals its name.
    pub fn new(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        let name = name.into();
        Self {
            wire_name: name.clone(),
            name,
            ty,
            presence: Presence::Required,
        }
    }

    /// Rename the field on the wire.
    pub fn wire_name(mut self, wire_name: impl Into<String>) -> Self {
        self.wire_name = wire_name.into();
        self
    }

    /// Use `value` when the key is absent.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.presence = Presence::Default(value.into());
        self
    }

    /// Allow the key to be absent without a default.
    pub fn omittable(mut self) -> Self {
        self.presence = Presence::Omittable;
        self
    }
}

/// What to do with object keys that no field consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum ExtraKeyPolicy {
    /// Fail, listing the unconsumed keys.
    #[default]
    Error,

    /// Silently drop them.
    Ignore,

    /// Convert each one with `value_type` and gather them into a map stored
    /// under `field`.
    CollectInto {
        field: String,
        value_type: TypeDescriptor,
    },
}

// ============================================================================
// Records
// ============================================================================

/// Hook run on a fully assembled record; may reject it with a detail string.
pub type Constructor = Arc<dyn Fn(RecordValue) -> Result<RecordValue, String> + Send + Sync>;

/// Wire-visible label of a record that takes part in variant dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantTag {
    /// Key holding the label on the wire
    pub label_field: String,

    /// Labels this record answers to; the first one is emitted
    pub labels: Vec<String>,

    /// Owning family, `None` for an orphan label
    pub family: Option<String>,
}

impl VariantTag {
    /// The label emitted by forward conversion.
    pub fn primary_label(&self) -> &str {
        self.labels.first().map(String::as_str).unwrap_or_default()
    }

    /// Check whether `label` is one of this record's labels.
    pub fn matches(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Declaration of a record type.
pub struct RecordDef {
    name: String,
    fields: Vec<FieldDef>,
    extra_keys: ExtraKeyPolicy,
    constructor: Option<Constructor>,
    constraints: Vec<Constraint>,
    tag: OnceLock<VariantTag>,
}

impl RecordDef {
    /// Start declaring a record type.
    pub fn builder(name: impl Into<String>) -> RecordBuilder {
        RecordBuilder {
            name: name.into(),
            fields: Vec::new(),
            extra_keys: ExtraKeyPolicy::Error,
            constructor: None,
            constraints: Vec::new(),
            tag: None,
        }
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Look up a field by internal name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check whether any field uses `wire_name` on the wire.
    pub fn declares_wire_name(&self, wire_name: &str) -> bool {
        self.fields.iter().any(|f| f.wire_name == wire_name)
    }

    /// Extra-key policy.
    pub fn extra_keys(&self) -> &ExtraKeyPolicy {
        &self.extra_keys
    }

    /// Constructor hook, if any.
    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    /// Record-level constraints.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Variant tag, once the record joined a family or got an orphan label.
    pub fn tag(&self) -> Option<&VariantTag> {
        self.tag.get()
    }

    /// Tag the record. A record can be tagged only once.
    pub(crate) fn set_tag(&self, tag: VariantTag) -> Result<(), DeclarationError> {
        self.tag.set(tag).map_err(|_| DeclarationError::AlreadyTagged {
            record: self.name.clone(),
        })
    }
}

impl fmt::Debug for RecordDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordDef")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("extra_keys", &self.extra_keys)
            .field("constructor", &self.constructor.is_some())
            .field("constraints", &self.constraints)
            .field("tag", &self.tag.get())
            .finish()
    }
}

/// Builder for [`RecordDef`].
pub struct RecordBuilder {
    name: String,
    fields: Vec<FieldDef>,
    extra_keys: ExtraKeyPolicy,
    constructor: Option<Constructor>,
    constraints: Vec<Constraint>,
    tag: Option<(String, String)>,
}

impl RecordBuilder {
    /// Add a required field.
    pub fn field(self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.field_def(FieldDef::new(name, ty))
    }

    /// Add a field of type `ty | Null` that defaults to null.
    pub fn optional(self, name: impl Into<String>, ty: TypeDescriptor) -> Self {
        self.field_def(FieldDef::new(name, TypeDescriptor::optional(ty)).default(Value::Null))
    }

    /// Add a field with a default value.
    pub fn field_with_default(
        self,
        name: impl Into<String>,
        ty: TypeDescriptor,
        default: impl Into<Value>,
    ) -> Self {
        self.field_def(FieldDef::new(name, ty).default(default))
    }

    /// Add a fully specified field.
    pub fn field_def(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Set the extra-key policy.
    pub fn extra_keys(mut self, policy: ExtraKeyPolicy) -> Self {
        self.extra_keys = policy;
        self
    }

    /// Drop unknown keys instead of failing.
    pub fn ignore_extra_keys(self) -> Self {
        self.extra_keys(ExtraKeyPolicy::Ignore)
    }

    /// Gather unknown keys, converted as `value_type`, into `field`.
    pub fn collect_extra_keys(self, field: impl Into<String>, value_type: TypeDescriptor) -> Self {
        self.extra_keys(ExtraKeyPolicy::CollectInto {
            field: field.into(),
            value_type,
        })
    }

    /// Run `constructor` on every assembled record.
    pub fn constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(RecordValue) -> Result<RecordValue, String> + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(constructor));
        self
    }

    /// Add a record-level constraint, checked after construction.
    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Give the record an orphan variant label: `label_field` must hold
    /// `label` on the wire.
    pub fn label(mut self, label_field: impl Into<String>, label: impl Into<String>) -> Self {
        self.tag = Some((label_field.into(), label.into()));
        self
    }

    /// Finish the declaration.
    pub fn build(self) -> Result<RecordRef, DeclarationError> {
        let mut seen_names = std::collections::HashSet::new();
        let mut seen_wire = std::collections::HashSet::new();
        for field in &self.fields {
            if !seen_names.insert(field.name.as_str()) || !seen_wire.insert(field.wire_name.as_str()) {
                return Err(DeclarationError::DuplicateField {
                    record: self.name,
                    field: field.name.clone(),
                });
            }
        }
        if let ExtraKeyPolicy::CollectInto { field, .. } = &self.extra_keys {
            if seen_names.contains(field.as_str()) {
                return Err(DeclarationError::DuplicateField {
                    record: self.name.clone(),
                    field: field.clone(),
                });
            }
        }

        let def = RecordDef {
            name: self.name,
            fields: self.fields,
            extra_keys: self.extra_keys,
            constructor: self.constructor,
            constraints: self.constraints,
            tag: OnceLock::new(),
        };
        if let Some((label_field, label)) = self.tag {
            def.set_tag(VariantTag {
                label_field,
                labels: vec![label],
                family: None,
            })?;
        }
        Ok(RecordRef(Arc::new(def)))
    }
}

/// Shared handle to a [`RecordDef`]. Two handles are equal only when they
/// come from the same declaration; a second record with the same name is a
/// different type.
#[derive(Clone)]
pub struct RecordRef(Arc<RecordDef>);

impl RecordRef {
    /// Start a value of this record type.
    pub fn value(&self) -> RecordValue {
        RecordValue::new(self.clone())
    }

    /// Descriptor for this record type.
    pub fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::Record(self.clone())
    }
}

impl Deref for RecordRef {
    type Target = RecordDef;

    fn deref(&self) -> &RecordDef {
        &self.0
    }
}

impl PartialEq for RecordRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for RecordRef {}

impl Hash for RecordRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl fmt::Debug for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({})", self.0.name)
    }
}

// ============================================================================
// Enums
// ============================================================================

/// One member of an enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumMember {
    /// Member name, emitted on the wire for name-valued enums
    pub name: String,

    /// Integer value, emitted on the wire for integer-valued enums
    pub value: Option<i64>,
}

/// Declaration of an enum type.
#[derive(Debug)]
pub struct EnumDef {
    name: String,
    members: Vec<EnumMember>,
}

impl EnumDef {
    /// Declare an enum whose members travel by name.
    pub fn named<I, S>(name: impl Into<String>, members: I) -> Result<EnumRef, DeclarationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(
            name.into(),
            members.into_iter().map(|m| EnumMember {
                name: m.into(),
                value: None,
            }),
        )
    }

    /// Declare an enum whose members travel as integers.
    pub fn int_valued<I, S>(name: impl Into<String>, members: I) -> Result<EnumRef, DeclarationError>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        Self::build(
            name.into(),
            members.into_iter().map(|(m, v)| EnumMember {
                name: m.into(),
                value: Some(v),
            }),
        )
    }

    fn build(
        name: String,
        members: impl Iterator<Item = EnumMember>,
    ) -> Result<EnumRef, DeclarationError> {
        let mut collected: Vec<EnumMember> = Vec::new();
        for member in members {
            if collected.iter().any(|m| m.name == member.name) {
                return Err(DeclarationError::DuplicateMember {
                    name,
                    member: member.name,
                });
            }
            collected.push(member);
        }
        Ok(EnumRef(Arc::new(EnumDef {
            name,
            members: collected,
        })))
    }

    /// Type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Members in declaration order.
    pub fn members(&self) -> &[EnumMember] {
        &self.members
    }

    /// Whether members travel as integers.
    pub fn is_int_valued(&self) -> bool {
        self.members.iter().any(|m| m.value.is_some())
    }

    /// Look up a member by name.
    pub fn member(&self, name: &str) -> Option<&EnumMember> {
        self.members.iter().find(|m| m.name == name)
    }

    /// Look up a member by integer value.
    pub fn member_by_value(&self, value: i64) -> Option<&EnumMember> {
        self.members.iter().find(|m| m.value == Some(value))
    }
}

/// Shared handle to an [`EnumDef`]; equal only to handles of the same
/// declaration.
#[derive(Clone)]
pub struct EnumRef(Arc<EnumDef>);

impl EnumRef {
    /// Value for the named member, if it exists.
    pub fn value(&self, member: &str) -> Option<Value> {
        self.0.member(member).map(|m| {
            Value::Enum(EnumValue {
                def: self.clone(),
                member: m.name.clone(),
            })
        })
    }

    /// Descriptor for this enum type.
    pub fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::Enum(self.clone())
    }
}

impl Deref for EnumRef {
    type Target = EnumDef;

    fn deref(&self) -> &EnumDef {
        &self.0
    }
}

impl PartialEq for EnumRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for EnumRef {}

impl Hash for EnumRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

impl fmt::Debug for EnumRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Enum({})", self.0.name)
    }
}
