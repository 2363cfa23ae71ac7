//! Variant families: sum types dispatched on a wire label.
//!
//! A family has an abstract root node, optional abstract group nodes below it
//! and concrete record members. Every member answers to one or more labels;
//! the label index is maintained when members are registered, so resolving a
//! label never walks the hierarchy.
//!
//! ```text
//! Expression (root)
//!    ├─── Literal        labels: ["literal"]
//!    ├─── Not            labels: ["not"]
//!    └─── Binary (group)
//!           ├─── And     labels: ["and"]
//!           └─── Or      labels: ["or"]
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::DeclarationError;
use crate::schema::{RecordRef, VariantTag};
use crate::types::TypeDescriptor;

struct Node {
    parent: Option<String>,
    record: Option<RecordRef>,
}

struct FamilyState {
    nodes: IndexMap<String, Node>,
    labels: HashMap<String, String>,
}

/// A group of record types distinguished on the wire by a label field.
pub struct VariantFamily {
    name: String,
    label_field: String,
    state: RwLock<FamilyState>,
    generation: AtomicU64,
}

impl VariantFamily {
    /// Declare a new family rooted at `root`, labelled through `label_field`.
    pub fn declare(root: impl Into<String>, label_field: impl Into<String>) -> Arc<Self> {
        let name = root.into();
        let mut nodes = IndexMap::new();
        nodes.insert(
            name.clone(),
            Node {
                parent: None,
                record: None,
            },
        );
        Arc::new(Self {
            name,
            label_field: label_field.into(),
            state: RwLock::new(FamilyState {
                nodes,
                labels: HashMap::new(),
            }),
            generation: AtomicU64::new(0),
        })
    }

    /// Name of the root node.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Key holding the label on the wire.
    pub fn label_field(&self) -> &str {
        &self.label_field
    }

    /// Counter bumped on every registration; converters caching per-label
    /// state compare it to detect changes.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Reference to the root node.
    pub fn root(self: &Arc<Self>) -> VariantRef {
        VariantRef {
            family: Arc::clone(self),
            node: Arc::from(self.name.as_str()),
        }
    }

    /// Descriptor requesting any member of the family.
    pub fn descriptor(self: &Arc<Self>) -> TypeDescriptor {
        TypeDescriptor::SumType(self.root())
    }

    /// Reference to a group or member node.
    pub fn node(self: &Arc<Self>, name: &str) -> Result<VariantRef, DeclarationError> {
        if !self.state.read().nodes.contains_key(name) {
            return Err(self.unknown_node(name));
        }
        Ok(VariantRef {
            family: Arc::clone(self),
            node: Arc::from(name),
        })
    }

    /// Declare an abstract group node under `parent` (the root when `None`).
    pub fn declare_group(&self, name: &str, parent: Option<&str>) -> Result<(), DeclarationError> {
        let mut state = self.state.write();
        let parent = self.check_new_node(&state, name, parent)?;
        state.nodes.insert(
            name.to_string(),
            Node {
                parent: Some(parent),
                record: None,
            },
        );
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Register `record` as a member answering to `labels`, placed under
    /// `parent` (the root when `None`). With no labels the record's own name
    /// is its label.
    pub fn register<I, S>(
        &self,
        record: &RecordRef,
        labels: I,
        parent: Option<&str>,
    ) -> Result<(), DeclarationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            labels.push(record.name().to_string());
        }

        let mut state = self.state.write();
        let parent = self.check_new_node(&state, record.name(), parent)?;
        for label in &labels {
            if let Some(existing) = state.labels.get(label) {
                return Err(DeclarationError::DuplicateLabel {
                    family: self.name.clone(),
                    label: label.clone(),
                    existing: existing.clone(),
                });
            }
        }
        record.set_tag(VariantTag {
            label_field: self.label_field.clone(),
            labels: labels.clone(),
            family: Some(self.name.clone()),
        })?;

        for label in &labels {
            state
                .labels
                .insert(label.clone(), record.name().to_string());
        }
        state.nodes.insert(
            record.name().to_string(),
            Node {
                parent: Some(parent),
                record: Some(record.clone()),
            },
        );
        self.generation.fetch_add(1, Ordering::AcqRel);

        tracing::debug!(
            "Registered variant '{}' of family '{}' with labels {labels:?}",
            record.name(),
            self.name
        );
        Ok(())
    }

    /// Resolve a wire label to the member record.
    pub fn resolve(&self, label: &str) -> Option<RecordRef> {
        let state = self.state.read();
        let member = state.labels.get(label)?;
        state.nodes.get(member).and_then(|node| node.record.clone())
    }

    /// Check whether `member` is `node` or one of its descendants.
    pub fn is_assignable(&self, member: &str, node: &str) -> bool {
        let state = self.state.read();
        let mut current = Some(member);
        while let Some(name) = current {
            if name == node {
                return true;
            }
            current = state.nodes.get(name).and_then(|n| n.parent.as_deref());
        }
        false
    }

    /// All member records, in registration order.
    pub fn members(&self) -> Vec<RecordRef> {
        self.state
            .read()
            .nodes
            .values()
            .filter_map(|node| node.record.clone())
            .collect()
    }

    fn check_new_node(
        &self,
        state: &FamilyState,
        name: &str,
        parent: Option<&str>,
    ) -> Result<String, DeclarationError> {
        if state.nodes.contains_key(name) {
            return Err(DeclarationError::DuplicateNode {
                family: self.name.clone(),
                name: name.to_string(),
            });
        }
        let parent = parent.unwrap_or(&self.name);
        match state.nodes.get(parent) {
            Some(node) if node.record.is_none() => Ok(parent.to_string()),
            _ => Err(self.unknown_node(parent)),
        }
    }

    fn unknown_node(&self, name: &str) -> DeclarationError {
        DeclarationError::UnknownNode {
            family: self.name.clone(),
            name: name.to_string(),
        }
    }
}

impl fmt::Debug for VariantFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantFamily")
            .field("name", &self.name)
            .field("label_field", &self.label_field)
            .finish()
    }
}

/// A node of a variant family used as a conversion target.
#[derive(Clone)]
pub struct VariantRef {
    family: Arc<VariantFamily>,
    node: Arc<str>,
}

impl VariantRef {
    /// The owning family.
    pub fn family(&self) -> &Arc<VariantFamily> {
        &self.family
    }

    /// Name of the requested node.
    pub fn node(&self) -> &str {
        &self.node
    }
}

impl PartialEq for VariantRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.family, &other.family) && self.node == other.node
    }
}

impl Eq for VariantRef {}

impl Hash for VariantRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.family), state);
        self.node.hash(state);
    }
}

impl fmt::Debug for VariantRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SumType({}::{})", self.family.name, self.node)
    }
}
