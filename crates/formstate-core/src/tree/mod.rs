//! The rendered field tree.
//!
//! `FieldTree` is the in-memory stand-in for the rendered interface: every
//! object, array container and leaf input is a [`Node`] keyed by its
//! [`FieldPath`], and every property with conditions owns a [`WrapperRegion`]
//! whose visibility controls the enabled state of the fields below it.
//!
//! Nodes keep the schema fragments they were rendered from (conditions,
//! calculation, constraints, item template) so that registration after a
//! structural change can work from the subtree alone.
//!
//! Storage is a pair of `BTreeMap`s. Because `FieldPath` orders indices
//! numerically, iteration follows document order and a subtree is a contiguous
//! key range.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::path::{FieldIndex, FieldPath};
use crate::schema::{CalculationSchema, ConditionNode, PropertyKind, PropertySchema};

pub mod render;

pub use render::{render_form, render_subtree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Choice,
    Quantity,
    Bool,
    User,
    ObjectReference,
}

impl FieldKind {
    pub fn from_schema(schema: &PropertySchema) -> Option<Self> {
        Some(match schema.kind {
            PropertyKind::Text if !schema.choices.is_empty() => FieldKind::Choice,
            PropertyKind::Text => FieldKind::Text,
            PropertyKind::Quantity => FieldKind::Quantity,
            PropertyKind::Bool => FieldKind::Bool,
            PropertyKind::User => FieldKind::User,
            PropertyKind::ObjectReference => FieldKind::ObjectReference,
            PropertyKind::Object | PropertyKind::Array => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Choice => "choice",
            Self::Quantity => "quantity",
            Self::Bool => "bool",
            Self::User => "user",
            Self::ObjectReference => "object_reference",
        }
    }
}

/// Per-field validation constraints copied from the schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldConstraints {
    pub required: bool,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub choices: Vec<String>,
    pub units: Vec<String>,
}

/// A leaf input.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub kind: FieldKind,
    /// Raw input text. Bools use `"true"`/`"false"`, ids use decimal text.
    pub value: String,
    /// Selected unit for quantities.
    pub units: Option<String>,
    pub disabled: bool,
    pub constraints: FieldConstraints,
}

impl Field {
    pub fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    List,
    TableRow,
    TableCol,
}

impl ContainerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::TableRow => "table-row",
            Self::TableCol => "table-col",
        }
    }
}

/// Enabled state of a container's controls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerControls {
    pub add: bool,
    /// Applies to every item's delete control.
    pub delete: bool,
    pub copy: bool,
    pub add_column: bool,
    pub delete_column: bool,
}

/// A repeatable group.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayContainer {
    pub kind: ContainerKind,
    pub min_items: usize,
    pub max_items: Option<usize>,
    pub is_required: bool,
    /// Item schema every new item is rendered from.
    pub template: Arc<PropertySchema>,
    /// Shared inner item count when items are themselves arrays (tables).
    pub column_count: Option<usize>,
    pub controls: ContainerControls,
}

impl ArrayContainer {
    /// Control state for a container holding `items` items.
    pub fn compute_controls(&self, items: usize) -> ContainerControls {
        let add = self.max_items.map_or(true, |m| items < m);
        let delete = items > self.min_items && !(self.is_required && items <= 1);
        let (add_column, delete_column) = match self.column_count {
            Some(cols) => {
                let inner_max = self.template.max_items;
                let inner_min = self.template.min_items.unwrap_or(0);
                (inner_max.map_or(true, |m| cols < m), cols > inner_min)
            }
            None => (false, false),
        };
        ContainerControls {
            add,
            delete,
            copy: add && self.kind == ContainerKind::TableRow,
            add_column,
            delete_column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeBody {
    Group,
    Container(ArrayContainer),
    Field(Field),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub body: NodeBody,
    pub conditions: Vec<ConditionNode>,
    pub calculation: Option<CalculationSchema>,
}

impl Node {
    pub fn field(&self) -> Option<&Field> {
        match &self.body {
            NodeBody::Field(f) => Some(f),
            _ => None,
        }
    }

    pub fn container(&self) -> Option<&ArrayContainer> {
        match &self.body {
            NodeBody::Container(c) => Some(c),
            _ => None,
        }
    }
}

/// Visibility of one conditional region and its replacement placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapperRegion {
    pub visible: bool,
    pub replacement_visible: bool,
}

impl Default for WrapperRegion {
    fn default() -> Self {
        Self {
            visible: true,
            replacement_visible: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTree {
    nodes: BTreeMap<FieldPath, Node>,
    regions: BTreeMap<FieldPath, WrapperRegion>,
}

impl FieldTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, path: &FieldPath) -> Option<&Node> {
        self.nodes.get(path)
    }

    pub fn field(&self, path: &FieldPath) -> Option<&Field> {
        self.nodes.get(path).and_then(Node::field)
    }

    pub fn field_mut(&mut self, path: &FieldPath) -> Option<&mut Field> {
        match self.nodes.get_mut(path).map(|n| &mut n.body) {
            Some(NodeBody::Field(f)) => Some(f),
            _ => None,
        }
    }

    pub fn container(&self, path: &FieldPath) -> Option<&ArrayContainer> {
        self.nodes.get(path).and_then(Node::container)
    }

    pub fn container_mut(&mut self, path: &FieldPath) -> Option<&mut ArrayContainer> {
        match self.nodes.get_mut(path).map(|n| &mut n.body) {
            Some(NodeBody::Container(c)) => Some(c),
            _ => None,
        }
    }

    pub fn insert(&mut self, path: FieldPath, node: Node) {
        if !node.conditions.is_empty() {
            self.regions.entry(path.clone()).or_default();
        }
        self.nodes.insert(path, node);
    }

    pub fn region(&self, path: &FieldPath) -> Option<&WrapperRegion> {
        self.regions.get(path)
    }

    pub fn region_mut(&mut self, path: &FieldPath) -> Option<&mut WrapperRegion> {
        self.regions.get_mut(path)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&FieldPath, &Node)> {
        self.nodes.iter()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&FieldPath, &Field)> {
        self.nodes
            .iter()
            .filter_map(|(p, n)| n.field().map(|f| (p, f)))
    }

    pub fn containers(&self) -> impl Iterator<Item = (&FieldPath, &ArrayContainer)> {
        self.nodes
            .iter()
            .filter_map(|(p, n)| n.container().map(|c| (p, c)))
    }

    /// Nodes at or below `prefix`, in document order.
    pub fn subtree<'a>(&'a self, prefix: &'a FieldPath) -> impl Iterator<Item = (&'a FieldPath, &'a Node)> + 'a {
        self.nodes
            .range(prefix.clone()..)
            .take_while(move |(p, _)| p.starts_with(prefix))
    }

    /// Remove a subtree (nodes and regions) and return it for re-insertion.
    pub fn take_subtree(&mut self, prefix: &FieldPath) -> (Vec<(FieldPath, Node)>, Vec<(FieldPath, WrapperRegion)>) {
        let node_keys: Vec<FieldPath> = self.subtree(prefix).map(|(p, _)| p.clone()).collect();
        let region_keys: Vec<FieldPath> = self
            .regions
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(prefix))
            .map(|(p, _)| p.clone())
            .collect();

        let nodes = node_keys
            .into_iter()
            .filter_map(|k| self.nodes.remove(&k).map(|n| (k, n)))
            .collect();
        let regions = region_keys
            .into_iter()
            .filter_map(|k| self.regions.remove(&k).map(|r| (k, r)))
            .collect();
        (nodes, regions)
    }

    /// Duplicate the subtree at `from` (nodes and regions) under `to`.
    ///
    /// `to` must be a sibling item of `from`: both end in an index at the same
    /// position. Anything already stored under `to` is overwritten.
    pub fn copy_subtree(&mut self, from: &FieldPath, to: usize) {
        let pos = from.len().saturating_sub(1);
        let nodes: Vec<(FieldPath, Node)> = self
            .subtree(from)
            .filter_map(|(p, n)| p.with_index_at(pos, to).map(|q| (q, n.clone())))
            .collect();
        let regions: Vec<(FieldPath, WrapperRegion)> = self
            .regions
            .range(from.clone()..)
            .take_while(|(p, _)| p.starts_with(from))
            .filter_map(|(p, r)| p.with_index_at(pos, to).map(|q| (q, *r)))
            .collect();
        for (path, node) in nodes {
            self.insert(path, node);
        }
        for (path, region) in regions {
            self.regions.insert(path, region);
        }
    }

    pub fn put_region(&mut self, path: FieldPath, region: WrapperRegion) {
        self.regions.insert(path, region);
    }

    /// Number of items in the container at `path`.
    pub fn item_count(&self, path: &FieldPath) -> usize {
        self.item_indices(path).len()
    }

    /// True if `path` sits inside a region that is currently hidden.
    pub fn is_hidden(&self, path: &FieldPath) -> bool {
        let segs = path.segments();
        (0..=segs.len()).any(|k| {
            let prefix = FieldPath::from_segments(segs[..k].to_vec());
            self.regions.get(&prefix).is_some_and(|r| !r.visible)
        })
    }

    /// Recompute the disabled flag of every field at or below `prefix` from the
    /// visibility of enclosing regions. Returns the fields whose flag flipped.
    pub fn refresh_disabled(&mut self, prefix: &FieldPath) -> Vec<FieldPath> {
        let targets: Vec<(FieldPath, bool)> = self
            .subtree(prefix)
            .filter_map(|(p, n)| n.field().map(|f| (p.clone(), f.disabled)))
            .collect();

        let mut flipped = Vec::new();
        for (path, was_disabled) in targets {
            let now_disabled = self.is_hidden(&path);
            if now_disabled != was_disabled {
                if let Some(f) = self.field_mut(&path) {
                    f.disabled = now_disabled;
                }
                flipped.push(path);
            }
        }
        flipped
    }
}

impl FieldIndex for FieldTree {
    fn has_field(&self, path: &FieldPath) -> bool {
        self.field(path).is_some()
    }

    fn item_indices(&self, path: &FieldPath) -> Vec<usize> {
        if self.container(path).is_none() {
            return Vec::new();
        }
        let depth = path.len() + 1;
        self.subtree(path)
            .filter(|(p, _)| p.len() == depth)
            .filter_map(|(p, _)| p.last().and_then(|s| s.as_index()))
            .collect()
    }
}
