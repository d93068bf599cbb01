// Copyright 2024 The Hierarchy Tree contributors.
// Licensed under the Apache License, Version 2.0 (found in
// the LICENSE-APACHE file) or the MIT license (found in
// the LICENSE-MIT file), at your option.

//! The tree model (C1): an immutable, invariant-protected snapshot of nodes,
//! parent→children links, and per-node flags.

use std::sync::Arc;

use immutable_chunkmap::map::Map;
use tree_core::{HierarchyLimit, HierarchyNode, InfoNodeKind, InstanceFilter, NodeId, TreeError};

/// A key into [`TreeModel`]'s maps: either the root sentinel (`⊥` in the
/// specification) or a concrete node id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeRef {
    Root,
    Id(NodeId),
}

impl NodeRef {
    pub fn id(&self) -> Option<&NodeId> {
        match self {
            Self::Root => None,
            Self::Id(id) => Some(id),
        }
    }
}

impl From<NodeId> for NodeRef {
    fn from(id: NodeId) -> Self {
        Self::Id(id)
    }
}

/// A hierarchy node as tracked by the model, with the engine-owned flags
/// layered on top of the provider's [`HierarchyNode`].
#[derive(Clone, Debug)]
pub struct HierarchyModelNode {
    pub id: NodeId,
    pub node_data: Arc<HierarchyNode>,
    pub label: Box<str>,
    pub has_children: bool,
    pub is_expanded: bool,
    pub is_selected: bool,
    pub is_loading: bool,
    pub hierarchy_limit: Option<HierarchyLimit>,
    pub instance_filter: Option<InstanceFilter>,
    pub error: Option<TreeError>,
}

/// A non-hierarchy child node representing an error, limit, or empty-filter
/// state (invariant 6: an info node never has children).
#[derive(Clone, Debug)]
pub struct InfoModelNode {
    pub id: NodeId,
    pub parent_id: NodeRef,
    pub kind: InfoNodeKind,
}

#[derive(Clone, Debug)]
pub enum ModelNode {
    Hierarchy(HierarchyModelNode),
    Info(InfoModelNode),
}

impl ModelNode {
    pub fn id(&self) -> &NodeId {
        match self {
            Self::Hierarchy(n) => &n.id,
            Self::Info(n) => &n.id,
        }
    }

    pub fn as_hierarchy(&self) -> Option<&HierarchyModelNode> {
        match self {
            Self::Hierarchy(n) => Some(n),
            Self::Info(_) => None,
        }
    }

    pub fn as_hierarchy_mut(&mut self) -> Option<&mut HierarchyModelNode> {
        match self {
            Self::Hierarchy(n) => Some(n),
            Self::Info(_) => None,
        }
    }
}

/// The sentinel root. Unlike every other node it has no `nodeData` and owns
/// the root-level limit/filter/loading/error state directly.
#[derive(Clone, Debug, Default)]
pub struct RootState {
    pub hierarchy_limit: Option<HierarchyLimit>,
    pub instance_filter: Option<InstanceFilter>,
    pub is_loading: bool,
    pub error: Option<TreeError>,
}

/// What [`TreeModel::expand_node`] tells the caller to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExpandEffect {
    None,
    LoadChildren,
    ReloadChildren,
}

/// One loaded tree part: the atomic unit reduced into the model by
/// [`TreeModel::add_hierarchy_part`].
#[derive(Clone, Debug, Default)]
pub struct TreePart {
    /// Flattened nodes for the whole part, keyed by the `NodeRef` they are
    /// children of, in provider emission order (invariant 7).
    pub children_by_parent: Vec<(NodeRef, Vec<ModelNode>)>,
}

/// Immutable, invariant-protected snapshot of the tree (C1).
///
/// `id_to_node` and `parent_child_map` are backed by a persistent ordered
/// map, so every mutating method takes `self` by value and returns a new
/// snapshot that shares unchanged substructure with the one it was built
/// from (§9: "every mutation returns a new snapshot, unchanged substructure
/// is shared").
#[derive(Clone)]
pub struct TreeModel {
    pub root: RootState,
    id_to_node: Map<NodeId, ModelNode>,
    parent_child_map: Map<NodeRef, Vec<NodeId>>,
}

impl Default for TreeModel {
    fn default() -> Self {
        Self {
            root: RootState::default(),
            id_to_node: Map::new(),
            parent_child_map: Map::new(),
        }
    }
}

impl TreeModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&ModelNode> {
        self.id_to_node.get(id)
    }

    pub fn is_node_selected(&self, id: &NodeId) -> bool {
        matches!(
            self.get_node(id).and_then(ModelNode::as_hierarchy),
            Some(n) if n.is_selected
        )
    }

    pub fn children_known(&self, target: &NodeRef) -> bool {
        self.parent_child_map.get(target).is_some()
    }

    pub fn children_of(&self, target: &NodeRef) -> &[NodeId] {
        self.parent_child_map
            .get(target)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn set_node(&mut self, node: ModelNode) {
        let id = node.id().clone();
        self.id_to_node = self.id_to_node.insert(id, node).0;
    }

    fn set_children(&mut self, target: NodeRef, ids: Vec<NodeId>) {
        self.parent_child_map = self.parent_child_map.insert(target, ids).0;
    }

    fn unset_children(&mut self, target: &NodeRef) {
        self.parent_child_map = self.parent_child_map.remove(target).0;
    }

    /// §4.1 `expandNode`. No-op if `id` is unknown.
    pub fn expand_node(&mut self, id: &NodeId, expanded: bool) -> ExpandEffect {
        let Some(node) = self
            .id_to_node
            .get(id)
            .and_then(ModelNode::as_hierarchy)
            .cloned()
        else {
            return ExpandEffect::None;
        };

        if !expanded {
            let mut updated = node;
            updated.is_expanded = false;
            self.set_node(ModelNode::Hierarchy(updated));
            return ExpandEffect::None;
        }

        let had_children_load_error = matches!(node.error, Some(TreeError::ChildrenLoad { .. }));
        if had_children_load_error {
            self.remove_sub_tree(&NodeRef::Id(id.clone()));
            let mut updated = node;
            updated.is_expanded = true;
            updated.is_loading = true;
            updated.error = None;
            self.set_node(ModelNode::Hierarchy(updated));
            return ExpandEffect::ReloadChildren;
        }

        if !self.children_known(&NodeRef::Id(id.clone())) {
            let mut updated = node;
            updated.is_expanded = true;
            updated.is_loading = true;
            self.set_node(ModelNode::Hierarchy(updated));
            return ExpandEffect::LoadChildren;
        }

        let mut updated = node;
        updated.is_expanded = true;
        self.set_node(ModelNode::Hierarchy(updated));
        ExpandEffect::None
    }

    /// §4.1 `addHierarchyPart`. Replaces the subtree under `parent` with
    /// `part` atomically (invariant 5), clears `parent`'s error (§7), and
    /// clears its `isLoading` flag.
    pub fn add_hierarchy_part(&mut self, parent: NodeRef, part: TreePart) {
        self.remove_sub_tree(&parent);

        for (owner, children) in &part.children_by_parent {
            let ids = children.iter().map(|n| n.id().clone()).collect();
            for child in children {
                self.set_node(child.clone());
            }
            self.set_children(owner.clone(), ids);
        }

        match &parent {
            NodeRef::Root => {
                self.root.is_loading = false;
                self.root.error = None;
            }
            NodeRef::Id(id) => {
                if let Some(node) = self.id_to_node.get(id).and_then(ModelNode::as_hierarchy) {
                    let mut updated = node.clone();
                    updated.is_loading = false;
                    updated.error = None;
                    self.set_node(ModelNode::Hierarchy(updated));
                }
            }
        }
    }

    /// §4.1 `removeSubTree`. Recursively deletes descendants; leaves
    /// `parent` itself intact (it may not even exist, e.g. the root).
    pub fn remove_sub_tree(&mut self, parent: &NodeRef) {
        let Some(children) = self.parent_child_map.get(parent).cloned() else {
            return;
        };
        self.unset_children(parent);
        for child_id in children {
            self.remove_sub_tree(&NodeRef::Id(child_id.clone()));
            self.id_to_node = self.id_to_node.remove(&child_id).0;
        }
    }

    /// §4.1 `setHierarchyLimit`. Returns *should-reload*.
    pub fn set_hierarchy_limit(&mut self, target: &NodeRef, limit: HierarchyLimit) -> bool {
        let is_expanded = match target {
            NodeRef::Root => {
                self.root.hierarchy_limit = Some(limit);
                true
            }
            NodeRef::Id(id) => {
                let Some(node) = self.id_to_node.get(id).and_then(ModelNode::as_hierarchy) else {
                    return false;
                };
                let mut updated = node.clone();
                updated.hierarchy_limit = Some(limit);
                let is_expanded = updated.is_expanded;
                self.set_node(ModelNode::Hierarchy(updated));
                is_expanded
            }
        };
        self.remove_sub_tree(target);
        is_expanded || matches!(target, NodeRef::Root)
    }

    /// §4.1 `setInstanceFilter`. Returns *should-reload*. Forces
    /// `isExpanded = true` for non-root targets.
    pub fn set_instance_filter(&mut self, target: &NodeRef, filter: InstanceFilter) -> bool {
        match target {
            NodeRef::Root => {
                self.root.instance_filter = Some(filter);
            }
            NodeRef::Id(id) => {
                let Some(node) = self.id_to_node.get(id).and_then(ModelNode::as_hierarchy) else {
                    return false;
                };
                let mut updated = node.clone();
                updated.instance_filter = Some(filter);
                updated.is_expanded = true;
                self.set_node(ModelNode::Hierarchy(updated));
            }
        }
        self.remove_sub_tree(target);
        true
    }

    /// Sets (or clears) the node/root-level `isLoading` flag, without
    /// touching children. Used when starting a reload, before the new part
    /// has arrived.
    pub fn set_loading(&mut self, target: &NodeRef, loading: bool) {
        match target {
            NodeRef::Root => self.root.is_loading = loading,
            NodeRef::Id(id) => {
                if let Some(node) = self.id_to_node.get(id).and_then(ModelNode::as_hierarchy) {
                    let mut updated = node.clone();
                    updated.is_loading = loading;
                    self.set_node(ModelNode::Hierarchy(updated));
                }
            }
        }
    }

    /// Records (or clears) the node/root-level error after a load, without
    /// touching any existing children. Distinct from [`Self::add_hierarchy_part`],
    /// which replaces a subtree atomically and always clears the error — this
    /// is for the failure path, where no new part was loaded.
    pub fn set_error(&mut self, target: &NodeRef, error: Option<TreeError>) {
        match target {
            NodeRef::Root => self.root.error = error,
            NodeRef::Id(id) => {
                if let Some(node) = self.id_to_node.get(id).and_then(ModelNode::as_hierarchy) {
                    let mut updated = node.clone();
                    updated.error = error;
                    self.set_node(ModelNode::Hierarchy(updated));
                }
            }
        }
    }

    /// §4.1 `selectNodes`.
    pub fn select_nodes(&mut self, ids: &[NodeId], change: SelectionChangeType) {
        match change {
            SelectionChangeType::Replace => {
                let all_ids: Vec<NodeId> = self
                    .id_to_node
                    .iter()
                    .filter_map(|(id, node)| node.as_hierarchy().map(|_| id.clone()))
                    .collect();
                for id in all_ids {
                    if let Some(node) = self.id_to_node.get(&id).and_then(ModelNode::as_hierarchy) {
                        let want = ids.contains(&id);
                        if node.is_selected != want {
                            let mut updated = node.clone();
                            updated.is_selected = want;
                            self.set_node(ModelNode::Hierarchy(updated));
                        }
                    }
                }
            }
            SelectionChangeType::Add | SelectionChangeType::Remove => {
                let selected = change == SelectionChangeType::Add;
                for id in ids {
                    if let Some(node) = self.id_to_node.get(id).and_then(ModelNode::as_hierarchy) {
                        if node.is_selected != selected {
                            let mut updated = node.clone();
                            updated.is_selected = selected;
                            self.set_node(ModelNode::Hierarchy(updated));
                        }
                    }
                }
            }
        }
    }

    /// Validates invariant 1 (no dangling ids). Intended for tests and debug
    /// assertions, not for production hot paths.
    pub fn validate(&self) {
        for (_, children) in self.parent_child_map.iter() {
            for child in children {
                if self.id_to_node.get(child).is_none() {
                    log::error!("invariant violation: dangling id {child:?} in parent_child_map");
                    panic!("dangling id {child:?} in parent_child_map");
                }
            }
        }
    }
}

/// §4.1 `selectNodes` change kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionChangeType {
    Add,
    Remove,
    Replace,
}
