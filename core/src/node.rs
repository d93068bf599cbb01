// Copyright 2024 The Hierarchy Tree contributors.
// Licensed under the Apache License, Version 2.0 (found in
// the LICENSE-APACHE file) or the MIT license (found in
// the LICENSE-MIT file), at your option.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::key::NodeKey;

/// A single node as produced by a hierarchy provider, before the engine has
/// assigned it a [`crate::NodeId`] or merged it into a tree model.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct HierarchyNode {
    pub key: NodeKey,
    /// The keys of this node's ancestors, in root-to-parent order.
    pub parent_keys: Vec<NodeKey>,
    pub label: Box<str>,
    /// `true` if this node may have children; `false` if it is a leaf.
    pub has_children: bool,
    pub auto_expand: bool,
    pub supports_filtering: bool,
    /// Implementation-specific payload the engine never inspects.
    #[cfg_attr(feature = "serde", serde(default))]
    pub extended_data: serde_json::Value,
    /// For a grouping node, the nearest ancestor key that is *not* itself a
    /// grouping node. Populated by the provider's grouping step; the engine
    /// reads it only to resolve the effective instance filter at this node
    /// (a filter applied at a non-grouping ancestor is inherited by its
    /// grouping descendants). This is a logical back-reference, never an
    /// owning one: providers may store either a direct pointer to the
    /// ancestor (when they own both nodes' lifetimes) or an id plus a
    /// lookup.
    #[cfg_attr(feature = "serde", serde(default))]
    pub non_grouping_ancestor: Option<NodeKey>,
}

impl HierarchyNode {
    pub fn is_grouping(&self) -> bool {
        matches!(self.key, NodeKey::Grouping(_))
    }
}
