// Copyright 2024 The Hierarchy Tree contributors.
// Licensed under the Apache License, Version 2.0 (found in
// the LICENSE-APACHE file) or the MIT license (found in
// the LICENSE-MIT file), at your option.

//! The tree loader (C2): turns hierarchy-provider output into loaded tree
//! parts, classifying provider errors and empty-set conditions along the
//! way.

use std::{collections::VecDeque, sync::Arc};

use futures_util::StreamExt;
use hashbrown::HashSet;
use tree_core::{HierarchyLimit, HierarchyNode, InfoNodeKind, InstanceFilter, NodeId, TreeError};

use crate::model::{HierarchyModelNode, ModelNode, NodeRef};
use crate::provider::{GetNodesOptions, HierarchyProvider};

/// One loaded tree part: `{parentId, loadedNodes}` (§2 glossary), plus the
/// node/root-level error the load should record, if any (§7 — distinct from
/// an info node: a rows-limit failure produces an info node but no error
/// here).
#[derive(Clone, Debug, Default)]
pub struct LoadedTreePart {
    pub parent: NodeRef,
    pub loaded_nodes: Vec<ModelNode>,
    pub error: Option<TreeError>,
}

/// Converts a single freshly-loaded hierarchy node into a model node,
/// applying an optional `buildNode` transform used during reloads to
/// re-apply preserved attributes.
pub type BuildNode = Arc<dyn Fn(HierarchyModelNode) -> HierarchyModelNode + Send + Sync>;

/// Decides, for a freshly loaded hierarchy child, whether the loader should
/// recurse into it immediately (§4.2 `shouldLoadChildren`). Takes the
/// child's already-computed id alongside its raw provider data, since a
/// reload's keep/discard policy is keyed by id, not by node content.
pub type ShouldLoadChildren = Arc<dyn Fn(&NodeId, &HierarchyNode) -> bool + Send + Sync>;

/// Resolves the effective instance filter for a parent before calling the
/// provider (§4.2 `getInstanceFilter`). Also responsible for resolving a
/// grouping node's filter against its nearest non-grouping ancestor, since
/// that's a property of *which* filter is effective at a level, not of how
/// the level is loaded.
pub type GetInstanceFilter<'a> = dyn Fn(&NodeRef) -> Option<InstanceFilter> + 'a;

/// Options controlling a single `loadChildren`/`loadNodes` call.
pub struct LoadOptions<'a> {
    pub hierarchy_level_size_limit: HierarchyLimit,
    pub get_instance_filter: &'a GetInstanceFilter<'a>,
    pub should_load_children: Option<ShouldLoadChildren>,
    pub build_node: Option<BuildNode>,
    pub ignore_cache: bool,
}

/// Stateless driver that turns provider output into [`LoadedTreePart`]s.
/// Generic over any [`HierarchyProvider`]; it never owns a provider
/// instance, only borrows one per call, so the same loader logic runs
/// against a mock provider in tests and a real one in production.
pub struct TreeLoader;

impl TreeLoader {
    /// §4.2 algorithm, steps 1–5, for a single parent.
    pub async fn load_children<P: HierarchyProvider + ?Sized>(
        provider: &P,
        parent: NodeRef,
        parent_node: Option<Arc<HierarchyNode>>,
        parent_keys: Vec<tree_core::NodeKey>,
        options: &LoadOptions<'_>,
    ) -> LoadedTreePart {
        let instance_filter = (options.get_instance_filter)(&parent);
        let filter_was_active = instance_filter
            .as_ref()
            .map(|f| !f.is_empty())
            .unwrap_or(false);

        let mut stream = provider.get_nodes(GetNodesOptions {
            parent_node,
            hierarchy_level_size_limit: options.hierarchy_level_size_limit,
            instance_filter,
            ignore_cache: options.ignore_cache,
        });

        let mut raw_nodes = Vec::new();
        let mut info: Option<InfoNodeKind> = None;
        let mut tree_error: Option<TreeError> = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(node) => {
                    log::trace!("loaded hierarchy node under {parent:?}: {}", node.key);
                    raw_nodes.push(node);
                }
                Err(error) => {
                    log::warn!("hierarchy provider failed loading children of {parent:?}: {error}");
                    info = Some(match &error {
                        tree_core::ProviderError::RowsLimitExceeded { limit } => {
                            InfoNodeKind::ResultSetTooLarge {
                                result_set_size_limit: *limit,
                            }
                        }
                        _ => InfoNodeKind::Unknown {
                            message: error.to_string(),
                        },
                    });
                    tree_error = error.as_tree_error();
                    // The stream completes normally after a classified
                    // failure; any nodes already emitted are kept.
                    break;
                }
            }
        }

        if info.is_none() && raw_nodes.is_empty() && filter_was_active {
            info = Some(InfoNodeKind::NoFilterMatches);
        }

        let mut loaded_nodes = Vec::with_capacity(raw_nodes.len().max(1));
        for raw in raw_nodes {
            let id = NodeId::from_key_path(parent_keys.iter(), &raw.key);
            let mut model_node = HierarchyModelNode {
                id,
                label: raw.label.clone(),
                has_children: raw.has_children,
                is_expanded: false,
                is_selected: false,
                is_loading: false,
                hierarchy_limit: None,
                instance_filter: None,
                error: None,
                node_data: Arc::new(raw),
            };
            if let Some(build_node) = &options.build_node {
                model_node = build_node(model_node);
            }
            loaded_nodes.push(ModelNode::Hierarchy(model_node));
        }

        if let Some(kind) = info {
            let info_id = NodeId::from_key_path(
                parent_keys.iter(),
                &tree_core::NodeKey::Generic(format!("{kind:?}").into_boxed_str()),
            );
            loaded_nodes.push(ModelNode::Info(crate::model::InfoModelNode {
                id: info_id,
                parent_id: parent.clone(),
                kind,
            }));
        }

        LoadedTreePart {
            parent,
            loaded_nodes,
            error: tree_error,
        }
    }

    /// §4.2 `loadNodes`: recursively expands every freshly loaded child that
    /// satisfies `shouldLoadChildren`, in breadth-first emission order. The
    /// result is the flattened collection of every part touched, each still
    /// independently addressable by its `parentId`.
    pub async fn load_nodes<P: HierarchyProvider + ?Sized>(
        provider: &P,
        root: NodeRef,
        root_node: Option<Arc<HierarchyNode>>,
        root_parent_keys: Vec<tree_core::NodeKey>,
        options: &LoadOptions<'_>,
    ) -> Vec<LoadedTreePart> {
        let mut parts = Vec::new();
        let mut queue: VecDeque<(NodeRef, Option<Arc<HierarchyNode>>, Vec<tree_core::NodeKey>)> =
            VecDeque::new();
        queue.push_back((root, root_node, root_parent_keys));

        while let Some((parent, parent_node, parent_keys)) = queue.pop_front() {
            let part = Self::load_children(
                provider,
                parent.clone(),
                parent_node,
                parent_keys.clone(),
                options,
            )
            .await;

            for loaded in &part.loaded_nodes {
                if let ModelNode::Hierarchy(child) = loaded {
                    if !child.has_children {
                        continue;
                    }
                    let recurse = options
                        .should_load_children
                        .as_ref()
                        .map(|f| f(&child.id, &child.node_data))
                        .unwrap_or(false);
                    if recurse {
                        let mut child_parent_keys = parent_keys.clone();
                        child_parent_keys.push(child.node_data.key.clone());
                        queue.push_back((
                            NodeRef::Id(child.id.clone()),
                            Some(child.node_data.clone()),
                            child_parent_keys,
                        ));
                    }
                }
            }

            parts.push(part);
        }

        parts
    }
}

/// Policy preserved across a reload (§4.2 `reloadNodes`): which previously
/// expanded/collapsed nodes to keep expanded, and which prior node
/// attributes to re-apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReloadState {
    Keep,
    Discard,
    Reset,
}

/// Builds the `shouldLoadChildren` predicate for a reload: true if the
/// node's id is in `expanded_node_ids`, false if in `collapsed_node_ids`,
/// else the node's own `autoExpand`.
pub fn reload_should_load_children(
    expanded_node_ids: HashSet<NodeId>,
    collapsed_node_ids: HashSet<NodeId>,
) -> ShouldLoadChildren {
    Arc::new(move |id, node| {
        if expanded_node_ids.contains(id) {
            true
        } else if collapsed_node_ids.contains(id) {
            false
        } else {
            node.auto_expand
        }
    })
}
