// Copyright 2024 The Hierarchy Tree contributors.
// Licensed under the Apache License, Version 2.0 (found in
// the LICENSE-APACHE file) or the MIT license (found in
// the LICENSE-MIT file), at your option.

//! Tree actions (C3): the single writer of a [`TreeModel`], serializing
//! every mutation and owning the in-flight loads that follow from it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{AbortHandle, Abortable};
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use tree_core::{HierarchyLimit, HierarchyNode, InfoNodeKind, InstanceFilter, NodeId, NodeKey, TreeError};

use crate::loader::{LoadOptions, LoadedTreePart, ReloadState, ShouldLoadChildren, TreeLoader};
use crate::model::{ExpandEffect, ModelNode, NodeRef, SelectionChangeType, TreeModel, TreePart};
use crate::provider::{HierarchyProvider, InstanceFilterResolver};

/// Invoked with the new model snapshot after every mutation (§4.3: "model
/// updates are published to subscribers as immutable snapshots").
pub type PublishFn = Arc<dyn Fn(TreeModel) + Send + Sync>;

/// The action an `onPerformanceMeasured` call is timing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PerformanceAction {
    /// The very first root-level load after construction. Only the facade
    /// knows whether a given root load is the first one, so it requests
    /// this label explicitly rather than [`TreeActions`] inferring it.
    InitialLoad,
    /// An `expandNode`-driven load of a single level.
    HierarchyLevelLoad,
    /// A `reloadTree`/`reloadSubTree`-driven reload.
    Reload,
}

pub type PerformanceHook = Arc<dyn Fn(PerformanceAction, Duration) + Send + Sync>;
pub type LimitExceededHook = Arc<dyn Fn(NodeRef, HierarchyLimit) + Send + Sync>;
pub type LoadErrorHook = Arc<dyn Fn(NodeRef, TreeError) + Send + Sync>;

/// A single in-flight load, keyed by the subtree root it was started for, so
/// a later mutation under the same root can cancel it.
struct InFlightLoad {
    abort: AbortHandle,
}

#[derive(Default)]
struct Hooks {
    performance: Option<PerformanceHook>,
    limit_exceeded: Option<LimitExceededHook>,
    load_error: Option<LoadErrorHook>,
}

/// Owns the canonical [`TreeModel`] and every mutation into it. Holds the
/// model behind a `parking_lot::Mutex` rather than an `RwLock`: all access is
/// either a short read to clone the snapshot or a write, and writes always
/// dominate in this workload, so a plain mutex avoids writer starvation
/// without costing readers anything of substance.
pub struct TreeActions<P: HierarchyProvider> {
    provider: Arc<P>,
    model: Mutex<TreeModel>,
    in_flight: Mutex<HashMap<NodeRef, InFlightLoad>>,
    publish: PublishFn,
    hooks: Mutex<Hooks>,
}

impl<P: HierarchyProvider + 'static> TreeActions<P> {
    pub fn new(provider: Arc<P>, publish: PublishFn) -> Self {
        Self {
            provider,
            model: Mutex::new(TreeModel::new()),
            in_flight: Mutex::new(HashMap::new()),
            publish,
            hooks: Mutex::new(Hooks::default()),
        }
    }

    pub fn set_performance_hook(&self, hook: Option<PerformanceHook>) {
        self.hooks.lock().performance = hook;
    }

    pub fn set_limit_exceeded_hook(&self, hook: Option<LimitExceededHook>) {
        self.hooks.lock().limit_exceeded = hook;
    }

    pub fn set_load_error_hook(&self, hook: Option<LoadErrorHook>) {
        self.hooks.lock().load_error = hook;
    }

    pub fn snapshot(&self) -> TreeModel {
        self.model.lock().clone()
    }

    fn publish_current(&self) {
        (self.publish)(self.snapshot());
    }

    /// Cancels every in-flight load. Used by a root-level reload, which
    /// invalidates the whole tree (§5: "a root reload cancels every
    /// in-flight load; a sub-tree reload only cancels loads under that
    /// sub-tree").
    fn cancel_all(&self) {
        let mut in_flight = self.in_flight.lock();
        for (_, load) in in_flight.drain() {
            load.abort.abort();
        }
    }

    /// Cancels every in-flight load without touching the model. Called by
    /// [`crate::facade::HierarchyTreeState::dispose`] (§5: "disposing the
    /// state owner cancels every in-flight stream"); unlike
    /// [`Self::reload_tree`], disposal never replaces the model with a fresh
    /// one, since nothing will observe it again.
    pub fn dispose(&self) {
        self.cancel_all();
    }

    fn cancel_subtree(&self, roots: &[NodeRef]) {
        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|target, load| {
            if roots.contains(target) {
                load.abort.abort();
                false
            } else {
                true
            }
        });
    }

    /// §4.1/§4.3 `expandNode`. Mutates the model synchronously, then, if the
    /// model asked for a load, spawns it as an abortable task and publishes
    /// the loaded part back into the model when it completes.
    pub async fn expand_node(&self, id: NodeId, expanded: bool) {
        let effect = {
            let mut model = self.model.lock();
            model.expand_node(&id, expanded)
        };
        self.publish_current();

        match effect {
            ExpandEffect::None => {}
            ExpandEffect::LoadChildren | ExpandEffect::ReloadChildren => {
                self.timed_load(NodeRef::Id(id), PerformanceAction::HierarchyLevelLoad)
                    .await;
            }
        }
    }

    /// §4.1/§4.3 `setHierarchyLimit`. Snapshots the old model before
    /// mutating so a should-reload result can preserve descendant expand
    /// state and attributes via [`Self::reload_sub_tree`]'s `keep` policy,
    /// rather than flattening them with a single-level load.
    pub async fn set_hierarchy_limit(&self, target: NodeRef, limit: HierarchyLimit) {
        let old_model = self.snapshot();
        let should_reload = {
            let mut model = self.model.lock();
            model.set_hierarchy_limit(&target, limit)
        };
        self.publish_current();
        if should_reload {
            self.reload_sub_tree(target, &old_model, ReloadState::Keep).await;
        }
    }

    /// §4.1/§4.3 `setInstanceFilter`. See [`Self::set_hierarchy_limit`]: the
    /// reload must go through [`Self::reload_sub_tree`] so the `keep` policy
    /// preserves whatever was expanded under `target` before the filter
    /// changed.
    pub async fn set_instance_filter(&self, target: NodeRef, filter: InstanceFilter) {
        let old_model = self.snapshot();
        let should_reload = {
            let mut model = self.model.lock();
            model.set_instance_filter(&target, filter)
        };
        self.publish_current();
        if should_reload {
            self.reload_sub_tree(target, &old_model, ReloadState::Keep).await;
        }
    }

    /// §4.1 `selectNodes`. Pure model mutation; never triggers a load.
    pub fn select_nodes(&self, ids: &[NodeId], change: SelectionChangeType) {
        {
            let mut model = self.model.lock();
            model.select_nodes(ids, change);
        }
        self.publish_current();
    }

    /// §4.2/§4.3 `reloadSubTree`. `old_model` is the snapshot taken just
    /// before the reload started, used to preserve expanded/collapsed state
    /// and prior node attributes according to `reload_state`.
    pub async fn reload_sub_tree(
        &self,
        parent: NodeRef,
        old_model: &TreeModel,
        reload_state: ReloadState,
    ) {
        self.cancel_subtree(&[parent.clone()]);
        {
            let mut model = self.model.lock();
            model.remove_sub_tree(&parent);
            model.set_loading(&parent, true);
        }
        self.publish_current();
        self.timed_reload(parent, old_model, reload_state, PerformanceAction::Reload)
            .await;
    }

    /// §4.3 `reloadTree`: reload from the root down, per `reload_state`.
    /// `action` is `InitialLoad` for the very first load after construction
    /// and `Reload` for every subsequent one — only the facade knows which,
    /// since it's the one tracking whether anything has ever loaded.
    pub async fn reload_tree(
        &self,
        old_model: &TreeModel,
        reload_state: ReloadState,
        action: PerformanceAction,
    ) {
        self.cancel_all();
        {
            let mut model = self.model.lock();
            *model = TreeModel::new();
            model.root.is_loading = true;
            model.root.hierarchy_limit = old_model.root.hierarchy_limit;
            model.root.instance_filter = match reload_state {
                ReloadState::Discard | ReloadState::Reset => None,
                ReloadState::Keep => old_model.root.instance_filter.clone(),
            };
        }
        self.publish_current();
        self.timed_reload(NodeRef::Root, old_model, reload_state, action)
            .await;
    }

    /// Drives a fresh (non-reload) load for `target`, folds the result into
    /// the model, and reports `action`'s duration to the performance hook.
    /// Passing no `shouldLoadChildren` predicate means `load_nodes` loads
    /// exactly the one requested level, matching `expandNode`'s
    /// single-level semantics (§4.1); recursive auto-expansion only happens
    /// during a reload (§4.2).
    async fn timed_load(&self, target: NodeRef, action: PerformanceAction) {
        let start = Instant::now();
        self.load_and_apply(target, None, None, false).await;
        self.report_duration(action, start.elapsed());
    }

    /// §4.2 `reloadNodes`. Unlike [`Self::timed_load`], this wires up the
    /// `keep`/`discard`/`reset` policy: which previously expanded nodes to
    /// recurse into, which prior per-node attributes to re-apply, and which
    /// filter to use at the reload root versus everywhere below it.
    async fn timed_reload(
        &self,
        target: NodeRef,
        old_model: &TreeModel,
        reload_state: ReloadState,
        action: PerformanceAction,
    ) {
        let start = Instant::now();

        // Only `keep` preserves expand state; `discard`/`reset` fall back to
        // `node.autoExpand` alone for every freshly loaded node (§4.3:
        // "discard: no preservation").
        let (expanded_ids, collapsed_ids): (HashSet<NodeId>, HashSet<NodeId>) = match reload_state {
            ReloadState::Keep => {
                let (expanded, collapsed) = collect_expanded_and_collapsed_ids(old_model, &target);
                (expanded.into_iter().collect(), collapsed.into_iter().collect())
            }
            ReloadState::Discard | ReloadState::Reset => (HashSet::new(), HashSet::new()),
        };
        let should_load_children = Some(crate::loader::reload_should_load_children(
            expanded_ids.clone(),
            collapsed_ids,
        ));

        // `discard`/`reset`: buildNode is the identity (no prior attribute
        // survives a discarded reload); `keep` re-applies the limit,
        // filter, and selection a node with the same id carried before.
        let build_node: Option<crate::loader::BuildNode> = match reload_state {
            ReloadState::Keep => Some(keep_build_node(old_model.clone(), expanded_ids)),
            ReloadState::Discard | ReloadState::Reset => None,
        };

        let target_for_filter = target.clone();
        let old_model_for_filter = old_model.clone();
        let live_model = &self.model;
        let get_instance_filter = move |r: &NodeRef| -> Option<InstanceFilter> {
            if *r == target_for_filter {
                // The reload root's own filter is whatever is already live
                // on the model (set directly by `setInstanceFilter`, or by
                // `reload_tree`'s root handling, before this reload began).
                resolve_effective_filter(&live_model.lock(), r)
            } else {
                match reload_state {
                    ReloadState::Keep => resolve_effective_filter(&old_model_for_filter, r),
                    ReloadState::Discard | ReloadState::Reset => None,
                }
            }
        };

        self.load_and_apply_with_filter(target, should_load_children, build_node, true, &get_instance_filter)
            .await;
        self.report_duration(action, start.elapsed());
    }

    fn report_duration(&self, action: PerformanceAction, elapsed: Duration) {
        if let Some(hook) = &self.hooks.lock().performance {
            hook(action, elapsed);
        }
    }

    async fn load_and_apply(
        &self,
        target: NodeRef,
        should_load_children: Option<ShouldLoadChildren>,
        build_node: Option<crate::loader::BuildNode>,
        ignore_cache: bool,
    ) {
        let resolver = ActionsFilterResolver { model: &self.model };
        let get_instance_filter = |r: &NodeRef| resolver.resolve(r);
        self.load_and_apply_with_filter(target, should_load_children, build_node, ignore_cache, &get_instance_filter)
            .await;
    }

    /// As [`Self::load_and_apply`], but with an explicit `getInstanceFilter`
    /// (§4.2), so a reload can resolve filters against the old model for
    /// nodes below the reload root while the root itself uses the live one.
    async fn load_and_apply_with_filter(
        &self,
        target: NodeRef,
        should_load_children: Option<ShouldLoadChildren>,
        build_node: Option<crate::loader::BuildNode>,
        ignore_cache: bool,
        get_instance_filter: &crate::loader::GetInstanceFilter<'_>,
    ) {
        let limit = self.limit_for(&target);
        let parent_node = self.provider_node_for(&target);
        let parent_keys = self.key_path_for(&target);

        let options = LoadOptions {
            hierarchy_level_size_limit: limit,
            get_instance_filter,
            should_load_children,
            build_node,
            ignore_cache,
        };

        log::debug!("starting load for {target:?} (ignore_cache={ignore_cache})");

        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        self.in_flight.lock().insert(
            target.clone(),
            InFlightLoad {
                abort: abort_handle,
            },
        );

        let future = Abortable::new(
            TreeLoader::load_nodes(
                self.provider.as_ref(),
                target.clone(),
                parent_node,
                parent_keys,
                &options,
            ),
            abort_registration,
        );

        match future.await {
            Ok(parts) => {
                self.in_flight.lock().remove(&target);
                self.apply_parts(parts);
            }
            Err(_aborted) => {
                log::debug!("load for {target:?} was cancelled by a later mutation");
            }
        }
    }

    fn apply_parts(&self, parts: Vec<LoadedTreePart>) {
        let mut limit_exceeded = Vec::new();
        let mut load_errors = Vec::new();
        {
            let mut model = self.model.lock();
            for loaded in parts {
                let parent = loaded.parent.clone();
                for node in &loaded.loaded_nodes {
                    if let ModelNode::Info(info) = node {
                        if let InfoNodeKind::ResultSetTooLarge {
                            result_set_size_limit,
                        } = info.kind
                        {
                            limit_exceeded.push((parent.clone(), result_set_size_limit));
                        }
                    }
                }
                if let Some(error) = &loaded.error {
                    load_errors.push((parent.clone(), error.clone()));
                }
                model.add_hierarchy_part(
                    parent.clone(),
                    TreePart {
                        children_by_parent: vec![(parent.clone(), loaded.loaded_nodes)],
                    },
                );
                // `add_hierarchy_part` always clears a prior error; restore
                // it here if this load failed, per §7's taxonomy.
                if loaded.error.is_some() {
                    model.set_error(&parent, loaded.error);
                }
            }
        }
        self.publish_current();

        let hooks = self.hooks.lock();
        if let Some(hook) = &hooks.limit_exceeded {
            for (target, limit) in limit_exceeded {
                hook(target, limit);
            }
        }
        if let Some(hook) = &hooks.load_error {
            for (target, error) in load_errors {
                hook(target, error);
            }
        }
    }

    fn limit_for(&self, target: &NodeRef) -> HierarchyLimit {
        let model = self.model.lock();
        match target {
            NodeRef::Root => model.root.hierarchy_limit.unwrap_or_default(),
            NodeRef::Id(id) => model
                .get_node(id)
                .and_then(ModelNode::as_hierarchy)
                .and_then(|n| n.hierarchy_limit)
                .unwrap_or_default(),
        }
    }

    fn provider_node_for(&self, target: &NodeRef) -> Option<Arc<HierarchyNode>> {
        let model = self.model.lock();
        match target {
            NodeRef::Root => None,
            NodeRef::Id(id) => model
                .get_node(id)
                .and_then(ModelNode::as_hierarchy)
                .map(|n| n.node_data.clone()),
        }
    }

    fn key_path_for(&self, target: &NodeRef) -> Vec<NodeKey> {
        let model = self.model.lock();
        match target {
            NodeRef::Root => Vec::new(),
            NodeRef::Id(id) => model
                .get_node(id)
                .and_then(ModelNode::as_hierarchy)
                .map(|n| {
                    let mut keys = n.node_data.parent_keys.clone();
                    keys.push(n.node_data.key.clone());
                    keys
                })
                .unwrap_or_default(),
        }
    }
}

/// Collects, for every hierarchy node reachable under `root` through a
/// chain of expanded ancestors, whether it is itself expanded or collapsed
/// (§4.2 `reloadNodes`'s `expandedNodes`/`collapsedNodes` sets). Nodes below
/// a collapsed node are not collected: the reload's recursion stops at that
/// collapsed node too, so their state can never matter.
fn collect_expanded_and_collapsed_ids(model: &TreeModel, root: &NodeRef) -> (Vec<NodeId>, Vec<NodeId>) {
    let mut expanded = Vec::new();
    let mut collapsed = Vec::new();
    let mut stack = vec![root.clone()];
    while let Some(current) = stack.pop() {
        for child_id in model.children_of(&current) {
            if let Some(node) = model.get_node(child_id).and_then(ModelNode::as_hierarchy) {
                if node.is_expanded {
                    expanded.push(child_id.clone());
                    stack.push(NodeRef::Id(child_id.clone()));
                } else {
                    collapsed.push(child_id.clone());
                }
            }
        }
    }
    (expanded, collapsed)
}

/// Builds the `keep` reload's `buildNode` (§4.2): re-applies the prior
/// `hierarchyLimit`, `instanceFilter`, and `isSelected` of any freshly
/// loaded node that existed under the same id before, and sets `isExpanded`
/// from the same `expanded_node_ids` set driving the recursion, so a node's
/// expansion state always matches whether the loader actually descended
/// into it.
fn keep_build_node(old_model: TreeModel, expanded_node_ids: HashSet<NodeId>) -> crate::loader::BuildNode {
    Arc::new(move |mut node: crate::model::HierarchyModelNode| {
        if let Some(prev) = old_model.get_node(&node.id).and_then(ModelNode::as_hierarchy) {
            node.hierarchy_limit = prev.hierarchy_limit;
            node.instance_filter = prev.instance_filter.clone();
            node.is_selected = prev.is_selected;
        }
        node.is_expanded = expanded_node_ids.contains(&node.id);
        node
    })
}

/// Resolves the effective instance filter for a target against a given
/// model snapshot. A plain hierarchy node's filter is whatever was set on
/// it directly (instance filters are per-level and independent, per the
/// glossary); a grouping node never carries its own filter and always
/// defers to its `nonGroupingAncestor` (§4.3, §9) — the nearest ancestor
/// that isn't itself a grouping node, which is the root sentinel when the
/// back-reference is absent.
fn resolve_effective_filter(model: &TreeModel, target: &NodeRef) -> Option<InstanceFilter> {
    match target {
        NodeRef::Root => model.root.instance_filter.clone(),
        NodeRef::Id(id) => {
            let node = model.get_node(id).and_then(ModelNode::as_hierarchy)?;
            if !node.node_data.is_grouping() {
                return node.instance_filter.clone();
            }
            match &node.node_data.non_grouping_ancestor {
                None => model.root.instance_filter.clone(),
                Some(ancestor_key) => {
                    let parent_keys = &node.node_data.parent_keys;
                    match parent_keys.iter().position(|k| k == ancestor_key) {
                        Some(idx) => {
                            let ancestor_id = NodeId::from_key_path(parent_keys[..idx].iter(), &parent_keys[idx]);
                            model
                                .get_node(&ancestor_id)
                                .and_then(ModelNode::as_hierarchy)
                                .and_then(|n| n.instance_filter.clone())
                                .or_else(|| model.root.instance_filter.clone())
                        }
                        None => model.root.instance_filter.clone(),
                    }
                }
            }
        }
    }
}

/// Resolves the effective instance filter for a target against the live
/// model behind the mutex (§4.3's `getInstanceFilter`, non-reload path).
struct ActionsFilterResolver<'a> {
    model: &'a Mutex<TreeModel>,
}

impl<'a> InstanceFilterResolver for ActionsFilterResolver<'a> {
    fn resolve(&self, target: &NodeRef) -> Option<InstanceFilter> {
        resolve_effective_filter(&self.model.lock(), target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tree_core::{GroupingNodeKey, NodeKey};

    use crate::model::TreePart;
    use crate::test_support::{generic_key, node_at, LevelOutcome, MockProvider};

    fn no_publish() -> PublishFn {
        Arc::new(|_| {})
    }

    fn actions_with(provider: Arc<MockProvider>) -> Arc<TreeActions<MockProvider>> {
        Arc::new(TreeActions::new(provider, no_publish()))
    }

    #[test]
    fn expand_node_loads_children_exactly_once() {
        let provider = Arc::new(MockProvider::new());
        provider.set_level(
            Vec::new(),
            LevelOutcome::Nodes(vec![node_at(&[], generic_key("a"), "A", true)]),
        );
        provider.set_level(vec![generic_key("a")], LevelOutcome::Nodes(Vec::new()));

        let actions = actions_with(provider.clone());
        futures_executor::block_on(actions.reload_tree(
            &TreeModel::new(),
            ReloadState::Reset,
            PerformanceAction::InitialLoad,
        ));
        let model = actions.snapshot();
        let id = model.children_of(&NodeRef::Root)[0].clone();

        futures_executor::block_on(actions.expand_node(id.clone(), true));
        assert_eq!(provider.get_nodes_call_count(), 2);
        assert!(actions.snapshot().children_known(&NodeRef::Id(id.clone())));

        // Collapsing and re-expanding doesn't reload: children are already known.
        futures_executor::block_on(actions.expand_node(id.clone(), false));
        futures_executor::block_on(actions.expand_node(id, true));
        assert_eq!(provider.get_nodes_call_count(), 2);
        actions.snapshot().validate();
    }

    #[test]
    fn set_hierarchy_limit_reloads_the_level_with_the_new_limit() {
        let provider = Arc::new(MockProvider::new());
        provider.set_level(
            Vec::new(),
            LevelOutcome::Nodes(vec![
                node_at(&[], generic_key("a"), "A", false),
                node_at(&[], generic_key("b"), "B", false),
            ]),
        );

        let actions = actions_with(provider);
        futures_executor::block_on(actions.reload_tree(
            &TreeModel::new(),
            ReloadState::Reset,
            PerformanceAction::InitialLoad,
        ));
        assert_eq!(actions.snapshot().children_of(&NodeRef::Root).len(), 2);

        futures_executor::block_on(actions.set_hierarchy_limit(NodeRef::Root, HierarchyLimit::Limited(1)));
        let model = actions.snapshot();
        // One hierarchy node plus the `ResultSetTooLarge` info node.
        assert_eq!(model.children_of(&NodeRef::Root).len(), 2);
        assert_eq!(model.root.hierarchy_limit, Some(HierarchyLimit::Limited(1)));
        model.validate();
    }

    #[test]
    fn reload_keep_preserves_hierarchy_limit_filter_and_selection() {
        let provider = Arc::new(MockProvider::new());
        provider.set_level(
            Vec::new(),
            LevelOutcome::Nodes(vec![node_at(&[], generic_key("a"), "A", false)]),
        );

        let actions = actions_with(provider);
        futures_executor::block_on(actions.reload_tree(
            &TreeModel::new(),
            ReloadState::Reset,
            PerformanceAction::InitialLoad,
        ));
        let id = actions.snapshot().children_of(&NodeRef::Root)[0].clone();
        futures_executor::block_on(actions.set_hierarchy_limit(NodeRef::Id(id.clone()), HierarchyLimit::Limited(7)));
        actions.select_nodes(&[id.clone()], SelectionChangeType::Add);

        let old_model = actions.snapshot();
        assert_eq!(
            old_model.get_node(&id).unwrap().as_hierarchy().unwrap().hierarchy_limit,
            Some(HierarchyLimit::Limited(7))
        );

        futures_executor::block_on(actions.reload_tree(&old_model, ReloadState::Keep, PerformanceAction::Reload));
        let new_model = actions.snapshot();
        let node = new_model.get_node(&id).unwrap().as_hierarchy().unwrap();
        assert_eq!(node.hierarchy_limit, Some(HierarchyLimit::Limited(7)));
        assert!(node.is_selected);
        new_model.validate();
    }

    #[test]
    fn reload_discard_does_not_preserve_per_node_state() {
        let provider = Arc::new(MockProvider::new());
        provider.set_level(
            Vec::new(),
            LevelOutcome::Nodes(vec![node_at(&[], generic_key("a"), "A", false)]),
        );

        let actions = actions_with(provider);
        futures_executor::block_on(actions.reload_tree(
            &TreeModel::new(),
            ReloadState::Reset,
            PerformanceAction::InitialLoad,
        ));
        let id = actions.snapshot().children_of(&NodeRef::Root)[0].clone();
        futures_executor::block_on(actions.set_hierarchy_limit(NodeRef::Id(id.clone()), HierarchyLimit::Limited(7)));

        let old_model = actions.snapshot();
        futures_executor::block_on(actions.reload_tree(&old_model, ReloadState::Discard, PerformanceAction::Reload));
        let new_model = actions.snapshot();
        let node = new_model.get_node(&id).unwrap().as_hierarchy().unwrap();
        assert_eq!(node.hierarchy_limit, None);
        new_model.validate();
    }

    #[test]
    fn set_hierarchy_limit_preserves_expanded_descendants() {
        let provider = Arc::new(MockProvider::new());
        provider.set_level(
            Vec::new(),
            LevelOutcome::Nodes(vec![node_at(&[], generic_key("a"), "A", true)]),
        );
        provider.set_level(
            vec![generic_key("a")],
            LevelOutcome::Nodes(vec![node_at(&[generic_key("a")], generic_key("b"), "B", true)]),
        );
        provider.set_level(
            vec![generic_key("a"), generic_key("b")],
            LevelOutcome::Nodes(vec![node_at(
                &[generic_key("a"), generic_key("b")],
                generic_key("c"),
                "C",
                false,
            )]),
        );

        let actions = actions_with(provider);
        futures_executor::block_on(actions.reload_tree(
            &TreeModel::new(),
            ReloadState::Reset,
            PerformanceAction::InitialLoad,
        ));
        let a_id = actions.snapshot().children_of(&NodeRef::Root)[0].clone();
        futures_executor::block_on(actions.expand_node(a_id.clone(), true));
        let b_id = actions.snapshot().children_of(&NodeRef::Id(a_id.clone()))[0].clone();
        futures_executor::block_on(actions.expand_node(b_id.clone(), true));
        assert!(actions.snapshot().children_known(&NodeRef::Id(b_id.clone())));

        // Changing the limit on `a` must route through the `keep` reload
        // policy so `b`'s expansion (and its already-loaded child `c`)
        // survive, rather than being flattened by a single-level reload.
        futures_executor::block_on(actions.set_hierarchy_limit(NodeRef::Id(a_id.clone()), HierarchyLimit::Limited(5)));

        let model = actions.snapshot();
        model.validate();
        let b_node = model.get_node(&b_id).unwrap().as_hierarchy().unwrap();
        assert!(
            b_node.is_expanded,
            "descendant expand state must survive a hierarchy-limit change on an ancestor"
        );
        assert!(
            model.children_known(&NodeRef::Id(b_id)),
            "keep-reload must re-descend into previously expanded descendants"
        );
    }

    #[test]
    fn set_instance_filter_preserves_expanded_descendants() {
        let provider = Arc::new(MockProvider::new());
        provider.set_level(
            Vec::new(),
            LevelOutcome::Nodes(vec![node_at(&[], generic_key("a"), "A", true)]),
        );
        provider.set_level(
            vec![generic_key("a")],
            LevelOutcome::Nodes(vec![node_at(&[generic_key("a")], generic_key("b"), "B", true)]),
        );
        provider.set_level(
            vec![generic_key("a"), generic_key("b")],
            LevelOutcome::Nodes(vec![node_at(
                &[generic_key("a"), generic_key("b")],
                generic_key("c"),
                "C",
                false,
            )]),
        );

        let actions = actions_with(provider);
        futures_executor::block_on(actions.reload_tree(
            &TreeModel::new(),
            ReloadState::Reset,
            PerformanceAction::InitialLoad,
        ));
        let a_id = actions.snapshot().children_of(&NodeRef::Root)[0].clone();
        futures_executor::block_on(actions.expand_node(a_id.clone(), true));
        let b_id = actions.snapshot().children_of(&NodeRef::Id(a_id.clone()))[0].clone();
        futures_executor::block_on(actions.expand_node(b_id.clone(), true));
        assert!(actions.snapshot().children_known(&NodeRef::Id(b_id.clone())));

        futures_executor::block_on(
            actions.set_instance_filter(NodeRef::Id(a_id.clone()), InstanceFilter::new("x".into())),
        );

        let model = actions.snapshot();
        model.validate();
        let b_node = model.get_node(&b_id).unwrap().as_hierarchy().unwrap();
        assert!(
            b_node.is_expanded,
            "descendant expand state must survive an instance-filter change on an ancestor"
        );
        assert!(
            model.children_known(&NodeRef::Id(b_id)),
            "keep-reload must re-descend into previously expanded descendants"
        );
    }

    fn hierarchy_node_in_model(model: &mut TreeModel, parent: NodeRef, node: crate::model::HierarchyModelNode) -> NodeId {
        let id = node.id.clone();
        model.add_hierarchy_part(
            parent.clone(),
            TreePart {
                children_by_parent: vec![(parent, vec![ModelNode::Hierarchy(node)])],
            },
        );
        id
    }

    fn plain_hierarchy_node(key: NodeKey, label: &str) -> crate::model::HierarchyModelNode {
        crate::model::HierarchyModelNode {
            id: NodeId::from_key_path(std::iter::empty(), &key),
            node_data: Arc::new(HierarchyNode {
                key,
                parent_keys: Vec::new(),
                label: label.into(),
                has_children: false,
                auto_expand: false,
                supports_filtering: true,
                extended_data: serde_json::Value::Null,
                non_grouping_ancestor: None,
            }),
            label: label.into(),
            has_children: false,
            is_expanded: false,
            is_selected: false,
            is_loading: false,
            hierarchy_limit: None,
            instance_filter: None,
            error: None,
        }
    }

    #[test]
    fn root_reload_cancels_an_in_flight_child_load() {
        use futures_executor::LocalPool;
        use futures_util::task::LocalSpawnExt;

        let provider = Arc::new(MockProvider::new());
        provider.set_level(
            Vec::new(),
            LevelOutcome::Nodes(vec![node_at(&[], generic_key("a"), "A", true)]),
        );
        let gate = provider.set_gated_level(vec![generic_key("a")]);

        let actions = actions_with(provider);
        let mut pool = LocalPool::new();
        let spawner = pool.spawner();

        pool.run_until(actions.reload_tree(
            &TreeModel::new(),
            ReloadState::Reset,
            PerformanceAction::InitialLoad,
        ));
        let child_id = actions.snapshot().children_of(&NodeRef::Root)[0].clone();

        // Start expanding the child; its load pends on the gated provider
        // stream, which nothing has fed yet.
        let task_actions = actions.clone();
        let task_child_id = child_id.clone();
        spawner
            .spawn_local(async move {
                task_actions.expand_node(task_child_id, true).await;
            })
            .unwrap();
        pool.run_until_stalled();
        assert!(
            actions
                .snapshot()
                .get_node(&child_id)
                .unwrap()
                .as_hierarchy()
                .unwrap()
                .is_loading,
            "the child's load should still be pending on the gate"
        );
        assert!(!actions.snapshot().children_known(&NodeRef::Id(child_id.clone())));

        // A root-level reload cancels every other in-flight load (§5). Using
        // `Discard` keeps this test's final assertion unambiguous: nothing
        // should re-trigger a load of the same child's subtree, so the only
        // way its children could become known is via the cancelled load.
        let old_model = actions.snapshot();
        pool.run_until(actions.reload_tree(&old_model, ReloadState::Discard, PerformanceAction::Reload));
        pool.run_until_stalled();

        // Even if the cancelled load's provider call eventually produces a
        // part, it must never be folded into the model.
        let _ = gate.unbounded_send(node_at(&[generic_key("a")], generic_key("late"), "Late", false));
        drop(gate);
        pool.run_until_stalled();

        assert!(!actions.snapshot().children_known(&NodeRef::Id(child_id)));
        actions.snapshot().validate();
    }

    #[test]
    fn resolve_effective_filter_of_a_plain_node_is_its_own_filter() {
        let mut model = TreeModel::new();
        let id = hierarchy_node_in_model(&mut model, NodeRef::Root, plain_hierarchy_node(generic_key("a"), "A"));
        model.set_instance_filter(&NodeRef::Id(id.clone()), InstanceFilter::new("x".into()));

        let resolved = resolve_effective_filter(&model, &NodeRef::Id(id));
        assert_eq!(resolved, Some(InstanceFilter::new("x".into())));
    }

    #[test]
    fn resolve_effective_filter_of_a_grouping_node_defers_to_its_non_grouping_ancestor() {
        let mut model = TreeModel::new();
        let ancestor_key = generic_key("ancestor");
        let ancestor = hierarchy_node_in_model(&mut model, NodeRef::Root, plain_hierarchy_node(ancestor_key.clone(), "Ancestor"));
        model.set_instance_filter(&NodeRef::Id(ancestor.clone()), InstanceFilter::new("scoped".into()));

        let grouping_key = NodeKey::Grouping(GroupingNodeKey::Class { class_name: "Widget".into() });
        let grouping_node = crate::model::HierarchyModelNode {
            id: NodeId::from_key_path([&ancestor_key], &grouping_key),
            node_data: Arc::new(HierarchyNode {
                key: grouping_key.clone(),
                parent_keys: vec![ancestor_key.clone()],
                label: "Widgets".into(),
                has_children: true,
                auto_expand: false,
                supports_filtering: false,
                extended_data: serde_json::Value::Null,
                non_grouping_ancestor: Some(ancestor_key.clone()),
            }),
            label: "Widgets".into(),
            has_children: true,
            is_expanded: false,
            is_selected: false,
            is_loading: false,
            hierarchy_limit: None,
            instance_filter: None,
            error: None,
        };
        let grouping_id = grouping_node.id.clone();
        hierarchy_node_in_model(&mut model, NodeRef::Id(ancestor), grouping_node);

        let resolved = resolve_effective_filter(&model, &NodeRef::Id(grouping_id));
        assert_eq!(resolved, Some(InstanceFilter::new("scoped".into())));
    }

    #[test]
    fn resolve_effective_filter_of_a_grouping_node_without_an_ancestor_falls_back_to_root() {
        let mut model = TreeModel::new();
        model.set_instance_filter(&NodeRef::Root, InstanceFilter::new("root-wide".into()));

        let grouping_key = NodeKey::Grouping(GroupingNodeKey::Class { class_name: "Widget".into() });
        let grouping_node = crate::model::HierarchyModelNode {
            id: NodeId::from_key_path(std::iter::empty(), &grouping_key),
            node_data: Arc::new(HierarchyNode {
                key: grouping_key,
                parent_keys: Vec::new(),
                label: "Widgets".into(),
                has_children: true,
                auto_expand: false,
                supports_filtering: false,
                extended_data: serde_json::Value::Null,
                non_grouping_ancestor: None,
            }),
            label: "Widgets".into(),
            has_children: true,
            is_expanded: false,
            is_selected: false,
            is_loading: false,
            hierarchy_limit: None,
            instance_filter: None,
            error: None,
        };
        let grouping_id = hierarchy_node_in_model(&mut model, NodeRef::Root, grouping_node);

        let resolved = resolve_effective_filter(&model, &NodeRef::Id(grouping_id));
        assert_eq!(resolved, Some(InstanceFilter::new("root-wide".into())));
    }
}
