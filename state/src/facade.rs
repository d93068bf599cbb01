// Copyright 2024 The Hierarchy Tree contributors.
// Licensed under the Apache License, Version 2.0 (found in
// the LICENSE-APACHE file) or the MIT license (found in
// the LICENSE-MIT file), at your option.

//! The tree state facade (C4): the lifecycle owner a UI layer actually
//! holds. Constructs a provider, wires up `hierarchyChanged`, and exposes
//! a view-oriented projection instead of the raw [`TreeModel`].

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_channel::mpsc;
use parking_lot::Mutex;
use tree_core::{HierarchyLimit, HierarchyNode, InfoNodeKind, InstanceFilter, NodeId, TreeError};

use crate::actions::{LimitExceededHook, LoadErrorHook, PerformanceAction, PerformanceHook, TreeActions};
use crate::loader::ReloadState;
use crate::model::{ModelNode, NodeRef, TreeModel};
use crate::provider::{
    GetNodeInstanceKeysOptions, GetNodesOptions, HierarchyChangedEvent, HierarchyProvider,
    InstanceKeyRow, NodeFormatter, ProviderStream, TargetPath,
};

/// A node as handed to a renderer: either a loaded hierarchy node
/// projection or a forwarded info node, with `children` lazily
/// materialized only once its subtree is loaded (§4.4).
#[derive(Clone, Debug)]
pub enum TreeNode {
    Hierarchy(HierarchyTreeNode),
    Info(InfoTreeNode),
}

#[derive(Clone, Debug)]
pub struct HierarchyTreeNode {
    pub id: NodeId,
    pub label: Box<str>,
    pub is_expanded: bool,
    pub is_loading: bool,
    pub is_filterable: bool,
    pub is_filtered: bool,
    pub node_data: Arc<HierarchyNode>,
    pub extended_data: serde_json::Value,
    /// `Pending` until the subtree is loaded, at which point it becomes the
    /// materialized child list (possibly empty, for a loaded leaf).
    pub children: NodeChildren,
}

#[derive(Clone, Debug)]
pub enum NodeChildren {
    Pending,
    Loaded(Vec<TreeNode>),
}

#[derive(Clone, Debug)]
pub struct InfoTreeNode {
    pub id: NodeId,
    pub kind: InfoNodeKind,
}

/// Per-level details exposed by [`HierarchyTreeState::hierarchy_level_details`].
pub struct HierarchyLevelDetails<'a, P: HierarchyProvider> {
    target: NodeRef,
    state: &'a HierarchyTreeState<P>,
}

impl<'a, P: HierarchyProvider + 'static> HierarchyLevelDetails<'a, P> {
    pub fn node_data(&self) -> Option<Arc<HierarchyNode>> {
        let model = self.state.actions.snapshot();
        match &self.target {
            NodeRef::Root => None,
            NodeRef::Id(id) => model
                .get_node(id)
                .and_then(ModelNode::as_hierarchy)
                .map(|n| n.node_data.clone()),
        }
    }

    pub fn hierarchy_limit(&self) -> HierarchyLimit {
        let model = self.state.actions.snapshot();
        match &self.target {
            NodeRef::Root => model.root.hierarchy_limit.unwrap_or_default(),
            NodeRef::Id(id) => model
                .get_node(id)
                .and_then(ModelNode::as_hierarchy)
                .and_then(|n| n.hierarchy_limit)
                .unwrap_or_default(),
        }
    }

    pub fn instance_filter(&self) -> Option<InstanceFilter> {
        let model = self.state.actions.snapshot();
        match &self.target {
            NodeRef::Root => model.root.instance_filter.clone(),
            NodeRef::Id(id) => model
                .get_node(id)
                .and_then(ModelNode::as_hierarchy)
                .and_then(|n| n.instance_filter.clone()),
        }
    }

    pub async fn set_hierarchy_limit(&self, limit: HierarchyLimit) {
        self.state.actions.set_hierarchy_limit(self.target.clone(), limit).await;
    }

    pub async fn set_instance_filter(&self, filter: InstanceFilter) {
        self.state
            .actions
            .set_instance_filter(self.target.clone(), filter)
            .await;
    }

    /// Delegates to the provider for enumerating this level's instance
    /// keys, without materializing full hierarchy nodes.
    pub fn instance_keys<'b>(&'b self) -> ProviderStream<'b, InstanceKeyRow>
    where
        'a: 'b,
    {
        let parent_node = self.node_data();
        let instance_filter = self.instance_filter();
        let hierarchy_level_size_limit = self.hierarchy_limit();
        self.state.provider.get_node_instance_keys(GetNodeInstanceKeysOptions {
            parent_node,
            instance_filter,
            hierarchy_level_size_limit,
        })
    }
}

/// A future, boxed so the facade stays free of a concrete async-runtime
/// dependency; callers provide their own executor.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A reload request enqueued by a `hierarchyChanged` event, drained by the
/// host from its own event loop (§4.4, §9's observer contract: the engine
/// must not call back into the provider from inside the listener, so the
/// listener only records *that* a reload is due — driving it is left to
/// whatever executes [`HierarchyTreeState::apply_pending_reload`]).
pub type PendingReloads = mpsc::UnboundedReceiver<ReloadState>;

/// Resolves the set of target paths a hierarchy-wide filter should scope
/// to, e.g. by searching a secondary index. Optional: a facade with no
/// such requirement never calls it.
pub type GetFilteredPaths = Arc<dyn Fn() -> BoxFuture<'static, Vec<TargetPath>> + Send + Sync>;

/// The lifecycle owner a consumer actually holds (C4). Generic over the
/// provider type so the facade never boxes it unless the consumer chooses
/// to (`Arc<dyn HierarchyProvider>` works just as well as a concrete `P`).
pub struct HierarchyTreeState<P: HierarchyProvider> {
    provider: Arc<P>,
    actions: Arc<TreeActions<P>>,
    disposed: AtomicBool,
    /// Bumped every time `getFilteredPaths` is kicked off; an in-flight
    /// call checks its own generation before applying results, so a
    /// superseded call is a no-op rather than racing a newer one (§5).
    filter_generation: AtomicU64,
    get_filtered_paths: Mutex<Option<GetFilteredPaths>>,
    is_loading_filter: AtomicBool,
    has_loaded_once: AtomicBool,
    pending_reloads: mpsc::UnboundedSender<ReloadState>,
}

impl<P: HierarchyProvider + 'static> HierarchyTreeState<P> {
    /// Constructs the state owner for a freshly obtained provider. The
    /// caller is responsible for re-constructing (and disposing the old
    /// instance) whenever the provider's identity changes — that decision
    /// lives outside this crate, at the call site that owns configuration.
    ///
    /// Returns the state owner alongside a [`PendingReloads`] stream: every
    /// `hierarchyChanged` event the provider raises enqueues a reload
    /// request there rather than driving it itself, since the provider
    /// calls the listener synchronously and the engine must never call
    /// back into the provider from inside that call (§9). The host drains
    /// the stream on its own event loop and calls
    /// [`Self::apply_pending_reload`] for each item.
    pub fn new(provider: Arc<P>, publish: crate::actions::PublishFn) -> (Arc<Self>, PendingReloads) {
        let actions = Arc::new(TreeActions::new(provider.clone(), publish));
        let (pending_reloads, pending_reloads_rx) = mpsc::unbounded();
        let state = Arc::new(Self {
            provider: provider.clone(),
            actions,
            disposed: AtomicBool::new(false),
            filter_generation: AtomicU64::new(0),
            get_filtered_paths: Mutex::new(None),
            is_loading_filter: AtomicBool::new(false),
            has_loaded_once: AtomicBool::new(false),
            pending_reloads,
        });

        let weak = Arc::downgrade(&state);
        provider.on_hierarchy_changed(Box::new(move |event: HierarchyChangedEvent| {
            if let Some(state) = weak.upgrade() {
                state.on_hierarchy_changed(event);
            }
        }));

        (state, pending_reloads_rx)
    }

    pub fn set_performance_hook(&self, hook: Option<PerformanceHook>) {
        self.actions.set_performance_hook(hook);
    }

    pub fn set_limit_exceeded_hook(&self, hook: Option<LimitExceededHook>) {
        self.actions.set_limit_exceeded_hook(hook);
    }

    pub fn set_load_error_hook(&self, hook: Option<LoadErrorHook>) {
        self.actions.set_load_error_hook(hook);
    }

    pub fn set_get_filtered_paths(&self, callback: Option<GetFilteredPaths>) {
        *self.get_filtered_paths.lock() = callback;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn is_loading(&self) -> bool {
        if self.is_loading_filter.load(Ordering::Acquire) {
            return true;
        }
        let model = self.actions.snapshot();
        model.root.is_loading
    }

    /// §4.4 "Hierarchy-change handling": the only source of
    /// externally-initiated reloads. `hierarchyChanged` is raised
    /// synchronously from inside the provider call that caused it, so this
    /// only enqueues the reload on [`PendingReloads`] — the host drives it
    /// from outside the provider's call stack via
    /// [`Self::apply_pending_reload`] (§9's observer contract: never call
    /// back into the provider from inside the listener).
    fn on_hierarchy_changed(self: &Arc<Self>, event: HierarchyChangedEvent) {
        if self.is_disposed() {
            return;
        }
        let reload_state = if event.filter_change.is_some() {
            ReloadState::Discard
        } else {
            ReloadState::Keep
        };
        // An unbounded, non-blocking send; a disconnected receiver (the
        // host dropped its `PendingReloads`) just means nobody is listening
        // anymore, which is not this callback's problem to report.
        let _ = self.pending_reloads.unbounded_send(reload_state);
    }

    /// Applies one reload request taken off [`PendingReloads`]. Call this
    /// for every item the host pulls from that stream; a no-op once
    /// disposed.
    pub async fn apply_pending_reload(&self, reload_state: ReloadState) {
        if self.is_disposed() {
            return;
        }
        let old_model = self.actions.snapshot();
        self.actions
            .reload_tree(&old_model, reload_state, PerformanceAction::Reload)
            .await;
    }

    /// Kicks off the very first load. Call once after construction; the
    /// facade doesn't do this implicitly so the caller controls exactly
    /// when the first provider round-trip starts.
    pub async fn initial_load(&self) {
        let old_model = self.actions.snapshot();
        let action = if self.has_loaded_once.swap(true, Ordering::AcqRel) {
            PerformanceAction::Reload
        } else {
            PerformanceAction::InitialLoad
        };
        self.actions.reload_tree(&old_model, ReloadState::Reset, action).await;
    }

    /// §4.4 "Filter resolution". Resolves `getFilteredPaths` (if set) and
    /// applies the result to the provider, unless disposed or superseded
    /// by a newer call before it settles.
    pub async fn resolve_filtered_paths(&self) {
        let Some(callback) = self.get_filtered_paths.lock().clone() else {
            return;
        };
        let generation = self.filter_generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.is_loading_filter.store(true, Ordering::Release);
        let paths = callback().await;
        self.is_loading_filter.store(false, Ordering::Release);

        if self.is_disposed() || self.filter_generation.load(Ordering::Acquire) != generation {
            return;
        }
        self.provider.set_hierarchy_filter(paths);
    }

    pub async fn expand_node(&self, id: NodeId, expanded: bool) {
        self.actions.expand_node(id, expanded).await;
    }

    pub fn select_nodes(&self, ids: &[NodeId], change: crate::model::SelectionChangeType) {
        self.actions.select_nodes(ids, change);
    }

    pub fn is_node_selected(&self, id: &NodeId) -> bool {
        self.actions.snapshot().is_node_selected(id)
    }

    pub fn get_node(&self, id: &NodeId) -> Option<Arc<HierarchyNode>> {
        self.actions
            .snapshot()
            .get_node(id)
            .and_then(ModelNode::as_hierarchy)
            .map(|n| n.node_data.clone())
    }

    pub fn hierarchy_level_details(&self, target: NodeRef) -> HierarchyLevelDetails<'_, P> {
        HierarchyLevelDetails { target, state: self }
    }

    /// §4.4 "Formatter propagation". Forwarding to the provider triggers a
    /// `hierarchyChanged` event, which in turn drives a reload — the
    /// facade itself does not reload directly here.
    pub fn set_formatter(&self, formatter: Option<NodeFormatter>) {
        self.provider.set_formatter(formatter);
    }

    /// §4.4 "Projection": derives the read-only `rootNodes` view from the
    /// current model, lazily materializing each node's `children` only
    /// when its subtree is loaded.
    pub fn root_nodes(&self) -> Vec<TreeNode> {
        let model = self.actions.snapshot();
        project_children(&model, &NodeRef::Root)
    }

    pub async fn reload_tree(&self, reload_state: ReloadState) {
        let old_model = self.actions.snapshot();
        self.actions
            .reload_tree(&old_model, reload_state, PerformanceAction::Reload)
            .await;
    }

    /// Disposes the provider and marks this owner dead; any in-flight
    /// `getFilteredPaths` is ignored from this point, and every in-flight
    /// load stream is abandoned since `TreeActions` is dropped with it.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.actions.dispose();
        self.provider.dispose();
    }
}

fn project_children(model: &TreeModel, parent: &NodeRef) -> Vec<TreeNode> {
    model
        .children_of(parent)
        .iter()
        .filter_map(|id| model.get_node(id))
        .map(|node| project_node(model, node))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    use crate::model::SelectionChangeType;
    use crate::test_support::{generic_key, node_at, LevelOutcome, MockProvider};

    fn no_publish() -> crate::actions::PublishFn {
        Arc::new(|_| {})
    }

    #[test]
    fn initial_load_populates_root_nodes() {
        let provider = Arc::new(MockProvider::new());
        provider.set_level(
            Vec::new(),
            LevelOutcome::Nodes(vec![node_at(&[], generic_key("a"), "A", false)]),
        );
        let (state, _pending) = HierarchyTreeState::new(provider, no_publish());

        futures_executor::block_on(state.initial_load());
        let roots = state.root_nodes();
        assert_eq!(roots.len(), 1);
        match &roots[0] {
            TreeNode::Hierarchy(node) => assert_eq!(node.label.as_ref(), "A"),
            TreeNode::Info(_) => panic!("expected a hierarchy node"),
        }
    }

    #[test]
    fn select_and_query_round_trips_through_the_facade() {
        let provider = Arc::new(MockProvider::new());
        provider.set_level(
            Vec::new(),
            LevelOutcome::Nodes(vec![node_at(&[], generic_key("a"), "A", false)]),
        );
        let (state, _pending) = HierarchyTreeState::new(provider, no_publish());
        futures_executor::block_on(state.initial_load());

        let id = match &state.root_nodes()[0] {
            TreeNode::Hierarchy(node) => node.id.clone(),
            TreeNode::Info(_) => panic!("expected a hierarchy node"),
        };
        assert!(!state.is_node_selected(&id));
        state.select_nodes(&[id.clone()], SelectionChangeType::Add);
        assert!(state.is_node_selected(&id));
    }

    #[test]
    fn dispose_marks_the_owner_dead_and_releases_the_provider() {
        let provider = Arc::new(MockProvider::new());
        let (state, _pending) = HierarchyTreeState::new(provider.clone(), no_publish());
        assert!(!state.is_disposed());

        state.dispose();
        assert!(state.is_disposed());
        assert!(provider.is_disposed());
    }

    #[test]
    fn a_hierarchy_changed_event_enqueues_a_pending_reload_instead_of_driving_it() {
        let provider = Arc::new(MockProvider::new());
        provider.set_level(
            Vec::new(),
            LevelOutcome::Nodes(vec![node_at(&[], generic_key("a"), "A", false)]),
        );
        let (state, mut pending) = HierarchyTreeState::new(provider, no_publish());
        futures_executor::block_on(state.initial_load());

        state.set_formatter(None);

        let reload_state = futures_executor::block_on(pending.next()).expect("a reload was enqueued");
        assert_eq!(reload_state, ReloadState::Keep);

        futures_executor::block_on(state.apply_pending_reload(reload_state));
        assert_eq!(state.root_nodes().len(), 1);
    }
}

fn project_node(model: &TreeModel, node: &ModelNode) -> TreeNode {
    match node {
        ModelNode::Hierarchy(h) => {
            let target = NodeRef::Id(h.id.clone());
            let children = if model.children_known(&target) {
                NodeChildren::Loaded(project_children(model, &target))
            } else {
                NodeChildren::Pending
            };
            TreeNode::Hierarchy(HierarchyTreeNode {
                id: h.id.clone(),
                label: h.label.clone(),
                is_expanded: h.is_expanded,
                is_loading: h.is_loading,
                is_filterable: h.node_data.supports_filtering && h.has_children,
                is_filtered: h
                    .instance_filter
                    .as_ref()
                    .map(|f| !f.is_empty())
                    .unwrap_or(false),
                node_data: h.node_data.clone(),
                extended_data: h.node_data.extended_data.clone(),
                children,
            })
        }
        ModelNode::Info(info) => TreeNode::Info(InfoTreeNode {
            id: info.id.clone(),
            kind: info.kind.clone(),
        }),
    }
}
