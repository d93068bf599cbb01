// Copyright 2024 The Hierarchy Tree contributors.
// Licensed under the Apache License, Version 2.0 (found in
// the LICENSE-APACHE file) or the MIT license (found in
// the LICENSE-MIT file), at your option.

//! An in-memory [`HierarchyProvider`] used only by this crate's own tests.
//! Every level's children are whatever [`MockProvider::set_level`] last
//! registered for that key path; there is no query planning behind it.

use std::fmt;
use std::sync::Arc;

use futures_channel::mpsc;
use futures_util::{stream, StreamExt};
use parking_lot::Mutex;
use tree_core::{HierarchyLimit, HierarchyNode, InstanceFilter, InstanceKey, NodeKey, ProviderError};

use crate::provider::{
    FilterChange, FormatterChange, GetNodeInstanceKeysOptions, GetNodesOptions,
    HierarchyChangedEvent, HierarchyProvider, InstanceKeyRow, NodeFormatter, ProviderStream,
    TargetPath,
};

/// What loading a registered level should produce.
#[derive(Clone)]
pub(crate) enum LevelOutcome {
    Nodes(Vec<HierarchyNode>),
    RowsLimitExceeded(u32),
    Timeout(String),
    Other(String),
}

#[derive(Default)]
struct Inner {
    levels: hashbrown::HashMap<Vec<NodeKey>, LevelOutcome>,
    /// Levels registered via [`MockProvider::set_gated_level`]: loading them
    /// pends on the provider stream until the test sends nodes (or drops the
    /// sender to end it), which is what lets a cancellation test observe a
    /// load while it is still in flight.
    gated: hashbrown::HashMap<Vec<NodeKey>, mpsc::UnboundedReceiver<HierarchyNode>>,
    listeners: Vec<Arc<dyn Fn(HierarchyChangedEvent) + Send + Sync>>,
    disposed: bool,
    get_nodes_calls: u32,
}

/// A hand-rolled `HierarchyProvider` stand-in for unit tests.
#[derive(Default)]
pub(crate) struct MockProvider {
    inner: Mutex<Inner>,
}

impl fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockProvider").finish_non_exhaustive()
    }
}

impl MockProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers what loading the level at `path` (the full ancestor key
    /// path of the parent, empty for the root) should produce.
    pub(crate) fn set_level(&self, path: Vec<NodeKey>, outcome: LevelOutcome) {
        self.inner.lock().levels.insert(path, outcome);
    }

    pub(crate) fn get_nodes_call_count(&self) -> u32 {
        self.inner.lock().get_nodes_calls
    }

    /// Registers `path` as a gated level: the first (and only) call to
    /// `get_nodes` for it returns a stream fed by the returned sender,
    /// rather than one resolved from a fixture list up front. Pending until
    /// a node is sent, and completes once the sender is dropped.
    pub(crate) fn set_gated_level(&self, path: Vec<NodeKey>) -> mpsc::UnboundedSender<HierarchyNode> {
        let (tx, rx) = mpsc::unbounded();
        self.inner.lock().gated.insert(path, rx);
        tx
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    /// Raises a `hierarchyChanged` event synchronously, as a real provider
    /// would from inside the call that caused it.
    pub(crate) fn fire_hierarchy_changed(&self, event: HierarchyChangedEvent) {
        let listeners: Vec<_> = self.inner.lock().listeners.clone();
        for listener in listeners {
            listener(event.clone());
        }
    }
}

fn path_for(parent_node: &Option<Arc<HierarchyNode>>) -> Vec<NodeKey> {
    match parent_node {
        None => Vec::new(),
        Some(node) => {
            let mut path = node.parent_keys.clone();
            path.push(node.key.clone());
            path
        }
    }
}

fn filter_nodes(nodes: Vec<HierarchyNode>, filter: Option<&InstanceFilter>) -> Vec<HierarchyNode> {
    match filter {
        None => nodes,
        Some(f) if f.is_empty() => nodes,
        Some(f) => {
            let needle = f.expression().as_str().unwrap_or_default();
            nodes.into_iter().filter(|n| n.label.contains(needle)).collect()
        }
    }
}

impl HierarchyProvider for MockProvider {
    fn get_nodes<'a>(&'a self, options: GetNodesOptions) -> ProviderStream<'a, HierarchyNode> {
        let path = path_for(&options.parent_node);
        let gated = {
            let mut inner = self.inner.lock();
            inner.get_nodes_calls += 1;
            inner.gated.remove(&path)
        };
        if let Some(rx) = gated {
            return Box::pin(rx.map(Ok));
        }

        let outcome = self.inner.lock().levels.get(&path).cloned();

        let items: Vec<Result<HierarchyNode, ProviderError>> = match outcome {
            None => Vec::new(),
            Some(LevelOutcome::Nodes(nodes)) => {
                let filtered = filter_nodes(nodes, options.instance_filter.as_ref());
                match options.hierarchy_level_size_limit.as_limited() {
                    Some(limit) if filtered.len() > limit as usize => {
                        let mut rows: Vec<_> =
                            filtered.into_iter().take(limit as usize).map(Ok).collect();
                        rows.push(Err(ProviderError::RowsLimitExceeded {
                            limit: HierarchyLimit::Limited(limit),
                        }));
                        rows
                    }
                    _ => filtered.into_iter().map(Ok).collect(),
                }
            }
            Some(LevelOutcome::RowsLimitExceeded(limit)) => {
                vec![Err(ProviderError::RowsLimitExceeded {
                    limit: HierarchyLimit::Limited(limit),
                })]
            }
            Some(LevelOutcome::Timeout(message)) => vec![Err(ProviderError::Timeout { message })],
            Some(LevelOutcome::Other(message)) => vec![Err(ProviderError::Other { message })],
        };

        Box::pin(stream::iter(items))
    }

    fn get_node_instance_keys<'a>(
        &'a self,
        options: GetNodeInstanceKeysOptions,
    ) -> ProviderStream<'a, InstanceKeyRow> {
        let outcome = self.inner.lock().levels.get(&path_for(&options.parent_node)).cloned();
        let rows: Vec<Result<InstanceKeyRow, ProviderError>> = match outcome {
            Some(LevelOutcome::Nodes(nodes)) => nodes
                .into_iter()
                .filter_map(|n| match n.key {
                    NodeKey::Instances(keys) => Some(keys),
                    _ => None,
                })
                .flatten()
                .map(|k| {
                    Ok(InstanceKeyRow {
                        class_name: k.class_name,
                        id: k.id,
                    })
                })
                .collect(),
            _ => Vec::new(),
        };
        Box::pin(stream::iter(rows))
    }

    fn set_formatter(&self, _formatter: Option<NodeFormatter>) {
        self.fire_hierarchy_changed(HierarchyChangedEvent {
            filter_change: None,
            formatter_change: Some(FormatterChange),
        });
    }

    fn set_hierarchy_filter(&self, _paths: Vec<TargetPath>) {
        self.fire_hierarchy_changed(HierarchyChangedEvent {
            filter_change: Some(FilterChange { new_filter: None }),
            formatter_change: None,
        });
    }

    fn on_hierarchy_changed(&self, listener: Box<dyn Fn(HierarchyChangedEvent) + Send + Sync>) {
        self.inner.lock().listeners.push(Arc::from(listener));
    }

    fn dispose(&self) {
        self.inner.lock().disposed = true;
    }
}

pub(crate) fn generic_key(key: &str) -> NodeKey {
    NodeKey::Generic(key.into())
}

pub(crate) fn instances_key(class_name: &str, id: &str) -> NodeKey {
    NodeKey::Instances(vec![InstanceKey {
        class_name: class_name.into(),
        id: id.into(),
    }])
}

/// Builds a fixture node whose ancestor path is `parent_keys`.
pub(crate) fn node_at(parent_keys: &[NodeKey], key: NodeKey, label: &str, has_children: bool) -> HierarchyNode {
    HierarchyNode {
        key,
        parent_keys: parent_keys.to_vec(),
        label: label.into(),
        has_children,
        auto_expand: false,
        supports_filtering: true,
        extended_data: serde_json::Value::Null,
        non_grouping_ancestor: None,
    }
}
