// Copyright 2024 The Hierarchy Tree contributors.
// Licensed under the Apache License, Version 2.0 (found in
// the LICENSE-APACHE file) or the MIT license (found in
// the LICENSE-MIT file), at your option.

//! The contract between the engine and the external hierarchy provider.
//! This module defines only the interface; no implementation of a provider
//! (query planning, database access, schema inspection) belongs in this
//! crate.

use std::{fmt, pin::Pin, sync::Arc};

use futures_core::Stream;
use tree_core::{HierarchyLimit, HierarchyNode, InstanceFilter, ProviderError};

use crate::model::NodeRef;

/// A lazy, finite, non-restartable sequence of fallible items, as returned
/// by [`HierarchyProvider::get_nodes`] and
/// [`HierarchyProvider::get_node_instance_keys`].
pub type ProviderStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T, ProviderError>> + Send + 'a>>;

/// Options passed to [`HierarchyProvider::get_nodes`].
#[derive(Clone, Debug)]
pub struct GetNodesOptions {
    /// `None` requests the root level.
    pub parent_node: Option<Arc<HierarchyNode>>,
    pub hierarchy_level_size_limit: HierarchyLimit,
    pub instance_filter: Option<InstanceFilter>,
    /// Bypass any result cache the provider may keep.
    pub ignore_cache: bool,
}

/// Options passed to [`HierarchyProvider::get_node_instance_keys`].
#[derive(Clone, Debug)]
pub struct GetNodeInstanceKeysOptions {
    pub parent_node: Option<Arc<HierarchyNode>>,
    pub instance_filter: Option<InstanceFilter>,
    pub hierarchy_level_size_limit: HierarchyLimit,
}

/// One concrete instance key, as returned by
/// [`HierarchyProvider::get_node_instance_keys`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceKeyRow {
    pub class_name: Box<str>,
    pub id: Box<str>,
}

/// Describes what changed in a `hierarchyChanged` event.
#[derive(Clone, Debug, Default)]
pub struct HierarchyChangedEvent {
    pub filter_change: Option<FilterChange>,
    pub formatter_change: Option<FormatterChange>,
}

#[derive(Clone, Debug)]
pub struct FilterChange {
    pub new_filter: Option<InstanceFilter>,
}

#[derive(Clone, Debug)]
pub struct FormatterChange;

/// A node-label formatter. Boxed as a trait object so providers and the
/// facade can swap it without generic propagation through the whole engine.
pub type NodeFormatter = Arc<dyn Fn(&HierarchyNode) -> String + Send + Sync>;

/// A target path used to scope a hierarchy-wide filter via
/// [`HierarchyProvider::set_hierarchy_filter`].
pub type TargetPath = Vec<tree_core::NodeKey>;

/// The only collaborator the engine calls outward through. Implementations
/// own query planning, database access, schema inspection, and
/// grouping/merging; none of that is this crate's concern.
///
/// This trait is deliberately *not* `async_trait`-based: every method either
/// returns a plain value or a boxed stream, which keeps the trait
/// dyn-compatible and lets the engine stay agnostic about which async
/// runtime ultimately drives the returned streams.
pub trait HierarchyProvider: fmt::Debug + Send + Sync {
    /// Loads the children of `options.parent_node` (or the root level, if
    /// `None`), honoring the given size limit, filter, and cache policy.
    fn get_nodes<'a>(&'a self, options: GetNodesOptions) -> ProviderStream<'a, HierarchyNode>;

    /// Enumerates the concrete instance keys backing a hierarchy level,
    /// without materializing full hierarchy nodes.
    fn get_node_instance_keys<'a>(
        &'a self,
        options: GetNodeInstanceKeysOptions,
    ) -> ProviderStream<'a, InstanceKeyRow>;

    /// Installs (or clears, if `None`) a label formatter. Firing this always
    /// raises a `hierarchyChanged` event with `formatter_change` set.
    fn set_formatter(&self, formatter: Option<NodeFormatter>);

    /// Installs (or clears, if `paths` is empty) a hierarchy-wide target-path
    /// filter. Firing this always raises a `hierarchyChanged` event with
    /// `filter_change.new_filter` set.
    fn set_hierarchy_filter(&self, paths: Vec<TargetPath>);

    /// Registers a listener invoked synchronously, from within the call that
    /// triggered the change, whenever the hierarchy changes. The engine must
    /// never call back into the provider from inside a listener.
    fn on_hierarchy_changed(&self, listener: Box<dyn Fn(HierarchyChangedEvent) + Send + Sync>);

    /// Releases any resources held by the provider. Guaranteed to be called
    /// exactly once, when the owning [`crate::HierarchyTreeState`] disposes
    /// or swaps providers.
    fn dispose(&self);
}

/// Resolves the effective [`InstanceFilter`] for a node, given the current
/// model. Implemented by [`crate::actions::TreeActions`]; exposed here so
/// [`crate::loader::TreeLoader`] can depend on the narrow function instead of
/// the whole actions type.
pub trait InstanceFilterResolver {
    fn resolve(&self, target: &NodeRef) -> Option<InstanceFilter>;
}
