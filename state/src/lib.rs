// Copyright 2024 The Hierarchy Tree contributors.
// Licensed under the Apache License, Version 2.0 (found in
// the LICENSE-APACHE file) or the MIT license (found in
// the LICENSE-MIT file), at your option.

//! Reactive, UI-framework-agnostic hierarchy tree state engine.
//!
//! This crate owns the state machine behind an asynchronously loaded,
//! filter/limit-aware tree: the immutable [`model`] snapshot, the
//! [`loader`] that turns a [`provider::HierarchyProvider`]'s output into
//! model fragments, the [`actions`] state machine that drives loads and
//! reconciles them back into the model, the [`facade`] a UI layer actually
//! holds, and the [`selection`] handler that turns click/keyboard intents
//! into selection-change commands.
//!
//! The only external collaborator is a [`provider::HierarchyProvider`]
//! implementation; this crate has no knowledge of any specific data source,
//! query language, or renderer.

pub mod actions;
pub mod facade;
pub mod loader;
pub mod model;
pub mod provider;
pub mod selection;

#[cfg(test)]
pub(crate) mod test_support;

pub use actions::{
    LimitExceededHook, LoadErrorHook, PerformanceAction, PerformanceHook, PublishFn, TreeActions,
};
pub use facade::{
    GetFilteredPaths, HierarchyLevelDetails, HierarchyTreeNode, HierarchyTreeState, InfoTreeNode,
    NodeChildren, PendingReloads, TreeNode,
};
pub use loader::{BuildNode, LoadOptions, LoadedTreePart, ReloadState, ShouldLoadChildren, TreeLoader};
pub use model::{
    ExpandEffect, HierarchyModelNode, InfoModelNode, ModelNode, NodeRef, RootState,
    SelectionChangeType, TreeModel, TreePart,
};
pub use provider::{
    FilterChange, FormatterChange, GetNodeInstanceKeysOptions, GetNodesOptions,
    HierarchyChangedEvent, HierarchyProvider, InstanceFilterResolver, InstanceKeyRow,
    NodeFormatter, ProviderStream, TargetPath,
};
pub use selection::{ActivationModifiers, SelectionHandler, SelectionMode, VisibleNode};

pub use tree_core::{
    GroupingNodeKey, HierarchyLimit, HierarchyNode, InfoNodeKind, InstanceFilter, InstanceKey,
    NodeId, NodeKey, ProviderError, TreeError,
};
