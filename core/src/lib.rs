// Copyright 2024 The Hierarchy Tree contributors.
// Licensed under the Apache License, Version 2.0 (found in
// the LICENSE-APACHE file) or the MIT license (found in
// the LICENSE-MIT file), at your option.

//! Shared data model for the reactive hierarchy tree state engine.
//!
//! This crate has no behavior of its own: it only defines the vocabulary
//! that `tree-state` and any hierarchy provider implementation exchange.
//! It knows nothing about databases, query languages, or rendering.

mod error;
mod filter;
mod id;
mod key;
mod limit;
mod node;

pub use error::{InfoNodeKind, ProviderError, TreeError};
pub use filter::InstanceFilter;
pub use id::NodeId;
pub use key::{GroupingNodeKey, InstanceKey, NodeKey};
pub use limit::HierarchyLimit;
pub use node::HierarchyNode;
