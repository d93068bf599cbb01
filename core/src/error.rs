// Copyright 2024 The Hierarchy Tree contributors.
// Licensed under the Apache License, Version 2.0 (found in
// the LICENSE-APACHE file) or the MIT license (found in
// the LICENSE-MIT file), at your option.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::limit::HierarchyLimit;

/// A failure reported by a hierarchy provider while loading a single level.
///
/// This is the type a [`crate`] consumer's `HierarchyProvider` implementation
/// returns from a failed item in the node stream. The loader classifies it
/// into an info node or a node/root `error` field; it never escapes the
/// engine's public API as an `Err`.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider stopped after hitting the per-level row limit.
    #[error("result set exceeds the hierarchy level size limit")]
    RowsLimitExceeded { limit: HierarchyLimit },
    /// The provider reported that the request took too long.
    #[error("timed out loading hierarchy level: {message}")]
    Timeout { message: String },
    /// Any other provider failure, with no further classification.
    #[error("failed to load hierarchy level: {message}")]
    Other { message: String },
}

/// The kind of a non-hierarchy child node synthesized by the loader to
/// surface an error, limit, or empty-filter condition to a renderer.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", tag = "type"))]
pub enum InfoNodeKind {
    /// The sole child of a parent whose children exceeded the size limit.
    ResultSetTooLarge { result_set_size_limit: HierarchyLimit },
    /// The sole child of a parent whose active instance filter matched
    /// nothing, where an unfiltered level would legitimately have children.
    NoFilterMatches,
    /// A transient placeholder shown while a level is loading. Not produced
    /// by the loader itself (the model's `is_loading` flag covers that) but
    /// reserved for facades that choose to materialize loading state as a
    /// placeholder child rather than an out-of-band flag.
    ChildrenLoad,
    /// A children-load failure that isn't a rows-limit or timeout.
    Unknown { message: String },
}

/// A node-level error recorded after a failed children load.
///
/// Re-expanding a node whose `error` is `ChildrenLoad` re-triggers the load
/// with cache bypass.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", tag = "type"))]
pub enum TreeError {
    ChildrenLoad { message: String },
    Timeout { message: String },
}

impl ProviderError {
    /// The `rootNode.error` / node `error` this failure sets, per the error
    /// taxonomy: a rows-limit failure is surfaced purely as an info node and
    /// sets no node-level error.
    pub fn as_tree_error(&self) -> Option<TreeError> {
        match self {
            Self::Timeout { message } => Some(TreeError::Timeout {
                message: message.clone(),
            }),
            Self::Other { message } => Some(TreeError::ChildrenLoad {
                message: message.clone(),
            }),
            Self::RowsLimitExceeded { .. } => None,
        }
    }
}
