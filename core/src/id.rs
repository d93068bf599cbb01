// Copyright 2024 The Hierarchy Tree contributors.
// Licensed under the Apache License, Version 2.0 (found in
// the LICENSE-APACHE file) or the MIT license (found in
// the LICENSE-MIT file), at your option.

use std::{fmt, sync::Arc};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::key::NodeKey;

/// The stable identity of a hierarchy node, derived from its key path
/// (ancestor keys followed by its own key).
///
/// Two nodes with equal key paths always produce an equal [`NodeId`], which
/// is what lets a reload of the same hierarchy preserve node identities.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct NodeId(Arc<str>);

impl NodeId {
    /// Derives a deterministic id from a node's key path: the keys of its
    /// ancestors, in root-to-parent order, followed by its own key.
    ///
    /// The representation is the JSON encoding of that path. Field order in
    /// [`NodeKey`] and [`crate::InstanceKey`] is fixed by their struct
    /// declarations, so two equal key paths always serialize to the same
    /// bytes regardless of when or how they were produced.
    pub fn from_key_path<'a>(parent_keys: impl IntoIterator<Item = &'a NodeKey>, key: &NodeKey) -> Self {
        let mut path: Vec<&NodeKey> = parent_keys.into_iter().collect();
        path.push(key);
        let encoded = serde_json::to_string(&path).unwrap_or_default();
        Self(Arc::from(encoded))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
