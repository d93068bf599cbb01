// Copyright 2024 The Hierarchy Tree contributors.
// Licensed under the Apache License, Version 2.0 (found in
// the LICENSE-APACHE file) or the MIT license (found in
// the LICENSE-MIT file), at your option.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A per-level cap on the number of rows a hierarchy provider may return.
///
/// The source treats the `resultSetSizeLimit` carried by a
/// `ResultSetTooLarge` info node as the *offending* limit, but leaves open
/// whether "unbounded" is itself a legal prior limit that a provider can
/// still report as exceeded. This type does not guess: `Unbounded` is a
/// first-class variant the engine forwards verbatim, exactly as it forwards
/// any numeric limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum HierarchyLimit {
    Unbounded,
    Limited(u32),
}

impl HierarchyLimit {
    pub fn as_limited(self) -> Option<u32> {
        match self {
            Self::Unbounded => None,
            Self::Limited(n) => Some(n),
        }
    }
}

impl Default for HierarchyLimit {
    fn default() -> Self {
        Self::Unbounded
    }
}
