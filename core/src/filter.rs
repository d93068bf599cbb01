// Copyright 2024 The Hierarchy Tree contributors.
// Licensed under the Apache License, Version 2.0 (found in
// the LICENSE-APACHE file) or the MIT license (found in
// the LICENSE-MIT file), at your option.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A structured predicate applied to a single hierarchy level.
///
/// The engine never interprets the contents of a filter; it only stores it,
/// compares it for equality and emptiness, and hands it back to the
/// hierarchy provider that alone knows how to turn it into a query.
/// Filter-rule construction is explicitly out of scope for this crate.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct InstanceFilter(serde_json::Value);

impl InstanceFilter {
    pub fn new(expression: serde_json::Value) -> Self {
        Self(expression)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }

    pub fn expression(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<serde_json::Value> for InstanceFilter {
    fn from(expression: serde_json::Value) -> Self {
        Self::new(expression)
    }
}
