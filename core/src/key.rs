// Copyright 2024 The Hierarchy Tree contributors.
// Licensed under the Apache License, Version 2.0 (found in
// the LICENSE-APACHE file) or the MIT license (found in
// the LICENSE-MIT file), at your option.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One row an instance-set key groups together: a class and a persistent id,
/// opaque to this crate beyond their role in node identity.
///
/// Always `Serialize`/`Deserialize` (not gated behind the `serde` feature):
/// [`crate::NodeId`] derivation canonicalizes a node's key path through this
/// impl, so it must be available regardless of whether a consumer wants
/// serde support on the richer public types.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceKey {
    pub class_name: Box<str>,
    pub id: Box<str>,
}

/// The variants of a grouping node, mirroring the ways a hierarchy provider
/// may choose to cluster a set of sibling instances.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum GroupingNodeKey {
    Class { class_name: Box<str> },
    Label { label: Box<str> },
    Property {
        class_name: Box<str>,
        property_name: Box<str>,
        value: Box<str>,
    },
    BaseClass { base_class_name: Box<str> },
}

/// A node's identity-bearing key, as produced by the hierarchy provider.
///
/// This is the input to [`crate::NodeId`] generation: two nodes with equal
/// key paths (ancestor keys followed by their own key) always resolve to
/// the same [`crate::NodeId`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum NodeKey {
    /// An opaque key with no further structure the engine can interpret.
    Generic(Box<str>),
    /// A node standing in for one or more concrete instances.
    Instances(Vec<InstanceKey>),
    /// A synthetic grouping node introduced by the provider.
    Grouping(GroupingNodeKey),
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generic(key) => write!(f, "generic:{key}"),
            Self::Instances(keys) => {
                write!(f, "instances:[")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", key.class_name, key.id)?;
                }
                write!(f, "]")
            }
            Self::Grouping(GroupingNodeKey::Class { class_name }) => {
                write!(f, "class-grouping:{class_name}")
            }
            Self::Grouping(GroupingNodeKey::Label { label }) => {
                write!(f, "label-grouping:{label}")
            }
            Self::Grouping(GroupingNodeKey::Property {
                class_name,
                property_name,
                value,
            }) => {
                write!(f, "property-grouping:{class_name}.{property_name}={value}")
            }
            Self::Grouping(GroupingNodeKey::BaseClass { base_class_name }) => {
                write!(f, "base-class-grouping:{base_class_name}")
            }
        }
    }
}
