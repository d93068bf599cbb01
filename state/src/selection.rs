// Copyright 2024 The Hierarchy Tree contributors.
// Licensed under the Apache License, Version 2.0 (found in
// the LICENSE-APACHE file) or the MIT license (found in
// the LICENSE-MIT file), at your option.

//! The selection handler (C5): turns a visible node list plus a click or
//! key event into the set of ids a single `selectNodes` call should apply.

use tree_core::NodeId;

use crate::model::SelectionChangeType;

/// How a tree consumer interprets activation events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SelectionMode {
    /// Activation is disabled entirely.
    None,
    #[default]
    Single,
    Multiple,
    Extended,
}

/// A flat, pre-order-visible projection of the currently loaded and
/// expanded tree, rebuilt by the facade whenever the underlying
/// `rootNodes` change. The handler only ever reasons about positions in
/// this slice; it has no knowledge of the tree's actual shape.
#[derive(Clone, Copy, Debug)]
pub struct VisibleNode<'a> {
    pub id: &'a NodeId,
}

/// A click or keyboard activation event (`Space`/`Enter` are equivalent to
/// a click), as seen by [`SelectionHandler`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ActivationModifiers {
    pub shift: bool,
    pub ctrl: bool,
}

/// Tracks the anchor node for shift-range selection across activations.
/// Stateless with respect to the tree itself — it is handed the visible
/// order fresh on every activation.
#[derive(Clone, Debug, Default)]
pub struct SelectionHandler {
    mode: SelectionMode,
    previous_selection_id: Option<NodeId>,
}

impl SelectionHandler {
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            mode,
            previous_selection_id: None,
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SelectionMode) {
        self.mode = mode;
    }

    pub fn previous_selection_id(&self) -> Option<&NodeId> {
        self.previous_selection_id.as_ref()
    }

    /// Drops the anchor if `visible` no longer contains it. A reload that
    /// drops the anchor node clears it outright — it never falls back to a
    /// different node.
    pub fn prune_anchor(&mut self, visible: &[VisibleNode<'_>]) {
        if let Some(anchor) = &self.previous_selection_id {
            if !visible.iter().any(|n| n.id == anchor) {
                self.previous_selection_id = None;
            }
        }
    }

    /// Computes the `(ids, change)` an activation of `target` should apply,
    /// given the current flat visible order and `target`'s prior selected
    /// state, and updates the anchor accordingly (§4.5's table).
    ///
    /// Returns `None` for [`SelectionMode::None`], or if `target` isn't in
    /// `visible` (it can't be activated if it isn't shown).
    pub fn activate(
        &mut self,
        visible: &[VisibleNode<'_>],
        target: &NodeId,
        was_selected: bool,
        modifiers: ActivationModifiers,
    ) -> Option<(Vec<NodeId>, SelectionChangeType)> {
        if self.mode == SelectionMode::None {
            return None;
        }
        let target_index = visible.iter().position(|n| n.id == target)?;

        let result = match self.mode {
            SelectionMode::None => unreachable!(),
            SelectionMode::Single => {
                self.previous_selection_id = Some(target.clone());
                toggle(target, was_selected, SelectionChangeType::Replace)
            }
            SelectionMode::Multiple => {
                self.previous_selection_id = Some(target.clone());
                toggle(target, was_selected, SelectionChangeType::Add)
            }
            SelectionMode::Extended if modifiers.shift => {
                // Range selection never updates the anchor.
                return Some(self.range_from_anchor(visible, target_index));
            }
            SelectionMode::Extended if modifiers.ctrl => {
                self.previous_selection_id = Some(target.clone());
                toggle(target, was_selected, SelectionChangeType::Add)
            }
            SelectionMode::Extended => {
                self.previous_selection_id = Some(target.clone());
                (vec![target.clone()], SelectionChangeType::Replace)
            }
        };

        Some(result)
    }

    fn range_from_anchor(
        &self,
        visible: &[VisibleNode<'_>],
        target_index: usize,
    ) -> (Vec<NodeId>, SelectionChangeType) {
        let anchor_index = self
            .previous_selection_id
            .as_ref()
            .and_then(|anchor| visible.iter().position(|n| n.id == anchor))
            .unwrap_or(target_index);

        let (lo, hi) = if anchor_index <= target_index {
            (anchor_index, target_index)
        } else {
            (target_index, anchor_index)
        };

        let ids = visible[lo..=hi].iter().map(|n| n.id.clone()).collect();
        (ids, SelectionChangeType::Replace)
    }
}

/// `add`/`replace [N]` if not already selected, else `remove [N]`.
fn toggle(
    target: &NodeId,
    was_selected: bool,
    select_change: SelectionChangeType,
) -> (Vec<NodeId>, SelectionChangeType) {
    if was_selected {
        (vec![target.clone()], SelectionChangeType::Remove)
    } else {
        (vec![target.clone()], select_change)
    }
}
