//! Block tree stored as an array in insertion order.
//!
//! Parents are always inserted before their children, so every node has a lower index than all
//! of its descendants. This lets weights be propagated to ancestors in a single backward pass.
//! Nodes refer to each other by index. Indices change only when the array is pruned.

use std::collections::HashSet;

use anyhow::{ensure, Result};
use derivative::Derivative;
use hash_hasher::HashedMap;
use types::{
    phase0::primitives::{Epoch, Gwei, H256},
    preset::Preset,
};

use crate::{error::Error, misc::ProtoBlock};

pub type Difference = i64;

/// Rules for deciding whether a block may be the head.
///
/// A block is viable if the checkpoints in its post-state match the ones in the store.
/// The comparison is skipped while the store is still at its anchor checkpoint.
#[derive(Clone, Copy, Debug)]
pub struct Viability {
    pub justified_epoch: Epoch,
    pub finalized_epoch: Epoch,
    pub anchor_epoch: Epoch,
}

impl Viability {
    #[must_use]
    pub fn is_viable(self, block: &ProtoBlock<impl Preset>) -> bool {
        let correct_justified = self.justified_epoch <= self.anchor_epoch
            || block.justified_checkpoint.epoch == self.justified_epoch;

        let correct_finalized = self.finalized_epoch <= self.anchor_epoch
            || block.finalized_checkpoint.epoch == self.finalized_epoch;

        correct_justified && correct_finalized
    }
}

#[derive(Clone, Debug)]
struct ProtoNode<P: Preset> {
    proto_block: ProtoBlock<P>,
    parent: Option<usize>,
    weight: Gwei,
    best_child: Option<usize>,
    best_descendant: Option<usize>,
}

#[derive(Clone, Derivative)]
#[derivative(Default(bound = ""))]
pub struct ProtoArray<P: Preset> {
    nodes: Vec<ProtoNode<P>>,
    indices: HashedMap<H256, usize>,
}

impl<P: Preset> ProtoArray<P> {
    #[must_use]
    pub fn new(anchor: ProtoBlock<P>) -> Self {
        let mut proto_array = Self::default();

        proto_array.indices.insert(anchor.block_root, 0);
        proto_array.nodes.push(ProtoNode {
            proto_block: anchor,
            parent: None,
            weight: 0,
            best_child: None,
            best_descendant: None,
        });

        proto_array
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn index(&self, block_root: H256) -> Option<usize> {
        self.indices.get(&block_root).copied()
    }

    #[must_use]
    pub fn contains(&self, block_root: H256) -> bool {
        self.indices.contains_key(&block_root)
    }

    #[must_use]
    pub fn get(&self, block_root: H256) -> Option<&ProtoBlock<P>> {
        let index = self.index(block_root)?;
        Some(&self.nodes[index].proto_block)
    }

    #[must_use]
    pub fn weight(&self, block_root: H256) -> Option<Gwei> {
        let index = self.index(block_root)?;
        Some(self.nodes[index].weight)
    }

    /// Iterates over the block with `block_root` and all of its known ancestors, newest first.
    pub fn ancestors(&self, block_root: H256) -> impl Iterator<Item = &ProtoBlock<P>> {
        core::iter::successors(self.index(block_root), |index| self.nodes[*index].parent)
            .map(|index| &self.nodes[index].proto_block)
    }

    /// Iterates over blocks that have no children.
    pub fn leaves(&self) -> impl Iterator<Item = &ProtoBlock<P>> {
        let parents = self
            .nodes
            .iter()
            .filter_map(|node| node.parent)
            .collect::<HashSet<_>>();

        self.nodes
            .iter()
            .enumerate()
            .filter(move |(index, _)| !parents.contains(index))
            .map(|(_, node)| &node.proto_block)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProtoBlock<P>> {
        self.nodes.iter().map(|node| &node.proto_block)
    }

    /// Appends a block to the array.
    ///
    /// Best child and descendant pointers are only updated by [`Self::apply_score_changes`].
    pub fn insert(&mut self, proto_block: ProtoBlock<P>) -> Result<()> {
        let block_root = proto_block.block_root;
        let parent_root = proto_block.parent_root();

        let parent = self.index(parent_root).ok_or(Error::UnknownParent {
            block_root,
            parent_root,
        })?;

        self.indices.insert(block_root, self.nodes.len());
        self.nodes.push(ProtoNode {
            proto_block,
            parent: Some(parent),
            weight: 0,
            best_child: None,
            best_descendant: None,
        });

        Ok(())
    }

    /// Applies `deltas` to node weights and propagates them to ancestors.
    ///
    /// `deltas` must have one entry per node. It is used as scratch space.
    pub fn apply_score_changes(
        &mut self,
        deltas: &mut [Difference],
        viability: Viability,
    ) -> Result<()> {
        ensure!(
            deltas.len() == self.nodes.len(),
            Error::WeightDeltaCountMismatch {
                deltas: deltas.len(),
                nodes: self.nodes.len(),
            },
        );

        for index in (0..self.nodes.len()).rev() {
            let delta = deltas[index];
            let node = &mut self.nodes[index];

            node.weight = node
                .weight
                .checked_add_signed(delta)
                .ok_or(Error::WeightOutOfRange {
                    weight: node.weight,
                    delta,
                })?;

            if let Some(parent) = node.parent {
                deltas[parent] += delta;
            }
        }

        for node in &mut self.nodes {
            node.best_child = None;
            node.best_descendant = None;
        }

        // Children have higher indices than their parents,
        // so a child's pointers are final by the time it is compared to its siblings.
        for index in (0..self.nodes.len()).rev() {
            if let Some(parent) = self.nodes[index].parent {
                self.maybe_update_best_child_and_descendant(parent, index, viability);
            }
        }

        Ok(())
    }

    /// Returns the head of the subtree rooted at `justified_root`.
    ///
    /// Returns the justified block itself if none of its descendants are viable.
    pub fn find_head(&self, justified_root: H256) -> Option<&ProtoBlock<P>> {
        let justified_index = self.index(justified_root)?;
        let node = &self.nodes[justified_index];
        let head_index = node.best_descendant.unwrap_or(justified_index);

        Some(&self.nodes[head_index].proto_block)
    }

    /// Removes all blocks that do not descend from `finalized_root`.
    ///
    /// Returns the removed blocks.
    pub fn prune(&mut self, finalized_root: H256) -> Vec<ProtoBlock<P>> {
        let Some(finalized_index) = self.index(finalized_root) else {
            return vec![];
        };

        let mut new_indices = vec![None; self.nodes.len()];
        let mut retained_count = 0;

        for index in finalized_index..self.nodes.len() {
            let retained = index == finalized_index
                || self.nodes[index]
                    .parent
                    .is_some_and(|parent| new_indices[parent].is_some());

            if retained {
                new_indices[index] = Some(retained_count);
                retained_count += 1;
            }
        }

        if retained_count == self.nodes.len() {
            return vec![];
        }

        let remap = |index: Option<usize>| index.and_then(|index| new_indices[index]);

        let mut retained = Vec::with_capacity(retained_count);
        let mut pruned = vec![];

        for (index, mut node) in core::mem::take(&mut self.nodes).into_iter().enumerate() {
            if new_indices[index].is_some() {
                node.parent = remap(node.parent);
                node.best_child = remap(node.best_child);
                node.best_descendant = remap(node.best_descendant);
                retained.push(node);
            } else {
                pruned.push(node.proto_block);
            }
        }

        self.nodes = retained;
        self.indices = self
            .nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.proto_block.block_root, index))
            .collect();

        pruned
    }

    fn maybe_update_best_child_and_descendant(
        &mut self,
        parent_index: usize,
        child_index: usize,
        viability: Viability,
    ) {
        let child = &self.nodes[child_index];

        if !self.leads_to_viable_head(child, viability) {
            return;
        }

        let change_to_child = match self.nodes[parent_index].best_child {
            None => true,
            Some(best_child_index) => {
                let best_child = &self.nodes[best_child_index];

                if !self.leads_to_viable_head(best_child, viability) {
                    true
                } else if child.weight == best_child.weight {
                    // Ties are broken in favor of the greater block root.
                    child.proto_block.block_root >= best_child.proto_block.block_root
                } else {
                    child.weight > best_child.weight
                }
            }
        };

        if change_to_child {
            let best_descendant = child.best_descendant.unwrap_or(child_index);
            let parent = &mut self.nodes[parent_index];
            parent.best_child = Some(child_index);
            parent.best_descendant = Some(best_descendant);
        }
    }

    fn leads_to_viable_head(&self, node: &ProtoNode<P>, viability: Viability) -> bool {
        let best_descendant_is_viable = node
            .best_descendant
            .is_some_and(|index| viability.is_viable(&self.nodes[index].proto_block));

        best_descendant_is_viable || viability.is_viable(&node.proto_block)
    }
}
