use thiserror::Error;
use types::phase0::{
    containers::{AttestationData, Checkpoint},
    primitives::{Epoch, Gwei, Slot, H256},
};

use crate::proto_array::Difference;

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "attestation votes for a block from the future \
         (data: {data:?}, block_slot: {block_slot})"
    )]
    AttestationForFutureBlock {
        data: AttestationData,
        block_slot: Slot,
    },
    #[error(
        "attestation targets an epoch outside the current and previous ones \
         (data: {data:?}, current_epoch: {current_epoch})"
    )]
    AttestationTargetOutOfRange {
        data: AttestationData,
        current_epoch: Epoch,
    },
    #[error("attestation votes for a checkpoint in the wrong epoch: {data:?}")]
    AttestationTargetsWrongEpoch { data: AttestationData },
    #[error("block is from the future (block_root: {block_root:?}, slot: {slot}, current_slot: {current_slot})")]
    BlockFromFuture {
        block_root: H256,
        slot: Slot,
        current_slot: Slot,
    },
    #[error(
        "block is not a descendant of the finalized block \
         (block_root: {block_root:?}, finalized_checkpoint: {finalized_checkpoint:?})"
    )]
    BlockNotDescendantOfFinalized {
        block_root: H256,
        finalized_checkpoint: Checkpoint,
    },
    #[error(
        "block is not newer than the finalized checkpoint \
         (block_root: {block_root:?}, slot: {slot}, finalized_slot: {finalized_slot})"
    )]
    BlockNotNewerThanFinalized {
        block_root: H256,
        slot: Slot,
        finalized_slot: Slot,
    },
    #[error("justified block is missing from fork choice: {checkpoint:?}")]
    JustifiedBlockMissing { checkpoint: Checkpoint },
    #[error("LMD GHOST vote is inconsistent with FFG vote target: {data:?}")]
    LmdGhostInconsistentWithFfgTarget { data: AttestationData },
    #[error("parent of block is unknown (block_root: {block_root:?}, parent_root: {parent_root:?})")]
    UnknownParent { block_root: H256, parent_root: H256 },
    #[error("block is unknown: {block_root:?}")]
    UnknownBlock { block_root: H256 },
    #[error("weight delta does not match node weight (weight: {weight}, delta: {delta})")]
    WeightOutOfRange { weight: Gwei, delta: Difference },
    #[error("number of weight deltas does not match number of nodes (deltas: {deltas}, nodes: {nodes})")]
    WeightDeltaCountMismatch { deltas: usize, nodes: usize },
}
