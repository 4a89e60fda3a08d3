use core::fmt::{Formatter, Result as FmtResult};
use std::sync::Arc;

use derivative::Derivative;
use helper_functions::{accessors, misc, predicates};
use serde::Serialize;
use types::{
    combined::SignedBeaconBlock,
    phase0::{
        containers::{AttestationData, Checkpoint},
        primitives::{Epoch, Gwei, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::{BeaconState, SignedBeaconBlock as _},
};

/// A block as seen by fork choice.
///
/// The checkpoints are the ones recorded in the post-state of the block.
/// They determine whether the block can be part of the canonical chain.
#[derive(Clone, Derivative)]
#[derivative(Debug(bound = ""))]
pub struct ProtoBlock<P: Preset> {
    pub block_root: H256,
    #[derivative(Debug(format_with = "fmt_block_concisely"))]
    pub block: Arc<SignedBeaconBlock<P>>,
    pub justified_checkpoint: Checkpoint,
    pub finalized_checkpoint: Checkpoint,
}

impl<P: Preset> ProtoBlock<P> {
    #[must_use]
    pub fn new(
        block_root: H256,
        block: Arc<SignedBeaconBlock<P>>,
        post_state: &(impl BeaconState<P> + ?Sized),
    ) -> Self {
        Self {
            block_root,
            block,
            justified_checkpoint: post_state.current_justified_checkpoint(),
            finalized_checkpoint: post_state.finalized_checkpoint(),
        }
    }

    #[must_use]
    pub fn slot(&self) -> Slot {
        self.block.message().slot()
    }

    #[must_use]
    pub fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot())
    }

    #[must_use]
    pub fn parent_root(&self) -> H256 {
        self.block.message().parent_root()
    }

    #[must_use]
    pub fn state_root(&self) -> H256 {
        self.block.message().state_root()
    }
}

/// [`LatestMessage`](https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/fork-choice.md#latestmessage)
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct LatestMessage {
    pub epoch: Epoch,
    // This is the LMD GHOST vote root and it corresponds to `AttestationData.beacon_block_root`.
    pub beacon_block_root: H256,
}

/// Vote of a single validator.
///
/// `current_root` is the root whose weight currently includes the vote.
/// `next_root` is the root it will be moved to the next time the head is computed.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct VoteTracker {
    pub current_root: H256,
    pub next_root: H256,
    pub next_epoch: Epoch,
}

impl VoteTracker {
    #[must_use]
    pub fn is_empty(self) -> bool {
        self == Self::default()
    }
}

#[derive(Clone, Debug)]
pub struct QueuedAttestation {
    pub data: AttestationData,
    pub attesting_indices: Vec<ValidatorIndex>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AttestationAction {
    Accept,
    DelayUntilSlot,
}

#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct CheckpointChanges {
    pub justified_checkpoint_updated: bool,
    pub finalized_checkpoint_updated: bool,
    pub pruned_block_roots: Vec<H256>,
}

impl CheckpointChanges {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.justified_checkpoint_updated
            && !self.finalized_checkpoint_updated
            && self.pruned_block_roots.is_empty()
    }
}

/// Effective balances of validators active in the current epoch of `state`.
///
/// Inactive validators are given a balance of 0 so that the result can be indexed by validator
/// index directly.
#[must_use]
pub fn justified_balances<P: Preset>(state: &(impl BeaconState<P> + ?Sized)) -> Arc<[Gwei]> {
    let current_epoch = accessors::get_current_epoch(state);

    state
        .validators()
        .into_iter()
        .map(|validator| {
            if predicates::is_active_validator(validator, current_epoch) {
                validator.effective_balance
            } else {
                0
            }
        })
        .collect()
}

fn fmt_block_concisely(
    block: &SignedBeaconBlock<impl Preset>,
    formatter: &mut Formatter,
) -> FmtResult {
    formatter
        .debug_struct("SignedBeaconBlock")
        .field("phase", &block.phase())
        .field("slot", &block.message().slot())
        .field("parent_root", &block.message().parent_root())
        .field("state_root", &block.message().state_root())
        .finish_non_exhaustive()
}

#[cfg(test)]
mod tests {
    use types::{
        phase0::{
            beacon_state::BeaconState as Phase0BeaconState, consts::FAR_FUTURE_EPOCH,
            containers::Validator,
        },
        preset::Minimal,
    };

    use super::*;

    #[test]
    fn justified_balances_zero_out_inactive_validators() -> anyhow::Result<()> {
        let mut state = Phase0BeaconState::<Minimal>::default();

        state.validators.push(Validator {
            effective_balance: 32_000_000_000,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        })?;

        state.validators.push(Validator {
            effective_balance: 31_000_000_000,
            activation_epoch: FAR_FUTURE_EPOCH,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        })?;

        assert_eq!(*justified_balances(&state), [32_000_000_000, 0]);

        Ok(())
    }
}
