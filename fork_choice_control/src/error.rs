use anyhow::Error as AnyhowError;
use fork_choice_store::Error as StoreError;
use helper_functions::error::Error as HelperError;
use strum::{AsRefStr, Display, EnumIter};
use thiserror::Error;
use transition_functions::unphased::{
    AttestationInvalidReason, AttesterSlashingInvalidReason, BlockHeaderInvalidReason,
    DepositInvalidReason, Error as TransitionError, ProposerSlashingInvalidReason,
    SyncAggregateInvalidReason, VoluntaryExitInvalidReason,
};
use types::phase0::primitives::{Slot, H256};

#[derive(Debug, Error)]
pub enum Error {
    #[error(
        "anchor block {block_root:?} does not match anchor state \
         (block slot: {block_slot}, state slot: {state_slot})"
    )]
    AnchorMismatch {
        block_root: H256,
        block_slot: Slot,
        state_slot: Slot,
    },
    #[error("state cannot be regenerated: {reason}")]
    RegenUnavailable { reason: RegenUnavailableReason },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum RegenUnavailableReason {
    #[error("block {block_root:?} is not in fork choice")]
    BlockNotInForkChoice { block_root: H256 },
    #[error("requested slot {slot} is before slot {block_slot} of block {block_root:?}")]
    SlotBeforeBlockSlot {
        block_root: H256,
        block_slot: Slot,
        slot: Slot,
    },
    #[error("no cached state found for block {block_root:?} or its unfinalized ancestors")]
    NoSeedState { block_root: H256 },
    #[error(
        "regenerating state of block {block_root:?} requires replaying more than \
         {max_blocks} blocks"
    )]
    TooManyBlocksToReplay { block_root: H256, max_blocks: u64 },
    #[error(
        "requested slot {slot} is more than {max_empty_slots} slots after \
         slot {block_slot} of block {block_root:?}"
    )]
    StateFarBehind {
        block_root: H256,
        block_slot: Slot,
        slot: Slot,
        max_empty_slots: u64,
    },
}

impl From<RegenUnavailableReason> for Error {
    fn from(reason: RegenUnavailableReason) -> Self {
        Self::RegenUnavailable { reason }
    }
}

/// Coarse classification of errors produced by block and attestation processing.
///
/// Everything except [`ErrorKind::RegenUnavailable`] means the input itself is invalid.
#[derive(Clone, Copy, PartialEq, Eq, Debug, AsRefStr, Display, EnumIter)]
pub enum ErrorKind {
    InvalidBlockHeader,
    InvalidProposerSlashing,
    InvalidAttesterSlashing,
    InvalidAttestation,
    InvalidDeposit,
    InvalidVoluntaryExit,
    InvalidSyncAggregate,
    StateRootMismatch,
    UnknownParent,
    RegenUnavailable,
    ChurnLimitExceeded,
    InvalidSignature,
    Other,
}

impl ErrorKind {
    /// Classifies `error` by the most specific cause attached to it.
    ///
    /// Operation-level errors are attached as context on top of their reasons,
    /// so an invalid attestation signature is reported as [`ErrorKind::InvalidAttestation`].
    #[must_use]
    pub fn of(error: &AnyhowError) -> Self {
        if let Some(kind) = error.downcast_ref().and_then(Self::of_transition_error) {
            return kind;
        }

        if let Some(store_error) = error.downcast_ref() {
            return Self::of_store_error(store_error);
        }

        if let Some(Error::RegenUnavailable { .. }) = error.downcast_ref() {
            return Self::RegenUnavailable;
        }

        Self::of_reason(error).unwrap_or(Self::Other)
    }

    /// Only a missing state may go away by itself, once more of the chain is available.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::RegenUnavailable)
    }

    const fn of_transition_error(error: &TransitionError) -> Option<Self> {
        let kind = match error {
            TransitionError::InvalidBlockHeader | TransitionError::SlotInPast { .. } => {
                Self::InvalidBlockHeader
            }
            TransitionError::InvalidProposerSlashing { .. } => Self::InvalidProposerSlashing,
            TransitionError::InvalidAttesterSlashing { .. } => Self::InvalidAttesterSlashing,
            TransitionError::InvalidAttestation { .. } => Self::InvalidAttestation,
            TransitionError::InvalidDeposit { .. } => Self::InvalidDeposit,
            TransitionError::InvalidVoluntaryExit { .. } => Self::InvalidVoluntaryExit,
            TransitionError::InvalidSyncAggregate => Self::InvalidSyncAggregate,
            TransitionError::ChurnLimitExceeded { .. } => Self::ChurnLimitExceeded,
            TransitionError::StateRootMismatch { .. } => Self::StateRootMismatch,
            // Raised before any block processing happens.
            // The reason may still be found further down the chain.
            TransitionError::PhaseMismatch { .. } => return None,
        };

        Some(kind)
    }

    const fn of_store_error(error: &StoreError) -> Self {
        match error {
            StoreError::UnknownParent { .. } => Self::UnknownParent,
            StoreError::BlockFromFuture { .. }
            | StoreError::BlockNotDescendantOfFinalized { .. }
            | StoreError::BlockNotNewerThanFinalized { .. } => Self::InvalidBlockHeader,
            StoreError::AttestationForFutureBlock { .. }
            | StoreError::AttestationTargetOutOfRange { .. }
            | StoreError::AttestationTargetsWrongEpoch { .. }
            | StoreError::LmdGhostInconsistentWithFfgTarget { .. }
            | StoreError::UnknownBlock { .. } => Self::InvalidAttestation,
            StoreError::JustifiedBlockMissing { .. }
            | StoreError::WeightOutOfRange { .. }
            | StoreError::WeightDeltaCountMismatch { .. } => Self::Other,
        }
    }

    fn of_reason(error: &AnyhowError) -> Option<Self> {
        if error.is::<BlockHeaderInvalidReason>() {
            return Some(Self::InvalidBlockHeader);
        }

        if error.is::<ProposerSlashingInvalidReason>() {
            return Some(Self::InvalidProposerSlashing);
        }

        if error.is::<AttesterSlashingInvalidReason>() {
            return Some(Self::InvalidAttesterSlashing);
        }

        if error.is::<AttestationInvalidReason>() {
            return Some(Self::InvalidAttestation);
        }

        if error.is::<DepositInvalidReason>() {
            return Some(Self::InvalidDeposit);
        }

        if error.is::<VoluntaryExitInvalidReason>() {
            return Some(Self::InvalidVoluntaryExit);
        }

        if error.is::<SyncAggregateInvalidReason>() {
            return Some(Self::InvalidSyncAggregate);
        }

        if let Some(HelperError::SignatureInvalid(_)) = error.downcast_ref() {
            return Some(Self::InvalidSignature);
        }

        None
    }
}
