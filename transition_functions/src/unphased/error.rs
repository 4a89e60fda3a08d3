use thiserror::Error;
use types::{
    nonstandard::Phase,
    phase0::{
        containers::{BeaconBlockHeader, Checkpoint, Validator},
        primitives::{DepositIndex, Epoch, Slot, ValidatorIndex, H256},
    },
};

// Operation-level failures are attached as context on top of the reason that caused them.
// Both can be recovered with `anyhow::Error::downcast_ref`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("block header is invalid")]
    InvalidBlockHeader,
    #[error("proposer slashing {index} is invalid")]
    InvalidProposerSlashing { index: usize },
    #[error("attester slashing {index} is invalid")]
    InvalidAttesterSlashing { index: usize },
    #[error("attestation {index} is invalid")]
    InvalidAttestation { index: usize },
    #[error("deposit {index} is invalid")]
    InvalidDeposit { index: usize },
    #[error("voluntary exit {index} is invalid")]
    InvalidVoluntaryExit { index: usize },
    #[error("sync aggregate is invalid")]
    InvalidSyncAggregate,
    #[error("activations exceed churn limit ({activations} > {churn_limit})")]
    ChurnLimitExceeded { activations: u64, churn_limit: u64 },
    #[error("state phase ({state_phase}) does not match block phase ({block_phase})")]
    PhaseMismatch {
        state_phase: Phase,
        block_phase: Phase,
    },
    #[error("target slot ({target}) is earlier than current slot ({current})")]
    SlotInPast { current: Slot, target: Slot },
    #[error("state root in block ({in_block:?}) does not match state ({computed:?})")]
    StateRootMismatch { computed: H256, in_block: H256 },
}

#[derive(Debug, Error)]
pub enum BlockHeaderInvalidReason {
    #[error("block slot ({block_slot}) does not match state slot ({state_slot})")]
    SlotMismatch { state_slot: Slot, block_slot: Slot },
    #[error("block is not newer than latest block header ({block_slot} <= {block_header_slot})")]
    NotNewerThanLatestHeader {
        block_slot: Slot,
        block_header_slot: Slot,
    },
    #[error("proposer index is incorrect (in_block: {in_block}, computed: {computed})")]
    ProposerIndexMismatch {
        computed: ValidatorIndex,
        in_block: ValidatorIndex,
    },
    #[error("block parent root ({in_block:?}) does not match latest block header ({computed:?})")]
    ParentRootMismatch { computed: H256, in_block: H256 },
    #[error("proposer (validator {index}) is slashed")]
    ProposerSlashed { index: ValidatorIndex },
    #[error("block signature is invalid")]
    SignatureInvalid,
    #[error("RANDAO reveal is invalid")]
    RandaoRevealInvalid,
}

#[derive(Debug, Error)]
pub enum ProposerSlashingInvalidReason {
    #[error("slots in proposer slashing do not match ({slot_1} != {slot_2})")]
    SlotMismatch { slot_1: Slot, slot_2: Slot },
    #[error(
        "proposer indices in proposer slashing do not match \
         ({proposer_index_1} != {proposer_index_2})"
    )]
    ProposerMismatch {
        proposer_index_1: ValidatorIndex,
        proposer_index_2: ValidatorIndex,
    },
    #[error("block headers in proposer slashing are identical: {header:?}")]
    HeadersIdentical { header: BeaconBlockHeader },
    #[error("proposer (validator {index}) is not slashable: {proposer:?}")]
    ProposerNotSlashable {
        index: ValidatorIndex,
        proposer: Validator,
    },
    #[error("signature of header {header_number} is invalid")]
    SignatureInvalid { header_number: u8 },
}

#[derive(Debug, Error)]
pub enum AttesterSlashingInvalidReason {
    #[error("attestation data is not slashable")]
    DataNotSlashable,
    #[error("attestation {attestation_number} is invalid")]
    AttestationInvalid { attestation_number: u8 },
    #[error("no attesters slashed")]
    NoAttestersSlashed,
}

#[derive(Debug, Error)]
pub enum AttestationInvalidReason {
    #[error(
        "attestation target epoch ({target_epoch}) is not the previous or current epoch \
         (current_epoch: {current_epoch})"
    )]
    TargetEpochOutOfRange {
        target_epoch: Epoch,
        current_epoch: Epoch,
    },
    #[error("attestation in slot {slot} votes for a checkpoint in epoch {target_epoch}")]
    TargetsWrongEpoch { slot: Slot, target_epoch: Epoch },
    #[error(
        "attestation in slot {attestation_slot} is outside \
         inclusion range for state at slot {state_slot}"
    )]
    OutsideInclusionRange {
        state_slot: Slot,
        attestation_slot: Slot,
    },
    #[error(
        "attestation source does not match justified checkpoint \
         (in_state: {in_state:?}, in_block: {in_block:?})"
    )]
    SourceMismatch {
        in_state: Checkpoint,
        in_block: Checkpoint,
    },
    #[error("attestation does not match its committee")]
    CommitteeInvalid,
    #[error("attestation signature is invalid")]
    SignatureInvalid,
}

#[derive(Debug, Error)]
pub enum DepositInvalidReason {
    #[error("deposit count is incorrect (computed: {computed}, in_block: {in_block})")]
    CountMismatch { computed: u64, in_block: u64 },
    #[error("deposit proof is invalid (deposit_index: {deposit_index})")]
    ProofInvalid { deposit_index: DepositIndex },
}

#[derive(Debug, Error)]
pub enum VoluntaryExitInvalidReason {
    #[error("validator {index} is not active in epoch {current_epoch}")]
    NotActive {
        index: ValidatorIndex,
        current_epoch: Epoch,
    },
    #[error("validator {index} exited in epoch {exit_epoch}")]
    AlreadyExited {
        index: ValidatorIndex,
        exit_epoch: Epoch,
    },
    #[error("voluntary exit is not valid yet (epoch: {epoch}, current_epoch: {current_epoch})")]
    NotYetValid { epoch: Epoch, current_epoch: Epoch },
    #[error(
        "validator {index} has not been active long enough \
         (activation_epoch: {activation_epoch}, current_epoch: {current_epoch})"
    )]
    NotActiveLongEnough {
        index: ValidatorIndex,
        activation_epoch: Epoch,
        current_epoch: Epoch,
    },
    #[error("voluntary exit signature is invalid")]
    SignatureInvalid,
}

#[derive(Debug, Error)]
pub enum SyncAggregateInvalidReason {
    #[error("sync aggregate signature is invalid")]
    SignatureInvalid,
    #[error("sync committee member is not in the validator registry")]
    UnknownParticipant,
}
