//! State transition functions for Phase 0 and Altair.
//!
//! Functions in [`phase0`] and [`altair`] operate on states of a single phase.
//! [`combined`] dispatches on the phase of the state and upgrades it at fork boundaries.
//! None of the functions here log or perform I/O.

pub mod combined;

pub mod unphased {
    pub use block_processing::{
        apply_deposit, process_attester_slashing, process_block_header, process_deposit,
        process_eth1_data, process_proposer_slashing, process_randao, process_voluntary_exit,
        validate_attestation_with_verifier, validate_attester_slashing_with_verifier,
        validate_deposit_count, validate_proposer_slashing_with_verifier,
        validate_voluntary_exit_with_verifier, verify_deposit_merkle_branch, ProposerPolicy,
    };
    pub use epoch_intermediates::{EpochDeltas, ValidatorSummary};
    pub use epoch_processing::{
        process_effective_balance_updates, process_eth1_data_reset,
        process_historical_roots_update, process_randao_mixes_reset, process_registry_updates,
        process_rewards_and_penalties, process_slashings, process_slashings_reset,
        should_process_justification_and_finalization, should_process_rewards_and_penalties,
        weigh_justification_and_finalization,
    };
    pub use error::{
        AttestationInvalidReason, AttesterSlashingInvalidReason, BlockHeaderInvalidReason,
        DepositInvalidReason, Error, ProposerSlashingInvalidReason, SyncAggregateInvalidReason,
        VoluntaryExitInvalidReason,
    };
    pub use slot_processing::{process_slot, ProcessSlots};
    pub use state_transition::StateRootPolicy;

    mod block_processing;
    mod epoch_intermediates;
    mod epoch_processing;
    mod error;
    mod slot_processing;
    mod state_transition;
}

pub mod phase0 {
    pub use block_processing::{count_required_signatures, process_attestation, process_block};
    pub use epoch_intermediates::{epoch_deltas, statistics, Inclusion, Performance, Statistics};
    pub use epoch_processing::{process_epoch, process_justification_and_finalization};
    pub use slot_processing::process_slots;
    pub use state_transition::{state_transition, verify_block_signature};

    mod block_processing;
    mod epoch_intermediates;
    mod epoch_processing;
    mod slot_processing;
    mod state_transition;
}

pub mod altair {
    pub use block_processing::{
        apply_attestation, count_required_signatures, process_block, process_deposit_data,
        process_sync_aggregate, verify_sync_aggregate_signature,
    };
    pub use epoch_intermediates::{epoch_deltas, statistics, Participation, Statistics};
    pub use epoch_processing::{
        process_epoch, process_inactivity_updates, process_justification_and_finalization,
        process_participation_flag_updates, process_sync_committee_updates,
    };
    pub use slot_processing::process_slots;
    pub use state_transition::{state_transition, verify_block_signature};

    mod block_processing;
    mod epoch_intermediates;
    mod epoch_processing;
    mod slot_processing;
    mod state_transition;
}
