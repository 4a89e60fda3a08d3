use helper_functions::predicates::{is_active_validator, is_eligible_for_penalties};
use types::phase0::{
    containers::Validator,
    primitives::{Epoch, Gwei},
};

/// Fields of a validator needed after rewards are applied.
///
/// Collected in one pass over the registry so later stages of epoch processing
/// do not have to index into the persistent list again.
#[derive(Clone, Copy, Default, Debug)]
pub struct ValidatorSummary {
    pub effective_balance: Gwei,
    pub slashed: bool,
    pub withdrawable_epoch: Epoch,
    pub eligible_for_penalties: bool,
    pub active_in_previous_epoch: bool,
    pub active_in_current_epoch: bool,
}

impl ValidatorSummary {
    #[must_use]
    pub const fn new(validator: &Validator, previous_epoch: Epoch, current_epoch: Epoch) -> Self {
        Self {
            effective_balance: validator.effective_balance,
            slashed: validator.slashed,
            withdrawable_epoch: validator.withdrawable_epoch,
            eligible_for_penalties: is_eligible_for_penalties(validator, previous_epoch),
            active_in_previous_epoch: is_active_validator(validator, previous_epoch),
            active_in_current_epoch: is_active_validator(validator, current_epoch),
        }
    }

    pub fn update_from(&mut self, validator: &Validator) {
        self.effective_balance = validator.effective_balance;
        self.slashed = validator.slashed;
        self.withdrawable_epoch = validator.withdrawable_epoch;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct EpochDeltas {
    pub reward: Gwei,
    pub penalty: Gwei,
}

impl EpochDeltas {
    pub fn add_reward(&mut self, value: Gwei) {
        self.reward += value;
    }

    pub fn add_penalty(&mut self, value: Gwei) {
        self.penalty += value;
    }
}
