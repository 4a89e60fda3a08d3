use core::cmp::Ordering;

use anyhow::Result;
use typenum::Unsigned as _;
use types::{
    altair::consts::{PROPOSER_WEIGHT, WEIGHT_DENOMINATOR},
    config::Config,
    nonstandard::Phase,
    phase0::{
        consts::FAR_FUTURE_EPOCH,
        primitives::{Gwei, ValidatorIndex},
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::{
    accessors::{get_beacon_proposer_index, get_current_epoch, get_validator_churn_limit},
    error::Error,
    misc::compute_activation_exit_epoch,
};

pub fn balance<P: Preset>(
    state: &mut (impl BeaconState<P> + ?Sized),
    validator_index: ValidatorIndex,
) -> Result<&mut Gwei> {
    state
        .balances_mut()
        .get_mut(validator_index)
        .map_err(Into::into)
}

#[inline]
pub fn increase_balance(balance: &mut Gwei, delta: Gwei) {
    *balance += delta;
}

#[inline]
pub fn decrease_balance(balance: &mut Gwei, delta: Gwei) {
    *balance = balance.saturating_sub(delta);
}

pub fn initiate_validator_exit<P: Preset>(
    config: &Config,
    state: &mut (impl BeaconState<P> + ?Sized),
    validator_index: ValidatorIndex,
) -> Result<()> {
    // > Return if validator already initiated exit
    if state.validators().get(validator_index)?.exit_epoch != FAR_FUTURE_EPOCH {
        return Ok(());
    }

    // > Compute exit queue epoch
    let mut exit_queue_epoch = compute_activation_exit_epoch::<P>(get_current_epoch(state));
    let mut exit_queue_churn = 0;

    for validator in state.validators() {
        let exit_epoch = validator.exit_epoch;

        if exit_epoch == FAR_FUTURE_EPOCH {
            continue;
        }

        match exit_epoch.cmp(&exit_queue_epoch) {
            Ordering::Less => {}
            Ordering::Equal => exit_queue_churn += 1,
            Ordering::Greater => {
                exit_queue_epoch = exit_epoch;
                exit_queue_churn = 1;
            }
        }
    }

    if exit_queue_churn >= get_validator_churn_limit(config, state) {
        exit_queue_epoch += 1;
    }

    // > Set validator exit epoch and withdrawable epoch
    let validator = state.validators_mut().get_mut(validator_index)?;

    validator.exit_epoch = exit_queue_epoch;

    validator.withdrawable_epoch = exit_queue_epoch
        .checked_add(config.min_validator_withdrawability_delay)
        .ok_or(Error::EpochOverflow)?;

    Ok(())
}

/// [`slash_validator`](https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/altair/beacon-chain.md#modified-slash_validator)
///
/// The penalty quotient and the proposer's share of the whistleblower reward depend on the phase
/// of `state`.
pub fn slash_validator<P: Preset>(
    config: &Config,
    state: &mut (impl BeaconState<P> + ?Sized),
    slashed_index: ValidatorIndex,
    whistleblower_index: Option<ValidatorIndex>,
) -> Result<()> {
    initiate_validator_exit(config, state, slashed_index)?;

    let epoch = get_current_epoch(state);
    let phase = state.phase();

    let validator = state.validators_mut().get_mut(slashed_index)?;

    validator.slashed = true;
    validator.withdrawable_epoch = validator
        .withdrawable_epoch
        .max(epoch + P::EpochsPerSlashingsVector::U64);

    let effective_balance = validator.effective_balance;

    *state.slashings_mut().mod_index_mut(epoch) += effective_balance;

    let min_slashing_penalty_quotient = match phase {
        Phase::Phase0 => P::MIN_SLASHING_PENALTY_QUOTIENT,
        Phase::Altair => P::MIN_SLASHING_PENALTY_QUOTIENT_ALTAIR,
    };

    decrease_balance(
        balance(state, slashed_index)?,
        effective_balance / min_slashing_penalty_quotient,
    );

    // > Apply proposer and whistleblower rewards
    let proposer_index = get_beacon_proposer_index(state)?;
    let whistleblower_index = whistleblower_index.unwrap_or(proposer_index);
    let whistleblower_reward = effective_balance / P::WHISTLEBLOWER_REWARD_QUOTIENT;

    let proposer_reward = match phase {
        Phase::Phase0 => whistleblower_reward / P::PROPOSER_REWARD_QUOTIENT,
        Phase::Altair => whistleblower_reward * PROPOSER_WEIGHT / WEIGHT_DENOMINATOR,
    };

    increase_balance(balance(state, proposer_index)?, proposer_reward);

    increase_balance(
        balance(state, whistleblower_index)?,
        whistleblower_reward - proposer_reward,
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use ssz::PersistentList;
    use types::{
        phase0::{beacon_state::BeaconState as Phase0BeaconState, containers::Validator},
        preset::Minimal,
    };

    use super::*;

    #[test]
    fn test_validator_exit_init() -> Result<()> {
        let config = Config::minimal();

        let validator_1 = Validator {
            effective_balance: 24,
            activation_eligibility_epoch: 2,
            activation_epoch: 3,
            exit_epoch: 4,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        let validator_2 = Validator {
            effective_balance: 24,
            activation_eligibility_epoch: 2,
            activation_epoch: 3,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        let mut state = Phase0BeaconState::<Minimal> {
            validators: PersistentList::try_from_iter([validator_1, validator_2])?,
            ..Phase0BeaconState::default()
        };

        // `exit_epoch` is already set and should remain the same.
        initiate_validator_exit(&config, &mut state, 0)?;

        // `exit_epoch` is `FAR_FUTURE_EPOCH` and should be set to the lowest possible value.
        initiate_validator_exit(&config, &mut state, 1)?;

        assert_eq!(state.validators.get(0)?.exit_epoch, 4);
        assert_eq!(state.validators.get(1)?.exit_epoch, 5);

        Ok(())
    }

    #[test]
    fn exits_respect_churn_limit() -> Result<()> {
        let config = Config::minimal();
        let churn_limit = config.min_per_epoch_churn_limit;

        let active = Validator {
            effective_balance: 32_000_000_000,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        let mut state = Phase0BeaconState::<Minimal> {
            validators: PersistentList::try_from_iter(core::iter::repeat_n(active, 8))?,
            ..Phase0BeaconState::default()
        };

        for validator_index in 0..8 {
            initiate_validator_exit(&config, &mut state, validator_index)?;
        }

        let first_exit_epoch = compute_activation_exit_epoch::<Minimal>(0);

        for exit_epoch in first_exit_epoch..first_exit_epoch + 8 / churn_limit {
            let exiting = state
                .validators
                .iter()
                .filter(|validator| validator.exit_epoch == exit_epoch)
                .count();

            assert_eq!(u64::try_from(exiting)?, churn_limit);
        }

        Ok(())
    }

    #[test]
    fn test_increase_balance() {
        let mut balance = 5;

        increase_balance(&mut balance, 10);

        assert_eq!(balance, 15);
    }

    #[test]
    fn test_decrease_balance() {
        let mut low_balance = 5;
        let mut high_balance = 10;

        decrease_balance(&mut low_balance, 10);
        decrease_balance(&mut high_balance, 5);

        assert_eq!(low_balance, 0);
        assert_eq!(high_balance, 5);
    }
}
