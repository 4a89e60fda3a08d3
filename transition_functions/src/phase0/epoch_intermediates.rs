use core::num::NonZeroU64;

use anyhow::Result;
use arithmetic::U64Ext as _;
use helper_functions::{
    accessors::{
        get_attesting_indices, get_block_root, get_block_root_at_slot, get_current_epoch,
        get_finality_delay, get_previous_epoch,
    },
    misc::vec_of_default,
    predicates::is_in_inactivity_leak,
};
use itertools::{izip, Itertools as _};
use types::{
    nonstandard::AttestationEpoch,
    phase0::{
        beacon_state::BeaconState,
        consts::BASE_REWARDS_PER_EPOCH,
        containers::PendingAttestation,
        primitives::{Gwei, ValidatorIndex},
    },
    preset::Preset,
};

use crate::unphased::{EpochDeltas, ValidatorSummary};

/// Attesting balances used for justification and rewards.
///
/// Balances are clamped to `EFFECTIVE_BALANCE_INCREMENT` after accumulation
/// so they can be used as divisors.
#[expect(clippy::struct_field_names)]
#[derive(Clone, Copy, Default, Debug)]
pub struct Statistics {
    pub previous_epoch_source_attesting_balance: Gwei,
    pub previous_epoch_target_attesting_balance: Gwei,
    pub previous_epoch_head_attesting_balance: Gwei,
    pub current_epoch_active_balance: Gwei,
    pub current_epoch_target_attesting_balance: Gwei,
}

impl Statistics {
    fn accumulate_previous_epoch_attestation<P: Preset>(
        &mut self,
        performance: &mut Performance,
        attestation: &PendingAttestation<P>,
        matching_target: bool,
        matching_head: bool,
        effective_balance: Gwei,
    ) {
        if !performance.previous_epoch_matching_source() {
            self.previous_epoch_source_attesting_balance += effective_balance;
            performance.previous_epoch_match = Match::Source;
        }

        if !performance.previous_epoch_matching_target() && matching_target {
            self.previous_epoch_target_attesting_balance += effective_balance;
            performance.previous_epoch_match = Match::Target;
        }

        if !performance.previous_epoch_matching_head() && matching_target && matching_head {
            self.previous_epoch_head_attesting_balance += effective_balance;
            performance.previous_epoch_match = Match::Head;
        }

        let Some(delay) = NonZeroU64::new(attestation.inclusion_delay) else {
            return;
        };

        let inclusion = Inclusion {
            delay,
            proposer_index: attestation.proposer_index,
        };

        let current = performance
            .previous_epoch_fastest_inclusion
            .get_or_insert(inclusion);

        if inclusion.delay < current.delay {
            *current = inclusion;
        }
    }

    fn accumulate_current_epoch_attestation(
        &mut self,
        performance: &mut Performance,
        effective_balance: Gwei,
    ) {
        if !performance.current_epoch_matching_target {
            self.current_epoch_target_attesting_balance += effective_balance;
            performance.current_epoch_matching_target = true;
        }
    }

    fn clamp_balances<P: Preset>(&mut self) {
        for balance in [
            &mut self.previous_epoch_source_attesting_balance,
            &mut self.previous_epoch_target_attesting_balance,
            &mut self.previous_epoch_head_attesting_balance,
            &mut self.current_epoch_active_balance,
            &mut self.current_epoch_target_attesting_balance,
        ] {
            *balance = (*balance).max(P::EFFECTIVE_BALANCE_INCREMENT.get());
        }
    }
}

/// How a single validator attested in the previous and current epochs.
#[derive(Clone, Copy, Default, Debug)]
pub struct Performance {
    previous_epoch_match: Match,
    previous_epoch_fastest_inclusion: Option<Inclusion>,
    current_epoch_matching_target: bool,
}

impl Performance {
    #[must_use]
    pub fn previous_epoch_matching_source(self) -> bool {
        Match::Source <= self.previous_epoch_match
    }

    #[must_use]
    pub fn previous_epoch_matching_target(self) -> bool {
        Match::Target <= self.previous_epoch_match
    }

    #[must_use]
    pub fn previous_epoch_matching_head(self) -> bool {
        Match::Head <= self.previous_epoch_match
    }

    #[must_use]
    pub const fn previous_epoch_fastest_inclusion(self) -> Option<Inclusion> {
        self.previous_epoch_fastest_inclusion
    }

    #[must_use]
    pub const fn current_epoch_matching_target(self) -> bool {
        self.current_epoch_matching_target
    }
}

// Each level implies the ones before it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Debug)]
enum Match {
    #[default]
    None,
    Source,
    Target,
    Head,
}

#[derive(Clone, Copy, Debug)]
pub struct Inclusion {
    pub delay: NonZeroU64,
    pub proposer_index: ValidatorIndex,
}

pub fn statistics<P: Preset>(
    state: &BeaconState<P>,
) -> Result<(Statistics, Vec<ValidatorSummary>, Vec<Performance>)> {
    let current_epoch = get_current_epoch(state);
    let previous_epoch = get_previous_epoch(state);

    let mut statistics = Statistics::default();

    let summaries = state
        .validators
        .iter()
        .map(|validator| {
            let summary = ValidatorSummary::new(validator, previous_epoch, current_epoch);

            if summary.active_in_current_epoch {
                statistics.current_epoch_active_balance += summary.effective_balance;
            }

            summary
        })
        .collect_vec();

    let mut performance: Vec<Performance> = vec_of_default(state);

    // `get_block_root` fails in the first slot of the chain.
    // Attestations cannot be included before then, so there is nothing to count.
    if let Ok(expected_target) = get_block_root(state, AttestationEpoch::Previous) {
        for attestation in &state.previous_epoch_attestations {
            let expected_head = get_block_root_at_slot(state, attestation.data.slot)?;
            let matching_target = attestation.data.target.root == expected_target;
            let matching_head = attestation.data.beacon_block_root == expected_head;

            for validator_index in
                get_attesting_indices(state, attestation.data, &attestation.aggregation_bits)?
            {
                let index = usize::try_from(validator_index)?;
                let summary = summaries[index];

                if summary.slashed {
                    continue;
                }

                statistics.accumulate_previous_epoch_attestation(
                    &mut performance[index],
                    attestation,
                    matching_target,
                    matching_head,
                    summary.effective_balance,
                );
            }
        }
    }

    if let Ok(expected_target) = get_block_root(state, AttestationEpoch::Current) {
        for attestation in &state.current_epoch_attestations {
            if attestation.data.target.root != expected_target {
                continue;
            }

            for validator_index in
                get_attesting_indices(state, attestation.data, &attestation.aggregation_bits)?
            {
                let index = usize::try_from(validator_index)?;
                let summary = summaries[index];

                if summary.slashed {
                    continue;
                }

                statistics.accumulate_current_epoch_attestation(
                    &mut performance[index],
                    summary.effective_balance,
                );
            }
        }
    }

    statistics.clamp_balances::<P>();

    Ok((statistics, summaries, performance))
}

pub fn epoch_deltas<P: Preset>(
    state: &BeaconState<P>,
    statistics: Statistics,
    summaries: &[ValidatorSummary],
    performance: &[Performance],
) -> Result<Vec<EpochDeltas>> {
    let finality_delay = get_finality_delay(state);
    let in_inactivity_leak = is_in_inactivity_leak(state);
    let total_active_balance_sqrt = statistics.current_epoch_active_balance.integer_sqrt();
    let increment = P::EFFECTIVE_BALANCE_INCREMENT;

    let mut deltas: Vec<EpochDeltas> = vec_of_default(state);

    for (index, summary, performance) in izip!(0.., summaries, performance) {
        let ValidatorSummary {
            effective_balance,
            eligible_for_penalties,
            ..
        } = *summary;

        let base_reward = effective_balance * P::BASE_REWARD_FACTOR
            / total_active_balance_sqrt
            / BASE_REWARDS_PER_EPOCH;

        let attestation_component_reward = |attesting_balance: Gwei| {
            if in_inactivity_leak {
                // > Since full base reward will be canceled out by inactivity penalty deltas,
                // > optimal participation receives full base reward compensation here.
                base_reward
            } else {
                // > Factored out from balance totals to avoid uint64 overflow
                let reward_numerator = base_reward * (attesting_balance / increment);
                reward_numerator / (statistics.current_epoch_active_balance / increment)
            }
        };

        let proposer_reward = base_reward / P::PROPOSER_REWARD_QUOTIENT;

        if eligible_for_penalties {
            let deltas = &mut deltas[index];

            if performance.previous_epoch_matching_source() {
                deltas.add_reward(attestation_component_reward(
                    statistics.previous_epoch_source_attesting_balance,
                ));
            } else {
                deltas.add_penalty(base_reward);
            }

            if performance.previous_epoch_matching_target() {
                deltas.add_reward(attestation_component_reward(
                    statistics.previous_epoch_target_attesting_balance,
                ));
            } else {
                deltas.add_penalty(base_reward);
            }

            if performance.previous_epoch_matching_head() {
                deltas.add_reward(attestation_component_reward(
                    statistics.previous_epoch_head_attesting_balance,
                ));
            } else {
                deltas.add_penalty(base_reward);
            }

            if in_inactivity_leak {
                // > If validator is performing optimally this cancels all rewards for a neutral
                // > balance
                deltas.add_penalty(BASE_REWARDS_PER_EPOCH.get() * base_reward - proposer_reward);

                if !performance.previous_epoch_matching_target() {
                    deltas.add_penalty(
                        effective_balance * finality_delay / P::INACTIVITY_PENALTY_QUOTIENT,
                    );
                }
            }
        }

        if let Some(Inclusion {
            delay,
            proposer_index,
        }) = performance.previous_epoch_fastest_inclusion()
        {
            let proposer_index = usize::try_from(proposer_index)?;
            let max_attester_reward = base_reward - proposer_reward;

            deltas[proposer_index].add_reward(proposer_reward);
            deltas[index].add_reward(max_attester_reward / delay);
        }
    }

    Ok(deltas)
}

#[cfg(test)]
mod tests {
    use types::{
        phase0::{consts::FAR_FUTURE_EPOCH, containers::Validator},
        preset::Minimal,
    };

    use super::*;

    #[test]
    fn faster_inclusion_replaces_slower_one() {
        let mut statistics = Statistics::default();
        let mut performance = Performance::default();

        for (inclusion_delay, proposer_index) in [(3, 7), (1, 9), (2, 5)] {
            let attestation = PendingAttestation::<Minimal> {
                inclusion_delay,
                proposer_index,
                ..PendingAttestation::default()
            };

            statistics.accumulate_previous_epoch_attestation(
                &mut performance,
                &attestation,
                true,
                false,
                32,
            );
        }

        let inclusion = performance
            .previous_epoch_fastest_inclusion()
            .expect("attestations were accumulated");

        assert_eq!(inclusion.delay.get(), 1);
        assert_eq!(inclusion.proposer_index, 9);
        assert!(performance.previous_epoch_matching_target());
        assert!(!performance.previous_epoch_matching_head());

        // Balances are counted once per validator.
        assert_eq!(statistics.previous_epoch_source_attesting_balance, 32);
        assert_eq!(statistics.previous_epoch_target_attesting_balance, 32);
        assert_eq!(statistics.previous_epoch_head_attesting_balance, 0);
    }

    #[test]
    fn absent_validators_are_penalized_for_every_component() -> Result<()> {
        let validator = Validator {
            effective_balance: 32_000_000_000,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        let mut state = BeaconState::<Minimal> {
            slot: 16,
            ..BeaconState::default()
        };

        for _ in 0..4 {
            state.validators.push(validator)?;
            state.balances.push(32_000_000_000)?;
        }

        let (statistics, summaries, performance) = statistics(&state)?;

        assert_eq!(statistics.current_epoch_active_balance, 128_000_000_000);

        let deltas = epoch_deltas(&state, statistics, &summaries, &performance)?;
        let base_reward = 32_000_000_000 * 64 / 128_000_000_000_u64.integer_sqrt() / 4;

        for delta in deltas {
            assert_eq!(delta.reward, 0);
            assert_eq!(delta.penalty, 3 * base_reward);
        }

        Ok(())
    }
}
