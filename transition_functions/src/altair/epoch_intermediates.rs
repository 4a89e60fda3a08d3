use bit_field::BitField as _;
use helper_functions::{
    accessors::{
        compute_base_reward, get_base_reward_per_increment, get_current_epoch, get_previous_epoch,
        total_active_balance,
    },
    predicates::is_in_inactivity_leak,
};
use itertools::izip;
use types::{
    altair::{
        beacon_state::BeaconState,
        consts::{
            TIMELY_HEAD_FLAG_INDEX, TIMELY_HEAD_WEIGHT, TIMELY_SOURCE_FLAG_INDEX,
            TIMELY_SOURCE_WEIGHT, TIMELY_TARGET_FLAG_INDEX, TIMELY_TARGET_WEIGHT,
            WEIGHT_DENOMINATOR,
        },
        primitives::ParticipationFlags,
    },
    config::Config,
    phase0::primitives::Gwei,
    preset::Preset,
    traits::PostAltairBeaconState,
};

use crate::unphased::{EpochDeltas, ValidatorSummary};

// There is no field for the active balance in the current epoch.
// It is usually cached in `Cache.total_active_balance` by the time epoch processing runs.
#[expect(clippy::struct_field_names)]
#[derive(Clone, Copy, Default, Debug)]
pub struct Statistics {
    pub previous_epoch_source_participating_balance: Gwei,
    pub previous_epoch_target_participating_balance: Gwei,
    pub previous_epoch_head_participating_balance: Gwei,
    pub current_epoch_target_participating_balance: Gwei,
}

impl Statistics {
    fn clamp_balances<P: Preset>(&mut self) {
        for balance in [
            &mut self.previous_epoch_source_participating_balance,
            &mut self.previous_epoch_target_participating_balance,
            &mut self.previous_epoch_head_participating_balance,
            &mut self.current_epoch_target_participating_balance,
        ] {
            *balance = (*balance).max(P::EFFECTIVE_BALANCE_INCREMENT.get());
        }
    }
}

/// Participation flags of one validator in the previous and current epochs.
#[derive(Clone, Copy, Default, Debug)]
pub struct Participation {
    pub previous: ParticipationFlags,
    pub current: ParticipationFlags,
}

impl Participation {
    #[must_use]
    pub fn previous_epoch_matching_source(self) -> bool {
        self.previous.get_bit(TIMELY_SOURCE_FLAG_INDEX)
    }

    #[must_use]
    pub fn previous_epoch_matching_target(self) -> bool {
        self.previous.get_bit(TIMELY_TARGET_FLAG_INDEX)
    }

    #[must_use]
    pub fn previous_epoch_matching_head(self) -> bool {
        self.previous.get_bit(TIMELY_HEAD_FLAG_INDEX)
    }

    #[must_use]
    pub fn current_epoch_matching_target(self) -> bool {
        self.current.get_bit(TIMELY_TARGET_FLAG_INDEX)
    }
}

pub fn statistics<P: Preset>(
    state: &impl PostAltairBeaconState<P>,
) -> (Statistics, Vec<ValidatorSummary>, Vec<Participation>) {
    let current_epoch = get_current_epoch(state);
    let previous_epoch = get_previous_epoch(state);

    let participation = state
        .previous_epoch_participation()
        .iter()
        .zip(state.current_epoch_participation())
        .map(|(previous, current)| Participation {
            previous: *previous,
            current: *current,
        })
        .collect::<Vec<_>>();

    let mut statistics = Statistics::default();

    let summaries = state
        .validators()
        .iter()
        .zip(participation.iter().copied())
        .map(|(validator, participation)| {
            let summary = ValidatorSummary::new(validator, previous_epoch, current_epoch);

            let ValidatorSummary {
                effective_balance,
                slashed,
                active_in_previous_epoch,
                active_in_current_epoch,
                ..
            } = summary;

            // `get_unslashed_participating_indices` also checks that validators were active.
            if !slashed {
                if active_in_previous_epoch {
                    if participation.previous_epoch_matching_source() {
                        statistics.previous_epoch_source_participating_balance += effective_balance;
                    }

                    if participation.previous_epoch_matching_target() {
                        statistics.previous_epoch_target_participating_balance += effective_balance;
                    }

                    if participation.previous_epoch_matching_head() {
                        statistics.previous_epoch_head_participating_balance += effective_balance;
                    }
                }

                if active_in_current_epoch && participation.current_epoch_matching_target() {
                    statistics.current_epoch_target_participating_balance += effective_balance;
                }
            }

            summary
        })
        .collect();

    statistics.clamp_balances::<P>();

    (statistics, summaries, participation)
}

pub fn epoch_deltas<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    statistics: Statistics,
    summaries: &[ValidatorSummary],
    participation: &[Participation],
) -> Vec<EpochDeltas> {
    let in_inactivity_leak = is_in_inactivity_leak(state);
    let base_reward_per_increment = get_base_reward_per_increment(state);

    let increment = P::EFFECTIVE_BALANCE_INCREMENT;
    let source_increments = statistics.previous_epoch_source_participating_balance / increment;
    let target_increments = statistics.previous_epoch_target_participating_balance / increment;
    let head_increments = statistics.previous_epoch_head_participating_balance / increment;
    let active_increments = total_active_balance(state) / increment;

    let inactivity_penalty_denominator =
        config.inactivity_score_bias.get() * P::INACTIVITY_PENALTY_QUOTIENT_ALTAIR.get();

    izip!(summaries, participation, &state.inactivity_scores)
        .map(|(summary, participation, inactivity_score)| {
            let mut deltas = EpochDeltas::default();

            let ValidatorSummary {
                effective_balance,
                slashed,
                eligible_for_penalties,
                ..
            } = *summary;

            if !eligible_for_penalties {
                return deltas;
            }

            let base_reward =
                compute_base_reward::<P>(effective_balance, base_reward_per_increment);

            let participation_component_reward = |weight, unslashed_participating_increments| {
                let reward_numerator = base_reward * weight * unslashed_participating_increments;
                reward_numerator / (active_increments * WEIGHT_DENOMINATOR.get())
            };

            let participation_component_penalty =
                |weight| base_reward * weight / WEIGHT_DENOMINATOR;

            if !slashed && participation.previous_epoch_matching_source() {
                if !in_inactivity_leak {
                    deltas.add_reward(participation_component_reward(
                        TIMELY_SOURCE_WEIGHT,
                        source_increments,
                    ));
                }
            } else {
                deltas.add_penalty(participation_component_penalty(TIMELY_SOURCE_WEIGHT));
            }

            if !slashed && participation.previous_epoch_matching_target() {
                if !in_inactivity_leak {
                    deltas.add_reward(participation_component_reward(
                        TIMELY_TARGET_WEIGHT,
                        target_increments,
                    ));
                }
            } else {
                deltas.add_penalty(participation_component_penalty(TIMELY_TARGET_WEIGHT));

                // > Inactivity penalty
                deltas.add_penalty(
                    effective_balance * inactivity_score / inactivity_penalty_denominator,
                );
            }

            // > Head penalties are not applied
            if !slashed && participation.previous_epoch_matching_head() && !in_inactivity_leak {
                deltas.add_reward(participation_component_reward(
                    TIMELY_HEAD_WEIGHT,
                    head_increments,
                ));
            }

            deltas
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use types::altair::consts::participation_flag;

    use super::*;

    #[test_case(0, 0 => (false, false, false, false))]
    #[test_case(participation_flag(TIMELY_SOURCE_FLAG_INDEX), 0 => (true, false, false, false))]
    #[test_case(0b111, 0 => (true, true, true, false))]
    #[test_case(0, participation_flag(TIMELY_TARGET_FLAG_INDEX) => (false, false, false, true))]
    fn participation_flags(
        previous: ParticipationFlags,
        current: ParticipationFlags,
    ) -> (bool, bool, bool, bool) {
        let participation = Participation { previous, current };

        (
            participation.previous_epoch_matching_source(),
            participation.previous_epoch_matching_target(),
            participation.previous_epoch_matching_head(),
            participation.current_epoch_matching_target(),
        )
    }
}
