use anyhow::Result;
use arithmetic::U64Ext as _;
use helper_functions::{
    accessors::{get_current_epoch, get_next_sync_committee, total_active_balance},
    predicates::is_in_inactivity_leak,
};
use ssz::PersistentList;
use types::{
    altair::beacon_state::BeaconState as AltairBeaconState,
    config::Config,
    phase0::consts::GENESIS_EPOCH,
    preset::Preset,
    traits::{BeaconState, PostAltairBeaconState},
};

use super::epoch_intermediates::{self, Participation, Statistics};
use crate::unphased::{self, ValidatorSummary};

pub fn process_epoch<P: Preset>(config: &Config, state: &mut AltairBeaconState<P>) -> Result<()> {
    let (statistics, mut summaries, participation) = epoch_intermediates::statistics(state);

    process_justification_and_finalization(state, statistics);
    process_inactivity_updates(config, state, &summaries, &participation);

    // Deltas read the updated `finalized_checkpoint` and `inactivity_scores`.
    let epoch_deltas =
        epoch_intermediates::epoch_deltas(config, state, statistics, &summaries, &participation);

    unphased::process_rewards_and_penalties(state, epoch_deltas);
    unphased::process_registry_updates(config, state, summaries.as_mut_slice())?;
    unphased::process_slashings(state, summaries, P::PROPORTIONAL_SLASHING_MULTIPLIER_ALTAIR);
    unphased::process_eth1_data_reset(state);
    unphased::process_effective_balance_updates(state);
    unphased::process_slashings_reset(state);
    unphased::process_randao_mixes_reset(state);
    unphased::process_historical_roots_update(state)?;
    process_participation_flag_updates(state)?;
    process_sync_committee_updates(state)?;

    state.cache.advance_epoch();

    Ok(())
}

pub fn process_justification_and_finalization<P: Preset>(
    state: &mut impl BeaconState<P>,
    statistics: Statistics,
) {
    if !unphased::should_process_justification_and_finalization(state) {
        return;
    }

    unphased::weigh_justification_and_finalization(
        state,
        total_active_balance(state),
        statistics.previous_epoch_target_participating_balance,
        statistics.current_epoch_target_participating_balance,
    );
}

pub fn process_inactivity_updates<P: Preset>(
    config: &Config,
    state: &mut impl PostAltairBeaconState<P>,
    summaries: &[ValidatorSummary],
    participation: &[Participation],
) {
    if !should_process_inactivity_updates(state) {
        return;
    }

    let in_inactivity_leak = is_in_inactivity_leak(state);

    let mut validators = summaries.iter().zip(participation);

    state.inactivity_scores_mut().update(|inactivity_score| {
        let (summary, participation) = validators
            .next()
            .expect("inactivity scores, summaries and participation have one entry per validator");

        if !summary.eligible_for_penalties {
            return;
        }

        let unslashed_and_participating = !summary.slashed
            && summary.active_in_previous_epoch
            && participation.previous_epoch_matching_target();

        // > Increase the inactivity score of inactive validators
        if unslashed_and_participating {
            *inactivity_score = inactivity_score.saturating_sub(1);
        } else {
            *inactivity_score += config.inactivity_score_bias.get();
        }

        // > Decrease the inactivity score of all eligible validators during a leak-free epoch
        if !in_inactivity_leak {
            *inactivity_score =
                inactivity_score.saturating_sub(config.inactivity_score_recovery_rate);
        }
    });
}

pub fn process_participation_flag_updates<P: Preset>(
    state: &mut impl PostAltairBeaconState<P>,
) -> Result<()> {
    // > Rotate current/previous epoch participation
    let zero_participation =
        PersistentList::try_from_iter(state.validators().iter().map(|_| 0))?;

    *state.previous_epoch_participation_mut() =
        core::mem::replace(state.current_epoch_participation_mut(), zero_participation);

    Ok(())
}

pub fn process_sync_committee_updates<P: Preset>(
    state: &mut impl PostAltairBeaconState<P>,
) -> Result<()> {
    let next_epoch = get_current_epoch(state) + 1;

    if next_epoch.is_multiple_of_non_zero(P::EPOCHS_PER_SYNC_COMMITTEE_PERIOD) {
        let committee = get_next_sync_committee(state)?;

        *state.current_sync_committee_mut() =
            core::mem::replace(state.next_sync_committee_mut(), committee);
    }

    Ok(())
}

fn should_process_inactivity_updates<P: Preset>(state: &impl BeaconState<P>) -> bool {
    // > Skip the genesis epoch as score updates are based on the previous epoch participation
    GENESIS_EPOCH < get_current_epoch(state)
}
