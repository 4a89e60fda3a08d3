use anyhow::Result;
use types::{
    config::Config, phase0::beacon_state::BeaconState as Phase0BeaconState, preset::Preset,
};

use super::epoch_intermediates::{self, Statistics};
use crate::unphased;

pub fn process_epoch<P: Preset>(config: &Config, state: &mut Phase0BeaconState<P>) -> Result<()> {
    let (statistics, mut summaries, performance) = epoch_intermediates::statistics(state)?;

    process_justification_and_finalization(state, statistics);

    // Deltas depend on `finalized_checkpoint` through the inactivity leak,
    // so they must be computed after justification and finalization.
    let epoch_deltas =
        epoch_intermediates::epoch_deltas(state, statistics, &summaries, &performance)?;

    unphased::process_rewards_and_penalties(state, epoch_deltas);
    unphased::process_registry_updates(config, state, summaries.as_mut_slice())?;
    unphased::process_slashings(state, summaries, P::PROPORTIONAL_SLASHING_MULTIPLIER);
    unphased::process_eth1_data_reset(state);
    unphased::process_effective_balance_updates(state);
    unphased::process_slashings_reset(state);
    unphased::process_randao_mixes_reset(state);
    unphased::process_historical_roots_update(state)?;
    process_participation_record_updates(state);

    state.cache.advance_epoch();

    Ok(())
}

pub fn process_justification_and_finalization<P: Preset>(
    state: &mut Phase0BeaconState<P>,
    statistics: Statistics,
) {
    if !unphased::should_process_justification_and_finalization(state) {
        return;
    }

    unphased::weigh_justification_and_finalization(
        state,
        statistics.current_epoch_active_balance,
        statistics.previous_epoch_target_attesting_balance,
        statistics.current_epoch_target_attesting_balance,
    );
}

fn process_participation_record_updates<P: Preset>(state: &mut Phase0BeaconState<P>) {
    // > Rotate current/previous epoch attestations
    state.previous_epoch_attestations = core::mem::take(&mut state.current_epoch_attestations);
}

#[cfg(test)]
mod tests {
    use types::{phase0::containers::PendingAttestation, preset::Minimal};

    use super::*;

    #[test]
    fn participation_records_are_rotated() -> Result<()> {
        let mut state = Phase0BeaconState::<Minimal>::default();

        let attestation = PendingAttestation {
            inclusion_delay: 1,
            ..PendingAttestation::default()
        };

        state.current_epoch_attestations.push(attestation.clone())?;

        process_participation_record_updates(&mut state);

        assert!(state.current_epoch_attestations.is_empty());
        assert_eq!(state.previous_epoch_attestations.len_usize(), 1);
        assert_eq!(state.previous_epoch_attestations.get(0)?, &attestation);

        Ok(())
    }

    #[test]
    fn justification_is_skipped_in_first_two_epochs() {
        let mut state = Phase0BeaconState::<Minimal> {
            slot: 15,
            ..Phase0BeaconState::default()
        };

        let statistics = Statistics {
            previous_epoch_target_attesting_balance: 32,
            current_epoch_active_balance: 32,
            current_epoch_target_attesting_balance: 32,
            ..Statistics::default()
        };

        process_justification_and_finalization(&mut state, statistics);

        assert_eq!(state.current_justified_checkpoint.epoch, 0);
        assert_eq!(state.justification_bits.count_ones(), 0);
    }
}
