use core::ops::BitOrAssign as _;
use std::sync::Arc;

use anyhow::Result;
use itertools::Itertools as _;
use ssz::PersistentList;
use std_ext::ArcExt as _;
use types::{
    altair::beacon_state::BeaconState as AltairBeaconState,
    config::Config,
    phase0::{
        beacon_state::BeaconState as Phase0BeaconState,
        containers::{Fork, PendingAttestation},
    },
    preset::Preset,
};

use crate::accessors;

/// [`upgrade_to_altair`](https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/altair/fork.md#upgrading-the-state)
pub fn upgrade_to_altair<P: Preset>(
    config: &Config,
    pre: Phase0BeaconState<P>,
) -> Result<AltairBeaconState<P>> {
    let epoch = accessors::get_current_epoch(&pre);

    let Phase0BeaconState {
        genesis_time,
        genesis_validators_root,
        slot,
        fork,
        latest_block_header,
        block_roots,
        state_roots,
        historical_roots,
        eth1_data,
        eth1_data_votes,
        eth1_deposit_index,
        validators,
        balances,
        randao_mixes,
        slashings,
        previous_epoch_attestations,
        current_epoch_attestations: _,
        justification_bits,
        previous_justified_checkpoint,
        current_justified_checkpoint,
        finalized_checkpoint,
        cache,
    } = pre;

    let fork = Fork {
        previous_version: fork.current_version,
        current_version: config.altair_fork_version,
        epoch,
    };

    let zero_participation =
        PersistentList::try_from_iter(core::iter::repeat_n(0, validators.len_usize()))?;

    let inactivity_scores =
        PersistentList::try_from_iter(core::iter::repeat_n(0, validators.len_usize()))?;

    let mut post = AltairBeaconState {
        // > Versioning
        genesis_time,
        genesis_validators_root,
        slot,
        fork,
        // > History
        latest_block_header,
        block_roots,
        state_roots,
        historical_roots,
        // > Eth1
        eth1_data,
        eth1_data_votes,
        eth1_deposit_index,
        // > Registry
        validators,
        balances,
        // > Randomness
        randao_mixes,
        // > Slashings
        slashings,
        // > Participation
        previous_epoch_participation: zero_participation.clone(),
        current_epoch_participation: zero_participation,
        // > Finality
        justification_bits,
        previous_justified_checkpoint,
        current_justified_checkpoint,
        finalized_checkpoint,
        // > Inactivity
        inactivity_scores,
        // > Sync
        current_sync_committee: Arc::default(),
        next_sync_committee: Arc::default(),
        // Cache
        cache,
    };

    // > Fill in previous epoch participation from the pre state's pending attestations
    translate_participation(&mut post, &previous_epoch_attestations)?;

    // > Fill in sync committees
    // > Note: A duplicate committee is assigned for the current and next committee at the fork
    // >       boundary
    let sync_committee = accessors::get_next_sync_committee(&post)?;
    post.current_sync_committee = sync_committee.clone_arc();
    post.next_sync_committee = sync_committee;

    Ok(post)
}

fn translate_participation<'attestations, P: Preset>(
    state: &mut AltairBeaconState<P>,
    pending_attestations: impl IntoIterator<Item = &'attestations PendingAttestation<P>>,
) -> Result<()> {
    for attestation in pending_attestations {
        let PendingAttestation {
            ref aggregation_bits,
            data,
            inclusion_delay,
            ..
        } = *attestation;

        let attesting_indices =
            accessors::get_attesting_indices(state, data, aggregation_bits)?.collect_vec();

        // > Translate attestation inclusion info to flag indices
        let participation_flags =
            accessors::get_attestation_participation_flags(state, data, inclusion_delay)?;

        // > Apply flags to all attesting validators
        for attesting_index in attesting_indices {
            state
                .previous_epoch_participation
                .get_mut(attesting_index)?
                .bitor_assign(participation_flags);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use ssz::SszHash as _;
    use types::{
        phase0::{consts::FAR_FUTURE_EPOCH, containers::Validator},
        preset::Minimal,
        traits::BeaconState as _,
    };

    use super::*;

    #[test]
    fn upgrade_keeps_registry_and_rotates_fork() -> Result<()> {
        let config = Config::minimal();

        let validator = Validator {
            effective_balance: 32_000_000_000,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
            ..Validator::default()
        };

        let pre = Phase0BeaconState::<Minimal> {
            slot: 16,
            validators: PersistentList::try_from_iter(core::iter::repeat_n(validator, 16))?,
            balances: PersistentList::try_from_iter(core::iter::repeat_n(32_000_000_000, 16))?,
            ..Phase0BeaconState::default()
        };

        let validators_root = pre.validators.hash_tree_root();
        let post = upgrade_to_altair(&config, pre)?;

        assert_eq!(post.fork.epoch, 2);
        assert_eq!(post.fork.current_version, config.altair_fork_version);
        assert_eq!(post.validators().hash_tree_root(), validators_root);
        assert_eq!(post.inactivity_scores.len_u64(), 16);
        assert_eq!(post.current_sync_committee, post.next_sync_committee);
        assert!(post.previous_epoch_participation.iter().all(|flags| *flags == 0));

        Ok(())
    }
}
