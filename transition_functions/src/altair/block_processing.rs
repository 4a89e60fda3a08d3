use anyhow::{Context as _, Result};
use arithmetic::U64Ext as _;
use bit_field::BitField as _;
use bls::SignatureOracle;
use helper_functions::{
    accessors::{
        attestation_epoch, get_attestation_participation_flags, get_attesting_indices,
        get_base_reward, get_base_reward_per_increment, get_beacon_proposer_index,
        get_block_root_at_slot, index_of_public_key, total_active_balance,
    },
    error::SignatureKind,
    mutators::{balance, decrease_balance, increase_balance},
    signing::SignForSingleForkAtSlot as _,
    verifier::Verifier,
};
use std_ext::ArcExt as _;
use types::{
    altair::{
        beacon_state::BeaconState,
        consts::{
            PARTICIPATION_FLAG_WEIGHTS, PROPOSER_WEIGHT, SYNC_REWARD_WEIGHT, WEIGHT_DENOMINATOR,
        },
        containers::{BeaconBlock as AltairBeaconBlock, BeaconBlockBody, SyncAggregate},
    },
    config::Config,
    nonstandard::AttestationEpoch,
    phase0::{
        containers::{Attestation, Deposit, DepositData},
        primitives::ValidatorIndex,
    },
    preset::Preset,
    traits::PostAltairBeaconState,
};

use crate::{
    phase0,
    unphased::{self, Error, ProposerPolicy, SyncAggregateInvalidReason},
};

/// Processes everything in `block` except its own signature and the state root.
///
/// Calls [`Verifier::finish`] at the end like [`phase0::process_block`].
pub fn process_block<P: Preset>(
    config: &Config,
    oracle: &dyn SignatureOracle,
    state: &mut BeaconState<P>,
    block: &AltairBeaconBlock<P>,
    proposer_policy: ProposerPolicy,
    mut verifier: impl Verifier,
) -> Result<()> {
    unphased::process_block_header(state, block, proposer_policy)
        .context(Error::InvalidBlockHeader)?;

    unphased::process_randao(config, state, &block.body, &mut verifier)
        .context(Error::InvalidBlockHeader)?;

    unphased::process_eth1_data(state, &block.body)?;

    process_operations(config, oracle, state, &block.body, &mut verifier)?;

    process_sync_aggregate(config, state, &block.body.sync_aggregate, &mut verifier)
        .context(Error::InvalidSyncAggregate)?;

    verifier.finish()
}

/// Same as [`phase0::count_required_signatures`] plus one for the sync aggregate.
pub fn count_required_signatures<P: Preset>(block: &AltairBeaconBlock<P>) -> usize {
    phase0::count_required_signatures(block) + 1
}

fn process_operations<P: Preset>(
    config: &Config,
    oracle: &dyn SignatureOracle,
    state: &mut BeaconState<P>,
    body: &BeaconBlockBody<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    unphased::validate_deposit_count(state, body)?;

    for (proposer_slashing, index) in body.proposer_slashings.iter().copied().zip(0..) {
        unphased::process_proposer_slashing(config, state, proposer_slashing, &mut verifier)
            .context(Error::InvalidProposerSlashing { index })?;
    }

    for (attester_slashing, index) in body.attester_slashings.iter().zip(0..) {
        unphased::process_attester_slashing(config, state, attester_slashing, &mut verifier)
            .context(Error::InvalidAttesterSlashing { index })?;
    }

    for (attestation, index) in body.attestations.iter().zip(0..) {
        unphased::validate_attestation_with_verifier(config, state, attestation, &mut verifier)
            .and_then(|_| apply_attestation(state, attestation))
            .context(Error::InvalidAttestation { index })?;
    }

    for (deposit, index) in body.deposits.iter().zip(0..) {
        process_deposit(config, oracle, state, deposit).context(Error::InvalidDeposit { index })?;
    }

    for (voluntary_exit, index) in body.voluntary_exits.iter().copied().zip(0..) {
        unphased::process_voluntary_exit(config, state, voluntary_exit, &mut verifier)
            .context(Error::InvalidVoluntaryExit { index })?;
    }

    Ok(())
}

/// Updates participation flags of attesting validators and rewards the proposer.
///
/// The attestation must already be validated.
pub fn apply_attestation<P: Preset>(
    state: &mut impl PostAltairBeaconState<P>,
    attestation: &Attestation<P>,
) -> Result<()> {
    let Attestation {
        ref aggregation_bits,
        data,
        ..
    } = *attestation;

    // > Participation flag indices
    let inclusion_delay = state.slot() - data.slot;
    let participation_flags = get_attestation_participation_flags(state, data, inclusion_delay)?;

    // > Update epoch participation flags
    let base_reward_per_increment = get_base_reward_per_increment(state);

    let attesting_indices_with_base_rewards = get_attesting_indices(state, data, aggregation_bits)?
        .map(|validator_index| {
            let base_reward = get_base_reward(state, validator_index, base_reward_per_increment)?;
            Ok((validator_index, base_reward))
        })
        .collect::<Result<Vec<_>>>()?;

    let proposer_index = get_beacon_proposer_index(state)?;

    let epoch_participation = match attestation_epoch(state, data.target.epoch)? {
        AttestationEpoch::Previous => state.previous_epoch_participation_mut(),
        AttestationEpoch::Current => state.current_epoch_participation_mut(),
    };

    let mut proposer_reward_numerator = 0;

    for (validator_index, base_reward) in attesting_indices_with_base_rewards {
        let epoch_participation = epoch_participation.get_mut(validator_index)?;

        for (flag_index, weight) in PARTICIPATION_FLAG_WEIGHTS {
            if participation_flags.get_bit(flag_index) && !epoch_participation.get_bit(flag_index) {
                proposer_reward_numerator += base_reward * weight;
            }
        }

        *epoch_participation |= participation_flags;
    }

    // > Reward proposer
    let proposer_reward_denominator =
        (WEIGHT_DENOMINATOR.get() - PROPOSER_WEIGHT) * WEIGHT_DENOMINATOR.get() / PROPOSER_WEIGHT;
    let proposer_reward = proposer_reward_numerator / proposer_reward_denominator;

    increase_balance(balance(state, proposer_index)?, proposer_reward);

    Ok(())
}

fn process_deposit<P: Preset>(
    config: &Config,
    oracle: &dyn SignatureOracle,
    state: &mut BeaconState<P>,
    deposit: &Deposit,
) -> Result<()> {
    if let Some(validator_index) = unphased::process_deposit(config, oracle, state, deposit)? {
        extend_participation(state, validator_index)?;
    }

    Ok(())
}

/// Adds a validator without checking a deposit proof. Used to build genesis states.
pub fn process_deposit_data<P: Preset>(
    config: &Config,
    oracle: &dyn SignatureOracle,
    state: &mut BeaconState<P>,
    deposit_data: DepositData,
) -> Result<Option<ValidatorIndex>> {
    let validator_index = unphased::apply_deposit(config, oracle, state, deposit_data)?;

    if let Some(validator_index) = validator_index {
        extend_participation(state, validator_index)?;
    }

    Ok(validator_index)
}

fn extend_participation<P: Preset>(
    state: &mut BeaconState<P>,
    validator_index: ValidatorIndex,
) -> Result<()> {
    debug_assert_eq!(state.previous_epoch_participation.len_u64(), validator_index);

    state.previous_epoch_participation.push(0)?;
    state.current_epoch_participation.push(0)?;
    state.inactivity_scores.push(0)?;

    Ok(())
}

pub fn process_sync_aggregate<P: Preset>(
    config: &Config,
    state: &mut impl PostAltairBeaconState<P>,
    sync_aggregate: &SyncAggregate<P>,
    verifier: impl Verifier,
) -> Result<()> {
    // > Verify sync committee aggregate signature signing over the previous slot block root
    verify_sync_aggregate_signature(config, state, sync_aggregate, verifier)?;

    // > Compute participant and proposer rewards
    let total_active_increments = total_active_balance(state) / P::EFFECTIVE_BALANCE_INCREMENT;
    let total_base_rewards = get_base_reward_per_increment(state) * total_active_increments;
    let max_participant_rewards = (total_base_rewards * SYNC_REWARD_WEIGHT / WEIGHT_DENOMINATOR)
        .div_typenum::<P::SlotsPerEpoch>();
    let participant_reward = max_participant_rewards.div_typenum::<P::SyncCommitteeSize>();
    let proposer_reward =
        participant_reward * PROPOSER_WEIGHT / (WEIGHT_DENOMINATOR.get() - PROPOSER_WEIGHT);

    // > Apply participant and proposer rewards
    let proposer_index = get_beacon_proposer_index(state)?;
    let sync_committee = state.current_sync_committee().clone_arc();
    let mut participation = 0;

    for (participant_pubkey, participation_bit) in sync_committee
        .pubkeys
        .iter()
        .zip(sync_aggregate.sync_committee_bits.iter())
    {
        let participant_index = index_of_public_key(state, *participant_pubkey)
            .ok_or(SyncAggregateInvalidReason::UnknownParticipant)?;

        if participation_bit {
            increase_balance(balance(state, participant_index)?, participant_reward);
            participation += 1;
        } else {
            decrease_balance(balance(state, participant_index)?, participant_reward);
        }
    }

    increase_balance(
        balance(state, proposer_index)?,
        proposer_reward * participation,
    );

    Ok(())
}

pub fn verify_sync_aggregate_signature<P: Preset>(
    config: &Config,
    state: &impl PostAltairBeaconState<P>,
    sync_aggregate: &SyncAggregate<P>,
    mut verifier: impl Verifier,
) -> Result<()> {
    let SyncAggregate {
        ref sync_committee_bits,
        sync_committee_signature,
    } = *sync_aggregate;

    let participant_pubkeys = state
        .current_sync_committee()
        .pubkeys
        .iter()
        .zip(sync_committee_bits.iter())
        .filter(|(_, bit)| *bit)
        .map(|(pubkey, _)| *pubkey);

    let previous_slot = state.slot().saturating_sub(1);
    let block_root = get_block_root_at_slot(state, previous_slot)?;
    let signing_root = block_root.signing_root(config, state, previous_slot);

    verifier
        .verify_aggregate_allowing_empty(
            signing_root,
            sync_committee_signature,
            participant_pubkeys,
            SignatureKind::SyncAggregate,
        )
        .context(SyncAggregateInvalidReason::SignatureInvalid)
}

#[cfg(test)]
mod tests {
    use bls::{InsecureOracle, SecretKey};
    use helper_functions::{
        accessors::beacon_committee, fork::upgrade_to_altair, misc::bls_withdrawal_credentials,
        signing::SignForAllForks as _, verifier::SingleVerifier,
    };
    use ssz::BitList;
    use typenum::Unsigned as _;
    use types::{
        altair::consts::{participation_flag, TIMELY_SOURCE_FLAG_INDEX, TIMELY_TARGET_FLAG_INDEX},
        phase0::{
            beacon_state::BeaconState as Phase0BeaconState,
            consts::FAR_FUTURE_EPOCH,
            containers::{AttestationData, Checkpoint, DepositMessage, Validator},
            primitives::{Gwei, H256},
        },
        preset::Minimal,
    };

    use super::*;

    fn altair_state(slot: u64, validator_count: u64) -> Result<BeaconState<Minimal>> {
        let config = Config::minimal();

        let mut state = Phase0BeaconState::<Minimal> {
            slot,
            ..Phase0BeaconState::default()
        };

        for index in 0..validator_count {
            let validator = Validator {
                pubkey: SecretKey::interop(index).to_public_key(),
                effective_balance: 32_000_000_000,
                exit_epoch: FAR_FUTURE_EPOCH,
                withdrawable_epoch: FAR_FUTURE_EPOCH,
                ..Validator::default()
            };

            state.validators.push(validator)?;
            state.balances.push(32_000_000_000)?;
        }

        upgrade_to_altair(&config, state)
    }

    fn total_balance(state: &BeaconState<Minimal>) -> Gwei {
        state.balances.iter().sum()
    }

    #[test]
    fn empty_sync_aggregate_penalizes_every_committee_member() -> Result<()> {
        let config = Config::minimal();
        let mut state = altair_state(9, 64)?;
        let before = total_balance(&state);

        process_sync_aggregate(
            &config,
            &mut state,
            &SyncAggregate::default(),
            SingleVerifier::new(&InsecureOracle),
        )?;

        let penalty = before - total_balance(&state);
        let committee_size = <Minimal as Preset>::SyncCommitteeSize::U64;

        assert!(penalty > 0);
        assert_eq!(penalty % committee_size, 0);

        Ok(())
    }

    #[test]
    fn nonempty_sync_aggregate_needs_a_signature() -> Result<()> {
        let config = Config::minimal();
        let mut state = altair_state(9, 64)?;

        let mut sync_aggregate = SyncAggregate::<Minimal>::default();
        sync_aggregate.sync_committee_bits.set(0, true);

        let error = process_sync_aggregate(
            &config,
            &mut state,
            &sync_aggregate,
            SingleVerifier::new(&InsecureOracle),
        )
        .expect_err("an empty signature cannot cover a participant");

        assert!(matches!(
            error.downcast_ref(),
            Some(SyncAggregateInvalidReason::SignatureInvalid),
        ));

        Ok(())
    }

    #[test]
    fn attestation_sets_participation_flags_and_rewards_proposer() -> Result<()> {
        let mut state = altair_state(10, 64)?;

        let committee = beacon_committee(&state, 8, 0)?.to_vec();
        let mut aggregation_bits = BitList::with_length(committee.len())?;

        aggregation_bits.set(0, true);

        let attestation = Attestation {
            aggregation_bits,
            data: AttestationData {
                slot: 8,
                index: 0,
                beacon_block_root: H256::zero(),
                source: Checkpoint::default(),
                target: Checkpoint {
                    epoch: 1,
                    root: H256::zero(),
                },
            },
            ..Attestation::default()
        };

        let proposer_index = get_beacon_proposer_index(&state)?;
        let proposer_balance = *state.balances.get(proposer_index)?;

        apply_attestation(&mut state, &attestation)?;

        // Included 2 slots late, so the head flag is not set.
        let expected_flags = participation_flag(TIMELY_SOURCE_FLAG_INDEX)
            | participation_flag(TIMELY_TARGET_FLAG_INDEX);

        assert_eq!(
            *state.current_epoch_participation.get(committee[0])?,
            expected_flags,
        );

        assert!(*state.balances.get(proposer_index)? > proposer_balance);

        // Applying the same attestation again does not reward the proposer twice.
        let rewarded_balance = *state.balances.get(proposer_index)?;

        apply_attestation(&mut state, &attestation)?;

        assert_eq!(*state.balances.get(proposer_index)?, rewarded_balance);

        Ok(())
    }

    #[test]
    fn deposit_data_extends_participation_lists() -> Result<()> {
        let config = Config::minimal();
        let mut state = altair_state(9, 4)?;

        let secret_key = SecretKey::interop(4);
        let pubkey = secret_key.to_public_key();
        let withdrawal_credentials = bls_withdrawal_credentials(pubkey);

        let deposit_message = DepositMessage {
            pubkey,
            withdrawal_credentials,
            amount: 32_000_000_000,
        };

        let deposit_data = DepositData {
            pubkey,
            withdrawal_credentials,
            amount: 32_000_000_000,
            signature: deposit_message.sign(&config, secret_key),
        };

        let validator_index =
            process_deposit_data(&config, &InsecureOracle, &mut state, deposit_data)?;

        assert_eq!(validator_index, Some(4));
        assert_eq!(state.previous_epoch_participation.len_u64(), 5);
        assert_eq!(state.current_epoch_participation.len_u64(), 5);
        assert_eq!(state.inactivity_scores.len_u64(), 5);

        Ok(())
    }
}
