use core::num::NonZeroU64;
use std::sync::Arc;

use anyhow::{bail, ensure, Result};
use arithmetic::U64Ext as _;
use bit_field::BitField as _;
use bls::PublicKeyBytes;
use im::HashMap;
use itertools::Itertools as _;
use ssz::{BitList, ContiguousList, PersistentVector, SszHash};
use std_ext::CopyExt as _;
use tap::{Pipe as _, TryConv as _};
use typenum::Unsigned as _;
use types::{
    altair::{
        consts::{
            DOMAIN_SYNC_COMMITTEE, TIMELY_HEAD_FLAG_INDEX, TIMELY_SOURCE_FLAG_INDEX,
            TIMELY_TARGET_FLAG_INDEX,
        },
        containers::SyncCommittee,
        primitives::ParticipationFlags,
    },
    config::Config,
    nonstandard::{AttestationEpoch, RelativeEpoch},
    phase0::{
        consts::{DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER},
        containers::{Attestation, AttestationData, AttesterSlashing, IndexedAttestation},
        primitives::{CommitteeIndex, DomainType, Epoch, Gwei, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::{error::Error, misc, predicates};

#[must_use]
pub fn get_previous_epoch<P: Preset>(state: &(impl BeaconState<P> + ?Sized)) -> Epoch {
    absolute_epoch(state, RelativeEpoch::Previous)
}

#[must_use]
pub fn get_current_epoch<P: Preset>(state: &(impl BeaconState<P> + ?Sized)) -> Epoch {
    misc::compute_epoch_at_slot::<P>(state.slot())
}

#[must_use]
pub fn get_next_epoch<P: Preset>(state: &(impl BeaconState<P> + ?Sized)) -> Epoch {
    absolute_epoch(state, RelativeEpoch::Next)
}

/// The previous epoch of a state in the genesis epoch is the genesis epoch.
#[must_use]
pub fn absolute_epoch<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    relative_epoch: RelativeEpoch,
) -> Epoch {
    let current_epoch = get_current_epoch(state);

    match relative_epoch {
        RelativeEpoch::Previous => current_epoch.saturating_sub(1),
        RelativeEpoch::Current => current_epoch,
        RelativeEpoch::Next => current_epoch + 1,
    }
}

pub fn attestation_epoch<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    epoch: Epoch,
) -> Result<AttestationEpoch> {
    match get_current_epoch(state).checked_sub(epoch) {
        None => bail!(Error::EpochInTheFuture),
        Some(0) => Ok(AttestationEpoch::Current),
        Some(1) => Ok(AttestationEpoch::Previous),
        Some(_) => bail!(Error::EpochBeforePrevious),
    }
}

pub fn relative_epoch<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    epoch: Epoch,
) -> Result<RelativeEpoch> {
    let next_epoch = get_next_epoch(state);

    ensure!(epoch <= next_epoch, Error::EpochAfterNext);

    if epoch == next_epoch {
        return Ok(RelativeEpoch::Next);
    }

    attestation_epoch(state, epoch).map(Into::into)
}

/// <https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/beacon-chain.md#helpers>
#[must_use]
pub fn get_finality_delay<P: Preset>(state: &(impl BeaconState<P> + ?Sized)) -> u64 {
    get_previous_epoch(state) - state.finalized_checkpoint().epoch
}

/// Root of the block at the start of `attestation_epoch`.
pub fn get_block_root<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    attestation_epoch: AttestationEpoch,
) -> Result<H256> {
    absolute_epoch(state, attestation_epoch.into())
        .pipe(misc::compute_start_slot_at_epoch::<P>)
        .pipe(|slot| get_block_root_at_slot(state, slot))
}

pub fn get_block_root_at_slot<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    slot: Slot,
) -> Result<H256> {
    let oldest_recorded_slot = state.slot().saturating_sub(P::SlotsPerHistoricalRoot::U64);

    ensure!(
        (oldest_recorded_slot..state.slot()).contains(&slot),
        Error::SlotOutOfRange { slot },
    );

    Ok(state.block_roots().mod_index(slot).copy())
}

/// Returns the root of the block that `state` was last updated with.
///
/// The header stored in the state has a zero state root until the next slot is processed.
#[must_use]
pub fn latest_block_root<P: Preset>(state: &(impl BeaconState<P> + SszHash + ?Sized)) -> H256 {
    let mut header = state.latest_block_header();

    if header.state_root.is_zero() {
        header.state_root = state.hash_tree_root();
    }

    header.hash_tree_root()
}

#[must_use]
pub fn get_randao_mix<P: Preset>(state: &(impl BeaconState<P> + ?Sized), epoch: Epoch) -> H256 {
    state.randao_mixes().mod_index(epoch).copy()
}

pub fn public_key<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    validator_index: ValidatorIndex,
) -> Result<&PublicKeyBytes> {
    let validator = state.validators().get(validator_index)?;
    Ok(&validator.pubkey)
}

/// The index is looked up in a map cached in `state`. Validators added later must be recorded in
/// the cache by whoever appends them.
#[must_use]
pub fn index_of_public_key<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    public_key: PublicKeyBytes,
) -> Option<ValidatorIndex> {
    let validator_indices: &HashMap<_, _> = state.cache().validator_indices.get_or_init(|| {
        (0..)
            .zip(state.validators())
            .map(|(index, validator)| (validator.pubkey, index))
            .collect()
    });

    validator_indices.get(&public_key).copied()
}

pub fn get_active_validator_indices<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    relative_epoch: RelativeEpoch,
) -> impl Iterator<Item = ValidatorIndex> + '_ {
    active_validator_indices_at_epoch(state, absolute_epoch(state, relative_epoch))
}

fn active_validator_indices_at_epoch<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    epoch: Epoch,
) -> impl Iterator<Item = ValidatorIndex> + '_ {
    state
        .validators()
        .into_iter()
        .positions(move |validator| predicates::is_active_validator(validator, epoch))
        .map(|position| position as ValidatorIndex)
}

// Only proposer selection needs the list of validators to be in order.
fn active_validator_indices_ordered<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    relative_epoch: RelativeEpoch,
) -> &Arc<[ValidatorIndex]> {
    state.cache().active_validator_indices_ordered[relative_epoch]
        .get_or_init(|| get_active_validator_indices(state, relative_epoch).collect())
}

fn active_validator_indices_shuffled<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    relative_epoch: RelativeEpoch,
) -> &Arc<[ValidatorIndex]> {
    state.cache().active_validator_indices_shuffled[relative_epoch].get_or_init(|| {
        let epoch = absolute_epoch(state, relative_epoch);
        let seed = get_seed(state, epoch, DOMAIN_BEACON_ATTESTER);
        let mut shuffled = active_validator_indices_ordered(state, relative_epoch).to_vec();

        shuffling::shuffle_slice::<P, _>(&mut shuffled, seed)
            .expect("the number of validators is bounded by P::ValidatorRegistryLimit");

        shuffled.into()
    })
}

fn active_validator_count<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    relative_epoch: RelativeEpoch,
) -> u64 {
    active_validator_indices_ordered(state, relative_epoch).len() as u64
}

#[must_use]
pub fn get_validator_churn_limit<P: Preset>(
    config: &Config,
    state: &(impl BeaconState<P> + ?Sized),
) -> u64 {
    let active_validator_count = active_validator_count(state, RelativeEpoch::Current);
    config
        .min_per_epoch_churn_limit
        .max(active_validator_count / config.churn_limit_quotient)
}

fn get_seed<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    epoch: Epoch,
    domain_type: DomainType,
) -> H256 {
    let mix_epoch = epoch + P::EpochsPerHistoricalVector::U64 - P::MIN_SEED_LOOKAHEAD - 1;
    let mix = get_randao_mix(state, mix_epoch);

    hashing::hash_32_64_256(domain_type.to_fixed_bytes(), epoch, mix)
}

#[must_use]
pub fn get_committee_count_per_slot<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    relative_epoch: RelativeEpoch,
) -> u64 {
    misc::committee_count_from_active_validator_count::<P>(active_validator_count(
        state,
        relative_epoch,
    ))
}

/// Committees of an epoch are consecutive slices of the shuffled active validators,
/// ordered by slot and then by committee index.
pub fn beacon_committee<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    slot: Slot,
    committee_index: CommitteeIndex,
) -> Result<&[ValidatorIndex]> {
    let relative_epoch = relative_epoch(state, misc::compute_epoch_at_slot::<P>(slot))?;
    let committees_per_slot = get_committee_count_per_slot(state, relative_epoch);

    ensure!(
        committee_index < committees_per_slot,
        Error::CommitteeIndexOutOfBounds {
            index: committee_index,
        },
    );

    let shuffled = active_validator_indices_shuffled(state, relative_epoch);
    let committee_count = committees_per_slot * P::SlotsPerEpoch::U64;
    let position = misc::slots_since_epoch_start::<P>(slot) * committees_per_slot + committee_index;
    let boundary = |position: u64| -> Result<usize> {
        let validator_count = shuffled.len().try_conv::<u64>()?;
        Ok((validator_count * position / committee_count).try_into()?)
    };

    Ok(&shuffled[boundary(position)?..boundary(position + 1)?])
}

pub fn get_beacon_proposer_index<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
) -> Result<ValidatorIndex> {
    // `misc::compute_proposer_index` fails when the state has no active validators.
    let proposer_index = state.cache().proposer_index.get_or_try_init(|| {
        let epoch_seed = get_seed(state, get_current_epoch(state), DOMAIN_BEACON_PROPOSER);
        let candidates = active_validator_indices_ordered(state, RelativeEpoch::Current);
        let seed = hashing::hash_256_64(epoch_seed, state.slot());

        misc::compute_proposer_index(state, candidates, seed)
    })?;

    Ok(*proposer_index)
}

/// Uses the previous fork version for epochs before the fork in `state`.
#[must_use]
pub fn get_domain<P: Preset>(
    config: &Config,
    state: &(impl BeaconState<P> + ?Sized),
    domain_type: DomainType,
    epoch: Option<Epoch>,
) -> H256 {
    let fork = state.fork();

    let fork_version = match epoch {
        Some(epoch) if epoch < fork.epoch => fork.previous_version,
        None if get_current_epoch(state) < fork.epoch => fork.previous_version,
        _ => fork.current_version,
    };

    misc::compute_domain(
        config,
        domain_type,
        Some(fork_version),
        Some(state.genesis_validators_root()),
    )
}

pub fn get_indexed_attestation<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    attestation: &Attestation<P>,
) -> Result<IndexedAttestation<P>> {
    let attesting_indices =
        get_attesting_indices(state, attestation.data, &attestation.aggregation_bits)?
            .sorted_unstable()
            .pipe(ContiguousList::try_from_iter)
            .expect(
                "attesting indices cannot outnumber the bits in Attestation.aggregation_bits, \
                 which has the same maximum length",
            );

    Ok(IndexedAttestation {
        attesting_indices,
        data: attestation.data,
        signature: attestation.signature,
    })
}

pub fn get_attesting_indices<'all, P: Preset>(
    state: &'all (impl BeaconState<P> + ?Sized),
    attestation_data: AttestationData,
    aggregation_bits: &'all BitList<P::MaxValidatorsPerCommittee>,
) -> Result<impl Iterator<Item = ValidatorIndex> + 'all> {
    let committee = beacon_committee(state, attestation_data.slot, attestation_data.index)?;

    ensure!(
        committee.len() == aggregation_bits.len(),
        Error::CommitteeLengthMismatch {
            aggregation_bitlist_length: aggregation_bits.len(),
            committee_length: committee.len(),
        },
    );

    let attesting_indices = committee
        .iter()
        .zip(aggregation_bits.iter())
        .filter(|(_, present)| *present)
        .map(|(validator_index, _)| *validator_index);

    Ok(attesting_indices)
}

/// Never less than `P::EFFECTIVE_BALANCE_INCREMENT`.
pub fn total_active_balance<P: Preset>(state: &(impl BeaconState<P> + ?Sized)) -> Gwei {
    let current_epoch = get_current_epoch(state);

    state.cache().total_active_balance[RelativeEpoch::Current]
        .get_or_init(|| {
            let total = active_validator_indices_at_epoch(state, current_epoch)
                .filter_map(|index| state.validators().get(index).ok())
                .map(|validator| validator.effective_balance)
                .sum::<Gwei>();

            total
                .max(P::EFFECTIVE_BALANCE_INCREMENT.get())
                .try_into()
                .expect("the value is at least P::EFFECTIVE_BALANCE_INCREMENT, which is nonzero")
        })
        .get()
}

fn get_next_sync_committee_indices<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
) -> Result<Vec<ValidatorIndex>> {
    let next_epoch = get_next_epoch(state);
    let candidates = active_validator_indices_at_epoch(state, next_epoch).collect_vec();
    let seed = get_seed(state, next_epoch, DOMAIN_SYNC_COMMITTEE);

    let candidate_count = candidates
        .len()
        .try_conv::<u64>()?
        .pipe(NonZeroU64::new)
        .ok_or(Error::NoActiveValidators)?;

    let bytes_per_hash = H256::len_bytes() as u64;
    let mut selected = Vec::with_capacity(P::SyncCommitteeSize::USIZE);
    let mut attempt = 0;

    // Each candidate is accepted with probability proportional to its effective balance.
    while selected.len() < P::SyncCommitteeSize::USIZE {
        let shuffled_position = misc::compute_shuffled_index::<P>(
            attempt % candidate_count,
            candidate_count,
            seed,
        );

        let candidate_index = candidates[usize::try_from(shuffled_position)?];
        let random_hash = hashing::hash_256_64(seed, attempt / bytes_per_hash);
        let random_byte = random_hash.as_bytes()[usize::try_from(attempt % bytes_per_hash)?];
        let threshold = P::MAX_EFFECTIVE_BALANCE * u64::from(random_byte);
        let effective_balance = state.validators().get(candidate_index)?.effective_balance;

        if effective_balance * u64::from(u8::MAX) >= threshold {
            selected.push(candidate_index);
        }

        attempt += 1;
    }

    Ok(selected)
}

/// Selects the sync committee for the next period.
///
/// `aggregate_pubkey` is left at its default value. Aggregating public keys is a backend concern
/// and sync aggregate verification goes through [`bls::SignatureOracle`] with individual keys.
pub fn get_next_sync_committee<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
) -> Result<Arc<SyncCommittee<P>>> {
    let pubkeys = get_next_sync_committee_indices(state)?
        .into_iter()
        .map(|validator_index| public_key(state, validator_index).copied())
        .collect::<Result<Vec<_>>>()?
        .pipe(PersistentVector::try_from_iter)?;

    Ok(Arc::new(SyncCommittee {
        pubkeys,
        aggregate_pubkey: PublicKeyBytes::default(),
    }))
}

pub fn get_base_reward<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    validator_index: ValidatorIndex,
    base_reward_per_increment: Gwei,
) -> Result<Gwei> {
    let validator = state.validators().get(validator_index)?;
    Ok(compute_base_reward::<P>(validator.effective_balance, base_reward_per_increment))
}

#[must_use]
pub fn compute_base_reward<P: Preset>(
    effective_balance: Gwei,
    base_reward_per_increment: Gwei,
) -> Gwei {
    effective_balance / P::EFFECTIVE_BALANCE_INCREMENT * base_reward_per_increment
}

pub fn get_base_reward_per_increment<P: Preset>(state: &(impl BeaconState<P> + ?Sized)) -> Gwei {
    P::EFFECTIVE_BALANCE_INCREMENT.get() * P::BASE_REWARD_FACTOR
        / total_active_balance(state).integer_sqrt()
}

/// Fails if the source of `data` does not match the justified checkpoint of its target epoch.
pub fn get_attestation_participation_flags<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    data: AttestationData,
    inclusion_delay: u64,
) -> Result<ParticipationFlags> {
    let target_epoch = attestation_epoch(state, data.target.epoch)?;

    let justified_checkpoint = match target_epoch {
        AttestationEpoch::Previous => state.previous_justified_checkpoint(),
        AttestationEpoch::Current => state.current_justified_checkpoint(),
    };

    ensure!(
        data.source == justified_checkpoint,
        Error::AttestationSourceMismatch,
    );

    let target_matches = data.target.root == get_block_root(state, target_epoch)?;
    let head_matches = target_matches
        && data.beacon_block_root == get_block_root_at_slot(state, data.slot)?;

    let earned_flags = [
        (
            TIMELY_SOURCE_FLAG_INDEX,
            inclusion_delay <= P::SlotsPerEpoch::U64.integer_sqrt(),
        ),
        (
            TIMELY_TARGET_FLAG_INDEX,
            target_matches && inclusion_delay <= P::SlotsPerEpoch::U64,
        ),
        (
            TIMELY_HEAD_FLAG_INDEX,
            head_matches && inclusion_delay == P::MIN_ATTESTATION_INCLUSION_DELAY.get(),
        ),
    ];

    let mut participation_flags: ParticipationFlags = 0;

    for (flag_index, earned) in earned_flags {
        participation_flags.set_bit(flag_index, earned);
    }

    Ok(participation_flags)
}

/// Validators present in both attestations of `attester_slashing`.
///
/// Attesting indices in valid indexed attestations are sorted, which lets them be merged.
pub fn slashable_indices(
    attester_slashing: &AttesterSlashing<impl Preset>,
) -> impl Iterator<Item = ValidatorIndex> + '_ {
    let AttesterSlashing {
        attestation_1,
        attestation_2,
    } = attester_slashing;

    attestation_1
        .attesting_indices
        .iter()
        .merge_join_by(attestation_2.attesting_indices.iter(), |left, right| left.cmp(right))
        .filter_map(|either_or_both| either_or_both.both())
        .map(|(validator_index, _)| *validator_index)
}
