use core::{num::NonZeroU64, ops::Range};

use anyhow::Result;
use arithmetic::U64Ext as _;
use bls::PublicKeyBytes;
use ssz::SszHash;
use tap::{Pipe as _, TryConv as _};
use typenum::Unsigned as _;
use types::{
    altair::primitives::SyncCommitteePeriod,
    config::Config,
    phase0::{
        consts::{BLS_WITHDRAWAL_PREFIX, GENESIS_SLOT},
        containers::{ForkData, SigningData},
        primitives::{
            Domain, DomainType, Epoch, Slot, UnixSeconds, ValidatorIndex, Version, H256,
        },
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::error::Error;

#[must_use]
pub fn compute_epoch_at_slot<P: Preset>(slot: Slot) -> Epoch {
    slot.div_typenum::<P::SlotsPerEpoch>()
}

#[must_use]
pub const fn compute_start_slot_at_epoch<P: Preset>(epoch: Epoch) -> Slot {
    epoch.saturating_mul(P::SlotsPerEpoch::U64)
}

#[must_use]
pub fn is_epoch_start<P: Preset>(slot: Slot) -> bool {
    slots_since_epoch_start::<P>(slot) == 0
}

#[must_use]
pub fn slots_since_epoch_start<P: Preset>(slot: Slot) -> u64 {
    slot.mod_typenum::<P::SlotsPerEpoch>()
}

#[must_use]
pub const fn slots_in_epoch<P: Preset>(epoch: Epoch) -> Range<Slot> {
    compute_start_slot_at_epoch::<P>(epoch)..compute_start_slot_at_epoch::<P>(epoch + 1)
}

/// <https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/altair/validator.md#sync-committee>
#[must_use]
pub fn sync_committee_period<P: Preset>(epoch: Epoch) -> SyncCommitteePeriod {
    epoch / P::EPOCHS_PER_SYNC_COMMITTEE_PERIOD
}

#[must_use]
pub const fn compute_activation_exit_epoch<P: Preset>(epoch: Epoch) -> Epoch {
    epoch + 1 + P::MAX_SEED_LOOKAHEAD
}

// > Return the 32-byte fork data root for the ``current_version`` and ``genesis_validators_root``.
// > This is used primarily in signature domains to avoid collisions across forks/chains.
fn compute_fork_data_root(current_version: Version, genesis_validators_root: H256) -> H256 {
    ForkData {
        current_version,
        genesis_validators_root,
    }
    .hash_tree_root()
}

pub(crate) fn compute_domain(
    config: &Config,
    domain_type: DomainType,
    fork_version: Option<Version>,
    genesis_validators_root: Option<H256>,
) -> Domain {
    let fork_version = fork_version.unwrap_or(config.genesis_fork_version);
    let genesis_validators_root = genesis_validators_root.unwrap_or_else(H256::zero);
    let fork_data_root = compute_fork_data_root(fork_version, genesis_validators_root);

    let mut domain = Domain::zero();
    domain[..DomainType::len_bytes()].copy_from_slice(domain_type.as_bytes());
    domain[DomainType::len_bytes()..]
        .copy_from_slice(&fork_data_root[..H256::len_bytes() - DomainType::len_bytes()]);
    domain
}

pub fn compute_signing_root(object: &(impl SszHash + ?Sized), domain: Domain) -> H256 {
    SigningData {
        object_root: object.hash_tree_root(),
        domain,
    }
    .hash_tree_root()
}

pub(crate) fn compute_shuffled_index<P: Preset>(
    index: ValidatorIndex,
    index_count: NonZeroU64,
    seed: H256,
) -> ValidatorIndex {
    shuffling::shuffle_single::<P>(index, index_count, seed)
}

pub(crate) fn compute_proposer_index<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    indices: &[ValidatorIndex],
    seed: H256,
) -> Result<ValidatorIndex> {
    let total = indices
        .len()
        .try_conv::<u64>()?
        .pipe(NonZeroU64::new)
        .ok_or(Error::NoActiveValidators)?;

    let max_random_byte = u64::from(u8::MAX);

    (0..u64::MAX / H256::len_bytes() as u64)
        .flat_map(|quotient| {
            hashing::hash_256_64(seed, quotient)
                .to_fixed_bytes()
                .into_iter()
                .map(u64::from)
        })
        .zip(0..)
        .find_map(|(random_byte, attempt)| {
            let shuffled_index_of_index = compute_shuffled_index::<P>(attempt % total, total, seed)
                .try_conv::<usize>()
                .expect(
                    "shuffled_index_of_index fits in usize because it is less than indices.len()",
                );

            let candidate_index = indices[shuffled_index_of_index];

            let effective_balance = state
                .validators()
                .get(candidate_index)
                .expect("candidate_index was produced by enumerating active validators")
                .effective_balance;

            (effective_balance * max_random_byte >= P::MAX_EFFECTIVE_BALANCE * random_byte)
                .then_some(candidate_index)
        })
        .ok_or(Error::FailedToSelectProposer)
        .map_err(Into::into)
}

#[must_use]
pub fn compute_timestamp_at_slot<P: Preset>(
    config: &Config,
    state: &(impl BeaconState<P> + ?Sized),
    slot: Slot,
) -> UnixSeconds {
    let slots_since_genesis = slot - GENESIS_SLOT;
    state.genesis_time() + slots_since_genesis * config.seconds_per_slot.get()
}

#[must_use]
pub fn committee_count_from_active_validator_count<P: Preset>(active_validator_count: u64) -> u64 {
    (active_validator_count.div_typenum::<P::SlotsPerEpoch>() / P::TARGET_COMMITTEE_SIZE)
        .clamp(1, P::MAX_COMMITTEES_PER_SLOT.get())
}

// <https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/validator.md#bls_withdrawal_prefix>
#[must_use]
pub fn bls_withdrawal_credentials(public_key: PublicKeyBytes) -> H256 {
    let mut withdrawal_credentials = hashing::hash_bytes(public_key);
    withdrawal_credentials[..BLS_WITHDRAWAL_PREFIX.len()].copy_from_slice(BLS_WITHDRAWAL_PREFIX);
    withdrawal_credentials
}

#[must_use]
pub fn vec_of_default<P: Preset, T: Clone + Default>(
    state: &(impl BeaconState<P> + ?Sized),
) -> Vec<T> {
    vec![T::default(); state.validators().len_usize()]
}

#[cfg(test)]
mod tests {
    use test_case::test_case;
    use types::preset::{Mainnet, Minimal};

    use super::*;

    #[test_case(0 => 0)]
    #[test_case(7 => 0)]
    #[test_case(8 => 1)]
    #[test_case(35 => 4)]
    fn minimal_epoch_at_slot(slot: Slot) -> Epoch {
        compute_epoch_at_slot::<Minimal>(slot)
    }

    #[test]
    fn start_slot_saturates() {
        assert_eq!(compute_start_slot_at_epoch::<Mainnet>(2), 64);
        assert_eq!(compute_start_slot_at_epoch::<Mainnet>(u64::MAX), u64::MAX);
    }

    #[test_case(0 => 1; "lower bound")]
    #[test_case(96 => 3)]
    #[test_case(u64::MAX => 4; "upper bound")]
    fn minimal_committee_count(active_validator_count: u64) -> u64 {
        committee_count_from_active_validator_count::<Minimal>(active_validator_count)
    }

    #[test]
    fn domain_starts_with_domain_type() {
        let config = Config::minimal();
        let domain_type = DomainType::from_low_u64_be(0x0a0b_0c0d);
        let domain = compute_domain(&config, domain_type, None, None);

        assert_eq!(&domain[..4], domain_type.as_bytes());
        assert_ne!(
            domain,
            compute_domain(&config, domain_type, None, Some(H256::repeat_byte(1))),
        );
    }

    #[test]
    fn withdrawal_credentials_have_bls_prefix() {
        let credentials = bls_withdrawal_credentials(PublicKeyBytes::default());

        assert_eq!(&credentials[..1], BLS_WITHDRAWAL_PREFIX);
    }
}
