//! Genesis state construction.
//!
//! [`Incremental`] builds a genesis state one deposit at a time the way the deposit contract
//! would see them. [`interop`] uses it to produce deterministic states for tests and local chains.

use core::num::NonZeroU64;

use anyhow::{ensure, Result};
use arithmetic::U64Ext as _;
use bls::{SignatureBytes, SignatureOracle};
use deposit_tree::DepositTree;
use helper_functions::accessors;
use ssz::{PersistentVector, SszHash as _};
use std_ext::ArcExt as _;
use thiserror::Error;
use transition_functions::combined;
use types::{
    altair::{
        beacon_state::BeaconState as AltairBeaconState,
        containers::{BeaconBlock as AltairBeaconBlock, BeaconBlockBody as AltairBeaconBlockBody},
    },
    cache::Cache,
    combined::{BeaconBlock, BeaconState, SignedBeaconBlock},
    config::Config,
    nonstandard::{Phase, RelativeEpoch},
    phase0::{
        beacon_state::BeaconState as Phase0BeaconState,
        consts::{GENESIS_EPOCH, GENESIS_SLOT},
        containers::{
            BeaconBlock as Phase0BeaconBlock, BeaconBlockBody as Phase0BeaconBlockBody,
            BeaconBlockHeader, DepositData, Fork,
        },
        primitives::{DepositIndex, UnixSeconds, H256},
    },
    preset::Preset,
    traits::BeaconState as _,
};

pub mod interop;

pub struct Incremental<'config, P: Preset> {
    config: &'config Config,
    oracle: &'config dyn SignatureOracle,
    beacon_state: BeaconState<P>,
    deposit_tree: DepositTree,
}

impl<'config, P: Preset> Incremental<'config, P> {
    #[must_use]
    pub fn new(config: &'config Config, oracle: &'config dyn SignatureOracle) -> Self {
        let slot = GENESIS_SLOT;
        let phase = config.phase_at_slot::<P>(slot);
        let version = config.version_at_epoch(GENESIS_EPOCH);

        let fork = Fork {
            previous_version: version,
            current_version: version,
            epoch: GENESIS_EPOCH,
        };

        let body_root = match phase {
            Phase::Phase0 => Phase0BeaconBlockBody::<P>::default().hash_tree_root(),
            Phase::Altair => AltairBeaconBlockBody::<P>::default().hash_tree_root(),
        };

        let latest_block_header = BeaconBlockHeader {
            slot,
            body_root,
            ..BeaconBlockHeader::default()
        };

        let beacon_state = match phase {
            Phase::Phase0 => Phase0BeaconState {
                slot,
                fork,
                latest_block_header,
                ..Phase0BeaconState::default()
            }
            .into(),
            Phase::Altair => AltairBeaconState {
                slot,
                fork,
                latest_block_header,
                ..AltairBeaconState::default()
            }
            .into(),
        };

        Self {
            config,
            oracle,
            beacon_state,
            deposit_tree: DepositTree::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_genesis_state(self.config, &self.beacon_state)
    }

    pub fn set_eth1_timestamp(&mut self, eth1_timestamp: UnixSeconds) {
        *self.beacon_state.genesis_time_mut() = eth1_timestamp + self.config.genesis_delay;
    }

    pub fn add_deposit_data(
        &mut self,
        data: DepositData,
        deposit_index: DepositIndex,
    ) -> Result<()> {
        let eth1_data = self.beacon_state.eth1_data_mut();

        eth1_data.deposit_root = self
            .deposit_tree
            .push_and_compute_root(deposit_index, data)?;

        eth1_data.deposit_count = self.deposit_tree.deposit_count;

        combined::process_deposit_data(self.config, self.oracle, &mut self.beacon_state, data)?;

        // Top-ups do not create validators but may bring an existing one to the maximum balance.
        let Some(validator_index) = accessors::index_of_public_key(&self.beacon_state, data.pubkey)
        else {
            return Ok(());
        };

        let balance = *self.beacon_state.balances().get(validator_index)?;

        let validator = self
            .beacon_state
            .validators_mut()
            .get_mut(validator_index)?;

        validator.effective_balance = balance
            .prev_multiple_of(P::EFFECTIVE_BALANCE_INCREMENT)
            .min(P::MAX_EFFECTIVE_BALANCE);

        if validator.effective_balance == P::MAX_EFFECTIVE_BALANCE {
            validator.activation_eligibility_epoch = GENESIS_EPOCH;
            validator.activation_epoch = GENESIS_EPOCH;
        }

        Ok(())
    }

    pub fn finish(self, eth1_block_hash: H256) -> Result<(BeaconState<P>, DepositTree)> {
        let Self {
            mut beacon_state,
            deposit_tree,
            ..
        } = self;

        beacon_state.eth1_data_mut().block_hash = eth1_block_hash;

        // > Seed RANDAO with Eth1 entropy
        *beacon_state.randao_mixes_mut() = PersistentVector::repeat_element(eth1_block_hash);

        // > Set genesis validators root for domain separation and chain versioning
        *beacon_state.genesis_validators_root_mut() = beacon_state.validators().hash_tree_root();

        // Activations above may have invalidated caches filled while deposits were processed.
        *beacon_state.cache_mut() = Cache::default();

        // > Fill in sync committees
        // > Note: A duplicate committee is assigned for the current and next committee at genesis
        if let Some(state) = beacon_state.altair_mut() {
            let sync_committee = accessors::get_next_sync_committee(state)?;
            state.current_sync_committee = sync_committee.clone_arc();
            state.next_sync_committee = sync_committee;
        }

        Ok((beacon_state, deposit_tree))
    }
}

#[derive(Debug, Error)]
pub enum GenesisTriggerError {
    #[error("too early ({actual_genesis_time} < {minimum_genesis_time})")]
    TooEarly {
        minimum_genesis_time: UnixSeconds,
        actual_genesis_time: UnixSeconds,
    },
    #[error("not enough active validators ({actual_validator_count} < {minimum_validator_count})")]
    NotEnoughActiveValidators {
        minimum_validator_count: NonZeroU64,
        actual_validator_count: u64,
    },
}

/// The block every node derives independently from the genesis state.
///
/// `body.eth1_data` is deliberately left empty.
#[must_use]
pub fn beacon_block<P: Preset>(genesis_state: &BeaconState<P>) -> SignedBeaconBlock<P> {
    let block = match genesis_state.phase() {
        Phase::Phase0 => BeaconBlock::from(Phase0BeaconBlock::default()),
        Phase::Altair => BeaconBlock::from(AltairBeaconBlock::default()),
    };

    block
        .with_state_root(genesis_state.hash_tree_root())
        .with_signature(SignatureBytes::default())
}

pub fn validate_genesis_state<P: Preset>(config: &Config, state: &BeaconState<P>) -> Result<()> {
    let minimum_genesis_time = config.min_genesis_time;
    let actual_genesis_time = state.genesis_time();

    ensure!(
        minimum_genesis_time <= actual_genesis_time,
        GenesisTriggerError::TooEarly {
            minimum_genesis_time,
            actual_genesis_time,
        },
    );

    let minimum_validator_count = config.min_genesis_active_validator_count;
    // Cached accessors are not used because candidate genesis states are still being mutated.
    let actual_validator_count =
        accessors::get_active_validator_indices(state, RelativeEpoch::Current)
            .count()
            .try_into()?;

    ensure!(
        minimum_validator_count.get() <= actual_validator_count,
        GenesisTriggerError::NotEnoughActiveValidators {
            minimum_validator_count,
            actual_validator_count,
        },
    );

    Ok(())
}
