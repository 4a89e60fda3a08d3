//! Deterministic genesis for tests and local chains.
//!
//! Every validator deposits the maximum effective balance with a key derived from its index,
//! so the resulting state depends only on the configuration and the validator count.

use core::num::NonZeroU64;

use anyhow::Result;
use bls::{SecretKey, SignatureOracle};
use deposit_tree::DepositTree;
use helper_functions::{misc, signing::SignForAllForks as _};
use types::{
    combined::BeaconState,
    config::Config,
    phase0::{
        containers::{DepositData, DepositMessage},
        primitives::{UnixSeconds, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::BeaconState as _,
};

use crate::Incremental;

const QUICK_START_ETH1_BLOCK_HASH: H256 = H256([0x42; 32]);

// Replaced by the genesis time passed to `quick_start_beacon_state`.
const QUICK_START_ETH1_BLOCK_TIMESTAMP: UnixSeconds = 1 << 40;

pub fn quick_start_beacon_state<P: Preset>(
    config: &Config,
    oracle: &dyn SignatureOracle,
    genesis_time: UnixSeconds,
    validator_count: NonZeroU64,
) -> Result<(BeaconState<P>, DepositTree)> {
    let mut incremental = Incremental::new(config, oracle);

    incremental.set_eth1_timestamp(QUICK_START_ETH1_BLOCK_TIMESTAMP);

    for index in 0..validator_count.get() {
        let deposit_data = quick_start_deposit_data::<P>(config, secret_key(index));
        incremental.add_deposit_data(deposit_data, index)?;
    }

    // Coordinated starts are valid by definition, so `validate_genesis_state` is not called.
    let (mut genesis_state, deposit_tree) = incremental.finish(QUICK_START_ETH1_BLOCK_HASH)?;

    *genesis_state.genesis_time_mut() = genesis_time;

    Ok((genesis_state, deposit_tree))
}

#[must_use]
pub fn secret_key(validator_index: ValidatorIndex) -> SecretKey {
    SecretKey::interop(validator_index)
}

#[must_use]
pub fn quick_start_deposit_data<P: Preset>(config: &Config, secret_key: SecretKey) -> DepositData {
    let pubkey = secret_key.to_public_key();
    let withdrawal_credentials = misc::bls_withdrawal_credentials(pubkey);
    let amount = P::MAX_EFFECTIVE_BALANCE;

    let deposit_message = DepositMessage {
        pubkey,
        withdrawal_credentials,
        amount,
    };

    DepositData {
        pubkey,
        withdrawal_credentials,
        amount,
        signature: deposit_message.sign(config, secret_key),
    }
}

#[cfg(test)]
mod tests {
    use bls::InsecureOracle;
    use helper_functions::accessors;
    use nonzero_ext::nonzero;
    use ssz::SszHash as _;
    use types::{
        nonstandard::{Phase, RelativeEpoch},
        preset::Minimal,
    };

    use super::*;

    #[test]
    fn quick_start_activates_every_validator() -> Result<()> {
        let config = Config::minimal();

        let (state, deposit_tree) = quick_start_beacon_state::<Minimal>(
            &config,
            &InsecureOracle,
            0,
            nonzero!(64_u64),
        )?;

        assert_eq!(state.slot(), 0);
        assert_eq!(state.genesis_time(), 0);
        assert_eq!(deposit_tree.deposit_count, 64);
        assert_eq!(state.eth1_data().deposit_root, deposit_tree.root());
        assert_eq!(
            accessors::get_active_validator_indices(&state, RelativeEpoch::Current).count(),
            64,
        );

        Ok(())
    }

    #[test]
    fn quick_start_is_deterministic() -> Result<()> {
        let config = Config::minimal();
        let count = nonzero!(16_u64);

        let (first, _) = quick_start_beacon_state::<Minimal>(&config, &InsecureOracle, 5, count)?;
        let (second, _) = quick_start_beacon_state::<Minimal>(&config, &InsecureOracle, 5, count)?;

        assert_eq!(first.hash_tree_root(), second.hash_tree_root());

        Ok(())
    }

    #[test]
    fn quick_start_in_altair_fills_sync_committees() -> Result<()> {
        let config = Config::minimal().start_and_stay_in(Phase::Altair);

        let (state, _) =
            quick_start_beacon_state::<Minimal>(&config, &InsecureOracle, 0, nonzero!(32_u64))?;

        let state = state.altair().expect("Altair is scheduled at genesis");

        assert_eq!(state.current_sync_committee, state.next_sync_committee);
        assert!(state
            .current_sync_committee
            .pubkeys
            .iter()
            .all(|public_key| accessors::index_of_public_key(state, *public_key).is_some()));

        Ok(())
    }
}
