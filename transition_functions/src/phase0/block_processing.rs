use anyhow::{Context as _, Result};
use bls::SignatureOracle;
use helper_functions::{accessors::get_beacon_proposer_index, verifier::Verifier};
use types::{
    config::Config,
    nonstandard::AttestationEpoch,
    phase0::{
        beacon_state::BeaconState,
        containers::{
            Attestation, BeaconBlock as Phase0BeaconBlock, BeaconBlockBody, PendingAttestation,
        },
    },
    preset::Preset,
    traits::BeaconBlock,
};

use crate::unphased::{self, Error, ProposerPolicy};

/// Processes everything in `block` except its own signature and the state root.
///
/// Signatures inside the block are passed to `verifier`. [`Verifier::finish`] is called at the end,
/// so a batching verifier reports invalid signatures here.
pub fn process_block<P: Preset>(
    config: &Config,
    oracle: &dyn SignatureOracle,
    state: &mut BeaconState<P>,
    block: &Phase0BeaconBlock<P>,
    proposer_policy: ProposerPolicy,
    mut verifier: impl Verifier,
) -> Result<()> {
    unphased::process_block_header(state, block, proposer_policy)
        .context(Error::InvalidBlockHeader)?;

    unphased::process_randao(config, state, &block.body, &mut verifier)
        .context(Error::InvalidBlockHeader)?;

    unphased::process_eth1_data(state, &block.body)?;

    process_operations(config, oracle, state, &block.body, &mut verifier)?;

    verifier.finish()
}

/// Block signature, RANDAO reveal and one signature per operation.
/// Attester slashings contain two aggregate signatures each.
pub fn count_required_signatures<P: Preset>(block: &impl BeaconBlock<P>) -> usize {
    let body = block.body();

    2 + 2 * body.proposer_slashings().len()
        + 2 * body.attester_slashings().len()
        + body.attestations().len()
        + body.voluntary_exits().len()
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
        process_attestation(config, state, attestation, &mut verifier)
            .context(Error::InvalidAttestation { index })?;
    }

    for (deposit, index) in body.deposits.iter().zip(0..) {
        unphased::process_deposit(config, oracle, state, deposit)
            .context(Error::InvalidDeposit { index })?;
    }

    for (voluntary_exit, index) in body.voluntary_exits.iter().copied().zip(0..) {
        unphased::process_voluntary_exit(config, state, voluntary_exit, &mut verifier)
            .context(Error::InvalidVoluntaryExit { index })?;
    }

    Ok(())
}

pub fn process_attestation<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    attestation: &Attestation<P>,
    verifier: impl Verifier,
) -> Result<()> {
    let attestation_epoch =
        unphased::validate_attestation_with_verifier(config, state, attestation, verifier)?;

    let pending_attestation = PendingAttestation {
        aggregation_bits: attestation.aggregation_bits.clone(),
        data: attestation.data,
        inclusion_delay: state.slot - attestation.data.slot,
        proposer_index: get_beacon_proposer_index(state)?,
    };

    let attestations = match attestation_epoch {
        AttestationEpoch::Previous => &mut state.previous_epoch_attestations,
        AttestationEpoch::Current => &mut state.current_epoch_attestations,
    };

    attestations.push(pending_attestation)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use helper_functions::{accessors::beacon_committee, verifier::NullVerifier};
    use ssz::BitList;
    use types::{
        phase0::{
            consts::FAR_FUTURE_EPOCH,
            containers::{AttestationData, Checkpoint, Validator},
            primitives::H256,
        },
        preset::Minimal,
    };

    use super::*;

    fn state_with_active_validators(slot: u64, count: u64) -> Result<BeaconState<Minimal>> {
        let mut state = BeaconState::<Minimal> {
            slot,
            ..BeaconState::default()
        };

        for index in 0..count {
            let validator = Validator {
                pubkey: bls::SecretKey::interop(index).to_public_key(),
                effective_balance: 32_000_000_000,
                exit_epoch: FAR_FUTURE_EPOCH,
                withdrawable_epoch: FAR_FUTURE_EPOCH,
                ..Validator::default()
            };

            state.validators.push(validator)?;
            state.balances.push(32_000_000_000)?;
        }

        Ok(state)
    }

    #[test]
    fn attestation_is_recorded_with_inclusion_delay() -> Result<()> {
        let config = Config::minimal();
        let mut state = state_with_active_validators(10, 64)?;

        let committee_length = beacon_committee(&state, 8, 0)?.len();
        let mut aggregation_bits = BitList::with_length(committee_length)?;

        aggregation_bits.set(0, true);

        let attestation = Attestation {
            aggregation_bits,
            data: AttestationData {
                slot: 8,
                index: 0,
                beacon_block_root: H256::repeat_byte(1),
                source: Checkpoint::default(),
                target: Checkpoint {
                    epoch: 1,
                    root: H256::repeat_byte(1),
                },
            },
            ..Attestation::default()
        };

        process_attestation(&config, &mut state, &attestation, NullVerifier)?;

        let pending = state.current_epoch_attestations.get(0)?;

        assert_eq!(pending.inclusion_delay, 2);
        assert_eq!(pending.proposer_index, get_beacon_proposer_index(&state)?);
        assert!(state.previous_epoch_attestations.is_empty());

        Ok(())
    }

    #[test]
    fn attestation_with_wrong_source_is_rejected() -> Result<()> {
        let config = Config::minimal();
        let mut state = state_with_active_validators(10, 64)?;

        let committee_length = beacon_committee(&state, 8, 0)?.len();

        let attestation = Attestation {
            aggregation_bits: BitList::with_length(committee_length)?,
            data: AttestationData {
                slot: 8,
                source: Checkpoint {
                    epoch: 0,
                    root: H256::repeat_byte(9),
                },
                target: Checkpoint {
                    epoch: 1,
                    root: H256::zero(),
                },
                ..AttestationData::default()
            },
            ..Attestation::default()
        };

        let error = process_attestation(&config, &mut state, &attestation, NullVerifier)
            .expect_err("source does not match current justified checkpoint");

        assert!(matches!(
            error.downcast_ref(),
            Some(unphased::AttestationInvalidReason::SourceMismatch { .. }),
        ));

        assert!(state.current_epoch_attestations.is_empty());

        Ok(())
    }
}
