use anyhow::{bail, ensure, Result};
use bls::SignatureOracle;
use helper_functions::{
    error::{Error as HelperError, SignatureKind},
    fork,
    verifier::{MultiVerifier, NullVerifier, SingleVerifier, Verifier},
};
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    config::Config,
    nonstandard::Phase,
    phase0::{
        containers::DepositData,
        primitives::{Slot, ValidatorIndex},
    },
    preset::Preset,
    traits::{BeaconState as _, SignedBeaconBlock as _},
};

use crate::{
    altair, phase0,
    unphased::{self, Error, ProcessSlots, ProposerPolicy, StateRootPolicy},
};

/// Checks performed by [`process_block`] and [`state_transition`].
///
/// Blocks loaded from storage or replayed during regeneration were fully checked on import,
/// so they can be applied with [`BlockVerification::trusted`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BlockVerification {
    pub verify_state_root: bool,
    pub verify_proposer: bool,
    pub verify_signatures: bool,
}

impl Default for BlockVerification {
    fn default() -> Self {
        Self::full()
    }
}

impl BlockVerification {
    #[must_use]
    pub const fn full() -> Self {
        Self {
            verify_state_root: true,
            verify_proposer: true,
            verify_signatures: true,
        }
    }

    #[must_use]
    pub const fn trusted() -> Self {
        Self {
            verify_state_root: false,
            verify_proposer: false,
            verify_signatures: false,
        }
    }

    const fn proposer_policy(self) -> ProposerPolicy {
        if self.verify_proposer {
            ProposerPolicy::Verify
        } else {
            ProposerPolicy::Trust
        }
    }

    const fn state_root_policy(self) -> StateRootPolicy {
        if self.verify_state_root {
            StateRootPolicy::Verify
        } else {
            StateRootPolicy::Trust
        }
    }
}

/// Applies `signed_block` to a state already advanced to the block's slot.
///
/// `state` is left untouched if the block is invalid.
pub fn process_block<P: Preset>(
    config: &Config,
    oracle: &dyn SignatureOracle,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
    verification: BlockVerification,
) -> Result<()> {
    custom_state_transition(
        config,
        oracle,
        state,
        signed_block,
        ProcessSlots::Never,
        verification,
    )
}

/// Advances `state` to the slot of `signed_block` if needed and applies the block.
///
/// `state` is left untouched if any part of the transition fails.
pub fn state_transition<P: Preset>(
    config: &Config,
    oracle: &dyn SignatureOracle,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
    verification: BlockVerification,
) -> Result<()> {
    custom_state_transition(
        config,
        oracle,
        state,
        signed_block,
        ProcessSlots::IfNeeded,
        verification,
    )
}

fn custom_state_transition<P: Preset>(
    config: &Config,
    oracle: &dyn SignatureOracle,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
    process_slots: ProcessSlots,
    verification: BlockVerification,
) -> Result<()> {
    let mut post_state = state.clone();

    if verification.verify_signatures {
        let batch_result = apply_block(
            config,
            oracle,
            &mut post_state,
            signed_block,
            process_slots,
            verification,
            MultiVerifier::new(oracle),
        );

        if let Err(error) = batch_result {
            if !is_batch_signature_failure(&error) {
                return Err(error);
            }

            // The batch only reports that some signature is invalid.
            // Verify them one by one to find out which.
            post_state = state.clone();

            apply_block(
                config,
                oracle,
                &mut post_state,
                signed_block,
                process_slots,
                verification,
                SingleVerifier::new(oracle),
            )?;

            return Err(error);
        }
    } else {
        apply_block(
            config,
            oracle,
            &mut post_state,
            signed_block,
            process_slots,
            verification,
            NullVerifier,
        )?;
    }

    *state = post_state;

    Ok(())
}

fn apply_block<P: Preset>(
    config: &Config,
    oracle: &dyn SignatureOracle,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
    process_slots: ProcessSlots,
    verification: BlockVerification,
    verifier: impl Verifier,
) -> Result<()> {
    // > Process slots (including those with no blocks) since block
    if process_slots.should_process(state, signed_block.message()) {
        self::process_slots(config, state, signed_block.slot())?;
    }

    let proposer_policy = verification.proposer_policy();
    let state_root_policy = verification.state_root_policy();

    match (state, signed_block) {
        (BeaconState::Phase0(state), SignedBeaconBlock::Phase0(block)) => {
            phase0::state_transition(
                config,
                oracle,
                state,
                block,
                ProcessSlots::Never,
                proposer_policy,
                state_root_policy,
                verifier,
            )
        }
        (BeaconState::Altair(state), SignedBeaconBlock::Altair(block)) => {
            altair::state_transition(
                config,
                oracle,
                state,
                block,
                ProcessSlots::Never,
                proposer_policy,
                state_root_policy,
                verifier,
            )
        }
        (state, block) => bail!(Error::PhaseMismatch {
            state_phase: state.phase(),
            block_phase: block.phase(),
        }),
    }
}

fn is_batch_signature_failure(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref(),
        Some(HelperError::SignatureInvalid(SignatureKind::Multi)),
    )
}

/// Advances `state` to `slot`, running epoch processing and fork upgrades on the way.
///
/// Advancing to the current slot is a no-op.
pub fn process_slots<P: Preset>(
    config: &Config,
    state: &mut BeaconState<P>,
    slot: Slot,
) -> Result<()> {
    ensure!(
        state.slot() <= slot,
        Error::SlotInPast {
            current: state.slot(),
            target: slot,
        },
    );

    let final_phase = config.phase_at_slot::<P>(slot);

    while state.slot() < slot || state.phase() < final_phase {
        match state {
            BeaconState::Phase0(phase0_state) => {
                let last_slot_in_phase = config
                    .fork_slot::<P>(Phase::Altair)
                    .map_or(slot, |fork_slot| fork_slot.min(slot));

                if phase0_state.slot < last_slot_in_phase {
                    phase0::process_slots(config, phase0_state, last_slot_in_phase)?;
                }

                if config.fork_slot::<P>(Phase::Altair) == Some(last_slot_in_phase) {
                    *state = fork::upgrade_to_altair(config, phase0_state.clone())?.into();
                }
            }
            BeaconState::Altair(altair_state) => {
                altair::process_slots(config, altair_state, slot)?;
            }
        }
    }

    Ok(())
}

pub fn process_epoch<P: Preset>(config: &Config, state: &mut BeaconState<P>) -> Result<()> {
    match state {
        BeaconState::Phase0(state) => phase0::process_epoch(config, state),
        BeaconState::Altair(state) => altair::process_epoch(config, state),
    }
}

/// Adds a validator or tops up an existing one without checking a Merkle proof.
///
/// Used to build genesis states, where deposits come from a trusted source.
pub fn process_deposit_data<P: Preset>(
    config: &Config,
    oracle: &dyn SignatureOracle,
    state: &mut BeaconState<P>,
    deposit_data: DepositData,
) -> Result<Option<ValidatorIndex>> {
    match state {
        BeaconState::Phase0(state) => unphased::apply_deposit(config, oracle, state, deposit_data),
        BeaconState::Altair(state) => {
            altair::process_deposit_data(config, oracle, state, deposit_data)
        }
    }
}

#[cfg(test)]
mod tests {
    use bls::InsecureOracle;
    use helper_functions::{accessors::get_beacon_proposer_index, misc};
    use quickcheck_macros::quickcheck;
    use ssz::{ContiguousList, SszHash as _};
    use types::{
        phase0::{
            beacon_state::BeaconState as Phase0BeaconState,
            consts::FAR_FUTURE_EPOCH,
            containers::{
                BeaconBlock as Phase0BeaconBlock, BeaconBlockBody, BeaconBlockHeader,
                ProposerSlashing, SignedBeaconBlock as Phase0SignedBeaconBlock,
                SignedBeaconBlockHeader, SignedVoluntaryExit, Validator, VoluntaryExit,
            },
            primitives::H256,
        },
        preset::Minimal,
    };

    use crate::unphased::{
        BlockHeaderInvalidReason, ProposerSlashingInvalidReason, VoluntaryExitInvalidReason,
    };

    use super::*;

    // Signatures are not checked so that blocks can be modified after construction.
    const UNSIGNED: BlockVerification = BlockVerification {
        verify_state_root: false,
        verify_proposer: true,
        verify_signatures: false,
    };

    fn state_with_validators(count: u64) -> Result<BeaconState<Minimal>> {
        let mut state = Phase0BeaconState::<Minimal>::default();

        for index in 0..count {
            state.validators.push(Validator {
                pubkey: bls::SecretKey::interop(index).to_public_key(),
                effective_balance: 32_000_000_000,
                exit_epoch: FAR_FUTURE_EPOCH,
                withdrawable_epoch: FAR_FUTURE_EPOCH,
                ..Validator::default()
            })?;
            state.balances.push(32_000_000_000)?;
        }

        Ok(state.into())
    }

    fn empty_block_at(
        state: &BeaconState<Minimal>,
        slot: Slot,
    ) -> Result<SignedBeaconBlock<Minimal>> {
        phase0_block_at(state, slot).map(Into::into)
    }

    fn phase0_block_at(
        state: &BeaconState<Minimal>,
        slot: Slot,
    ) -> Result<Phase0SignedBeaconBlock<Minimal>> {
        let config = Config::minimal();
        let mut advanced = state.clone();

        process_slots(&config, &mut advanced, slot)?;

        let mut header = advanced.latest_block_header();

        if header.state_root.is_zero() {
            header.state_root = advanced.hash_tree_root();
        }

        let block = Phase0BeaconBlock {
            slot,
            proposer_index: get_beacon_proposer_index(&advanced)?,
            parent_root: header.hash_tree_root(),
            body: BeaconBlockBody {
                eth1_data: advanced.eth1_data(),
                ..BeaconBlockBody::default()
            },
            ..Phase0BeaconBlock::default()
        };

        Ok(Phase0SignedBeaconBlock {
            message: block,
            signature: bls::SignatureBytes::default(),
        })
    }

    // Applies `block` and checks that it is rejected without modifying the state.
    fn rejection(
        state: &mut BeaconState<Minimal>,
        block: Phase0SignedBeaconBlock<Minimal>,
        verification: BlockVerification,
    ) -> anyhow::Error {
        let root_before = state.hash_tree_root();

        let error = state_transition(
            &Config::minimal(),
            &InsecureOracle,
            state,
            &block.into(),
            verification,
        )
        .expect_err("block should be rejected");

        assert_eq!(state.hash_tree_root(), root_before);

        error
    }

    #[test]
    fn process_slots_to_current_slot_is_no_op() -> Result<()> {
        let config = Config::minimal();
        let mut state = state_with_validators(16)?;
        let root_before = state.hash_tree_root();

        process_slots(&config, &mut state, 0)?;

        assert_eq!(state.hash_tree_root(), root_before);

        Ok(())
    }

    #[test]
    fn process_slots_rejects_earlier_slot() -> Result<()> {
        let config = Config::minimal();
        let mut state = state_with_validators(16)?;

        process_slots(&config, &mut state, 5)?;

        let error = process_slots(&config, &mut state, 4).expect_err("slot 4 is before slot 5");

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::SlotInPast {
                current: 5,
                target: 4,
            }),
        ));
        assert_eq!(state.slot(), 5);

        Ok(())
    }

    #[test]
    fn process_slots_upgrades_state_at_altair_fork() -> Result<()> {
        let mut config = Config::minimal();
        config.altair_fork_epoch = 1;

        let mut state = state_with_validators(16)?;
        let fork_slot = misc::compute_start_slot_at_epoch::<Minimal>(1);

        process_slots(&config, &mut state, fork_slot - 1)?;
        assert_eq!(state.phase(), Phase::Phase0);

        process_slots(&config, &mut state, fork_slot + 1)?;
        assert_eq!(state.phase(), Phase::Altair);
        assert_eq!(state.slot(), fork_slot + 1);
        assert_eq!(state.fork().current_version, config.altair_fork_version);

        Ok(())
    }

    #[quickcheck]
    fn slot_never_decreases(steps: Vec<u8>) -> bool {
        let config = Config::minimal();
        let mut state = state_with_validators(16).expect("validators fit in registry");

        steps.into_iter().take(8).all(|step| {
            let before = state.slot();
            let target = before + u64::from(step % 12);

            process_slots(&config, &mut state, target).is_ok() && state.slot() >= before
        })
    }

    #[test]
    fn processing_same_block_twice_produces_same_root() -> Result<()> {
        let config = Config::minimal();
        let state = state_with_validators(16)?;
        let block = empty_block_at(&state, 3)?;

        let mut first = state.clone();
        let mut second = state;

        state_transition(
            &config,
            &InsecureOracle,
            &mut first,
            &block,
            BlockVerification::trusted(),
        )?;

        state_transition(
            &config,
            &InsecureOracle,
            &mut second,
            &block,
            BlockVerification::trusted(),
        )?;

        assert_eq!(first.hash_tree_root(), second.hash_tree_root());
        assert_eq!(first.slot(), 3);

        Ok(())
    }

    #[test]
    fn block_for_wrong_slot_leaves_state_untouched() -> Result<()> {
        let config = Config::minimal();
        let mut state = state_with_validators(16)?;
        let block = empty_block_at(&state, 3)?;
        let root_before = state.hash_tree_root();

        process_block(
            &config,
            &InsecureOracle,
            &mut state,
            &block,
            BlockVerification::trusted(),
        )
        .expect_err("state has not been advanced to slot 3");

        assert_eq!(state.hash_tree_root(), root_before);

        Ok(())
    }

    #[test]
    fn block_with_wrong_state_root_is_rejected() -> Result<()> {
        let mut state = state_with_validators(16)?;
        let mut block = phase0_block_at(&state, 3)?;

        block.message.state_root = H256::repeat_byte(0x5e);

        let verification = BlockVerification {
            verify_state_root: true,
            ..UNSIGNED
        };

        let error = rejection(&mut state, block, verification);

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::StateRootMismatch { in_block, .. })
                if *in_block == H256::repeat_byte(0x5e),
        ));

        Ok(())
    }

    #[test]
    fn block_from_wrong_proposer_is_rejected() -> Result<()> {
        let mut state = state_with_validators(16)?;
        let mut block = phase0_block_at(&state, 3)?;
        let expected_proposer = block.message.proposer_index;

        block.message.proposer_index = (expected_proposer + 1) % 16;

        let error = rejection(&mut state, block, UNSIGNED);

        assert!(matches!(error.downcast_ref(), Some(Error::InvalidBlockHeader)));
        assert!(matches!(
            error.downcast_ref(),
            Some(BlockHeaderInvalidReason::ProposerIndexMismatch { computed, .. })
                if *computed == expected_proposer,
        ));

        Ok(())
    }

    #[test]
    fn proposer_slashing_with_identical_headers_is_rejected() -> Result<()> {
        let mut state = state_with_validators(16)?;
        let mut block = phase0_block_at(&state, 3)?;

        let signed_header = SignedBeaconBlockHeader {
            message: BeaconBlockHeader {
                slot: 1,
                proposer_index: 2,
                ..BeaconBlockHeader::default()
            },
            ..SignedBeaconBlockHeader::default()
        };

        block.message.body.proposer_slashings = ContiguousList::try_from(vec![ProposerSlashing {
            signed_header_1: signed_header,
            signed_header_2: signed_header,
        }])?;

        let error = rejection(&mut state, block, UNSIGNED);

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::InvalidProposerSlashing { index: 0 }),
        ));
        assert!(matches!(
            error.downcast_ref(),
            Some(ProposerSlashingInvalidReason::HeadersIdentical { .. }),
        ));

        Ok(())
    }

    #[test]
    fn exit_of_recently_activated_validator_is_rejected() -> Result<()> {
        let mut state = state_with_validators(16)?;
        let mut block = phase0_block_at(&state, 3)?;

        block.message.body.voluntary_exits = ContiguousList::try_from(vec![SignedVoluntaryExit {
            message: VoluntaryExit {
                epoch: 0,
                validator_index: 3,
            },
            ..SignedVoluntaryExit::default()
        }])?;

        let error = rejection(&mut state, block, UNSIGNED);

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::InvalidVoluntaryExit { index: 0 }),
        ));
        assert!(matches!(
            error.downcast_ref(),
            Some(VoluntaryExitInvalidReason::NotActiveLongEnough { index: 3, .. }),
        ));
        assert_eq!(state.validators().get(3)?.exit_epoch, FAR_FUTURE_EPOCH);

        Ok(())
    }

    #[test]
    fn unsigned_block_fails_signature_verification() -> Result<()> {
        let config = Config::minimal();
        let mut state = state_with_validators(16)?;
        let block = empty_block_at(&state, 3)?;
        let root_before = state.hash_tree_root();

        let verification = BlockVerification {
            verify_state_root: false,
            ..BlockVerification::full()
        };

        let error = state_transition(&config, &InsecureOracle, &mut state, &block, verification)
            .expect_err("block is not signed");

        assert!(matches!(error.downcast_ref(), Some(Error::InvalidBlockHeader)));
        assert_eq!(state.hash_tree_root(), root_before);

        Ok(())
    }

    #[test]
    fn block_phase_must_match_state_phase() -> Result<()> {
        let config = Config::minimal().start_and_stay_in(Phase::Altair);
        let mut state = state_with_validators(16)?;
        let block = empty_block_at(&state, 3)?;

        // Advancing moves the state into Altair because the fork is at genesis.
        let error = state_transition(
            &config,
            &InsecureOracle,
            &mut state,
            &block,
            BlockVerification::trusted(),
        )
        .expect_err("block is from Phase 0");

        assert!(matches!(
            error.downcast_ref(),
            Some(Error::PhaseMismatch {
                state_phase: Phase::Altair,
                block_phase: Phase::Phase0,
            }),
        ));

        Ok(())
    }
}
