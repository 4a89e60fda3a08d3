use anyhow::{ensure, Context as _, Result};
use arithmetic::U64Ext as _;
use bls::SignatureOracle;
use helper_functions::{
    accessors::{
        attestation_epoch, get_beacon_proposer_index, get_current_epoch, get_indexed_attestation,
        get_randao_mix, index_of_public_key, public_key, slashable_indices,
    },
    error::SignatureKind,
    misc::compute_epoch_at_slot,
    mutators::{balance, increase_balance, initiate_validator_exit, slash_validator},
    predicates::{
        is_active_validator, is_slashable_attestation_data, is_slashable_validator,
        is_valid_merkle_branch, validate_constructed_indexed_attestation,
        validate_received_indexed_attestation,
    },
    signing::{RandaoEpoch, SignForAllForks as _, SignForSingleFork as _},
    verifier::{SingleVerifier, Verifier},
};
use itertools::Itertools as _;
use ssz::SszHash as _;
use typenum::Unsigned as _;
use types::{
    config::Config,
    nonstandard::AttestationEpoch,
    phase0::{
        consts::FAR_FUTURE_EPOCH,
        containers::{
            Attestation, AttestationData, AttesterSlashing, BeaconBlockHeader, Deposit,
            DepositData, DepositMessage, ProposerSlashing, SignedVoluntaryExit, Validator,
        },
        primitives::{DepositIndex, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::{BeaconBlock, BeaconBlockBody, BeaconState},
};

use crate::unphased::{
    AttestationInvalidReason, AttesterSlashingInvalidReason, BlockHeaderInvalidReason,
    DepositInvalidReason, ProposerSlashingInvalidReason, VoluntaryExitInvalidReason,
};

/// Whether `process_block_header` should check the proposer index in the block.
///
/// Blocks replayed from storage were checked when they were first imported.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProposerPolicy {
    Verify,
    Trust,
}

pub fn process_block_header<P: Preset>(
    state: &mut (impl BeaconState<P> + ?Sized),
    block: &(impl BeaconBlock<P> + ?Sized),
    proposer_policy: ProposerPolicy,
) -> Result<()> {
    // > Verify that the slots match
    ensure!(
        block.slot() == state.slot(),
        BlockHeaderInvalidReason::SlotMismatch {
            state_slot: state.slot(),
            block_slot: block.slot(),
        },
    );

    // > Verify that the block is newer than latest block header
    ensure!(
        block.slot() > state.latest_block_header().slot,
        BlockHeaderInvalidReason::NotNewerThanLatestHeader {
            block_slot: block.slot(),
            block_header_slot: state.latest_block_header().slot,
        },
    );

    // > Verify that proposer index is the correct index
    if proposer_policy == ProposerPolicy::Verify {
        let computed = get_beacon_proposer_index(state)?;
        let in_block = block.proposer_index();

        ensure!(
            computed == in_block,
            BlockHeaderInvalidReason::ProposerIndexMismatch { computed, in_block },
        );
    }

    // > Verify that the parent matches
    let computed = state.latest_block_header().hash_tree_root();
    let in_block = block.parent_root();

    ensure!(
        computed == in_block,
        BlockHeaderInvalidReason::ParentRootMismatch { computed, in_block },
    );

    // > Cache current block as the new latest block
    *state.latest_block_header_mut() = BeaconBlockHeader {
        slot: block.slot(),
        proposer_index: block.proposer_index(),
        parent_root: block.parent_root(),
        // > Overwritten in the next process_slot call
        state_root: H256::zero(),
        body_root: block.body_root(),
    };

    // > Verify proposer is not slashed
    let index = block.proposer_index();
    let proposer = state.validators().get(index)?;

    ensure!(
        !proposer.slashed,
        BlockHeaderInvalidReason::ProposerSlashed { index },
    );

    Ok(())
}

pub fn process_randao<P: Preset>(
    config: &Config,
    state: &mut (impl BeaconState<P> + ?Sized),
    body: &(impl BeaconBlockBody<P> + ?Sized),
    mut verifier: impl Verifier,
) -> Result<()> {
    let epoch = get_current_epoch(state);
    let randao_reveal = body.randao_reveal();

    // > Verify RANDAO reveal
    let proposer_index = state.latest_block_header().proposer_index;
    let public_key = *public_key(state, proposer_index)?;

    verifier
        .verify_singular(
            RandaoEpoch::from(epoch).signing_root(config, state),
            randao_reveal,
            public_key,
            SignatureKind::Randao,
        )
        .context(BlockHeaderInvalidReason::RandaoRevealInvalid)?;

    // > Mix in RANDAO reveal
    let mix = get_randao_mix(state, epoch) ^ hashing::hash_bytes(randao_reveal);
    *state.randao_mixes_mut().mod_index_mut(epoch) = mix;

    Ok(())
}

pub fn process_eth1_data<P: Preset>(
    state: &mut (impl BeaconState<P> + ?Sized),
    body: &(impl BeaconBlockBody<P> + ?Sized),
) -> Result<()> {
    state.eth1_data_votes_mut().push(body.eth1_data())?;

    let vote_count = state
        .eth1_data_votes()
        .iter()
        .filter(|vote| **vote == body.eth1_data())
        .count();

    if vote_count * 2 > P::SlotsPerEth1VotingPeriod::USIZE {
        *state.eth1_data_mut() = body.eth1_data();
    }

    Ok(())
}

pub fn process_proposer_slashing<P: Preset>(
    config: &Config,
    state: &mut (impl BeaconState<P> + ?Sized),
    proposer_slashing: ProposerSlashing,
    verifier: impl Verifier,
) -> Result<()> {
    validate_proposer_slashing_with_verifier(config, state, proposer_slashing, verifier)?;

    let index = proposer_slashing.signed_header_1.message.proposer_index;

    slash_validator(config, state, index, None)
}

pub fn validate_proposer_slashing_with_verifier<P: Preset>(
    config: &Config,
    state: &(impl BeaconState<P> + ?Sized),
    proposer_slashing: ProposerSlashing,
    mut verifier: impl Verifier,
) -> Result<()> {
    let header_1 = proposer_slashing.signed_header_1.message;
    let header_2 = proposer_slashing.signed_header_2.message;

    // > Verify header slots match
    ensure!(
        header_1.slot == header_2.slot,
        ProposerSlashingInvalidReason::SlotMismatch {
            slot_1: header_1.slot,
            slot_2: header_2.slot,
        },
    );

    // > Verify header proposer indices match
    ensure!(
        header_1.proposer_index == header_2.proposer_index,
        ProposerSlashingInvalidReason::ProposerMismatch {
            proposer_index_1: header_1.proposer_index,
            proposer_index_2: header_2.proposer_index,
        },
    );

    // > Verify the headers are different
    ensure!(
        header_1 != header_2,
        ProposerSlashingInvalidReason::HeadersIdentical { header: header_1 },
    );

    // > Verify the proposer is slashable
    let index = header_1.proposer_index;
    let proposer = *state.validators().get(index)?;

    ensure!(
        is_slashable_validator(&proposer, get_current_epoch(state)),
        ProposerSlashingInvalidReason::ProposerNotSlashable { index, proposer },
    );

    // > Verify signatures
    for (signed_header, header_number) in [
        proposer_slashing.signed_header_1,
        proposer_slashing.signed_header_2,
    ]
    .into_iter()
    .zip(1..)
    {
        verifier
            .verify_singular(
                signed_header.message.signing_root(config, state),
                signed_header.signature,
                proposer.pubkey,
                SignatureKind::Block,
            )
            .context(ProposerSlashingInvalidReason::SignatureInvalid { header_number })?;
    }

    Ok(())
}

pub fn process_attester_slashing<P: Preset>(
    config: &Config,
    state: &mut (impl BeaconState<P> + ?Sized),
    attester_slashing: &AttesterSlashing<P>,
    verifier: impl Verifier,
) -> Result<()> {
    let slashable_indices =
        validate_attester_slashing_with_verifier(config, state, attester_slashing, verifier)?;

    for validator_index in slashable_indices {
        slash_validator(config, state, validator_index, None)?;
    }

    Ok(())
}

pub fn validate_attester_slashing_with_verifier<P: Preset>(
    config: &Config,
    state: &(impl BeaconState<P> + ?Sized),
    attester_slashing: &AttesterSlashing<P>,
    mut verifier: impl Verifier,
) -> Result<Vec<ValidatorIndex>> {
    let attestation_1 = &attester_slashing.attestation_1;
    let attestation_2 = &attester_slashing.attestation_2;

    ensure!(
        is_slashable_attestation_data(attestation_1.data, attestation_2.data),
        AttesterSlashingInvalidReason::DataNotSlashable,
    );

    validate_received_indexed_attestation(config, state, attestation_1, &mut verifier).context(
        AttesterSlashingInvalidReason::AttestationInvalid {
            attestation_number: 1,
        },
    )?;

    validate_received_indexed_attestation(config, state, attestation_2, &mut verifier).context(
        AttesterSlashingInvalidReason::AttestationInvalid {
            attestation_number: 2,
        },
    )?;

    let current_epoch = get_current_epoch(state);

    let slashable_indices = slashable_indices(attester_slashing)
        .map(|validator_index| {
            let validator = state.validators().get(validator_index)?;
            Ok((validator_index, is_slashable_validator(validator, current_epoch)))
        })
        .filter_ok(|(_, slashable)| *slashable)
        .map_ok(|(validator_index, _)| validator_index)
        .collect::<Result<Vec<_>>>()?;

    ensure!(
        !slashable_indices.is_empty(),
        AttesterSlashingInvalidReason::NoAttestersSlashed,
    );

    Ok(slashable_indices)
}

pub fn validate_attestation_with_verifier<P: Preset>(
    config: &Config,
    state: &(impl BeaconState<P> + ?Sized),
    attestation: &Attestation<P>,
    verifier: impl Verifier,
) -> Result<AttestationEpoch> {
    let AttestationData {
        slot: attestation_slot,
        source,
        target,
        ..
    } = attestation.data;

    let current_epoch = get_current_epoch(state);

    let attestation_epoch = attestation_epoch(state, target.epoch).context(
        AttestationInvalidReason::TargetEpochOutOfRange {
            target_epoch: target.epoch,
            current_epoch,
        },
    )?;

    ensure!(
        target.epoch == compute_epoch_at_slot::<P>(attestation_slot),
        AttestationInvalidReason::TargetsWrongEpoch {
            slot: attestation_slot,
            target_epoch: target.epoch,
        },
    );

    let low_slot = attestation_slot + P::MIN_ATTESTATION_INCLUSION_DELAY.get();
    let high_slot = attestation_slot + P::SlotsPerEpoch::U64;

    ensure!(
        (low_slot..=high_slot).contains(&state.slot()),
        AttestationInvalidReason::OutsideInclusionRange {
            state_slot: state.slot(),
            attestation_slot,
        },
    );

    let in_state = match attestation_epoch {
        AttestationEpoch::Previous => state.previous_justified_checkpoint(),
        AttestationEpoch::Current => state.current_justified_checkpoint(),
    };

    ensure!(
        in_state == source,
        AttestationInvalidReason::SourceMismatch {
            in_state,
            in_block: source,
        },
    );

    // `get_indexed_attestation` checks the committee index and the length of the bitlist.
    let indexed_attestation = get_indexed_attestation(state, attestation)
        .context(AttestationInvalidReason::CommitteeInvalid)?;

    // > Verify signature
    validate_constructed_indexed_attestation(config, state, &indexed_attestation, verifier)
        .context(AttestationInvalidReason::SignatureInvalid)?;

    Ok(attestation_epoch)
}

pub fn validate_deposit_count<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    body: &(impl BeaconBlockBody<P> + ?Sized),
) -> Result<()> {
    // > Verify that outstanding deposits are processed up to the maximum number of deposits
    let outstanding = state
        .eth1_data()
        .deposit_count
        .saturating_sub(state.eth1_deposit_index());

    let computed = P::MaxDeposits::U64.min(outstanding);
    let in_block = body.deposits().len().try_into()?;

    ensure!(
        computed == in_block,
        DepositInvalidReason::CountMismatch { computed, in_block },
    );

    Ok(())
}

/// Returns the index of the new validator if the deposit added one.
pub fn process_deposit<P: Preset>(
    config: &Config,
    oracle: &dyn SignatureOracle,
    state: &mut (impl BeaconState<P> + ?Sized),
    deposit: &Deposit,
) -> Result<Option<ValidatorIndex>> {
    // > Verify the Merkle branch
    verify_deposit_merkle_branch(state, state.eth1_deposit_index(), deposit)?;

    // > Deposits must be processed in order
    *state.eth1_deposit_index_mut() += 1;

    apply_deposit(config, oracle, state, deposit.data)
}

pub fn verify_deposit_merkle_branch<P: Preset>(
    state: &(impl BeaconState<P> + ?Sized),
    deposit_index: DepositIndex,
    deposit: &Deposit,
) -> Result<()> {
    ensure!(
        is_valid_merkle_branch(
            deposit.data.hash_tree_root(),
            deposit.proof.iter(),
            deposit_index,
            state.eth1_data().deposit_root,
        ),
        DepositInvalidReason::ProofInvalid { deposit_index },
    );

    Ok(())
}

/// Adds a validator or tops up an existing one.
///
/// Deposits with invalid proofs of possession are skipped rather than rejected, so signatures
/// are always checked with `oracle` regardless of how the enclosing block is verified.
pub fn apply_deposit<P: Preset>(
    config: &Config,
    oracle: &dyn SignatureOracle,
    state: &mut (impl BeaconState<P> + ?Sized),
    deposit_data: DepositData,
) -> Result<Option<ValidatorIndex>> {
    let DepositData {
        pubkey,
        withdrawal_credentials,
        amount,
        signature,
    } = deposit_data;

    if let Some(validator_index) = index_of_public_key(state, pubkey) {
        // > Increase balance by deposit amount
        increase_balance(balance(state, validator_index)?, amount);
        return Ok(None);
    }

    // > Verify the deposit signature (proof of possession)
    // > which is not checked by the deposit contract
    let deposit_message = DepositMessage {
        pubkey,
        withdrawal_credentials,
        amount,
    };

    // > Fork-agnostic domain since deposits are valid across forks
    if deposit_message
        .verify(config, signature, pubkey, SingleVerifier::new(oracle))
        .is_err()
    {
        return Ok(None);
    }

    // > Add validator and balance entries
    let effective_balance = amount
        .prev_multiple_of(P::EFFECTIVE_BALANCE_INCREMENT)
        .min(P::MAX_EFFECTIVE_BALANCE);

    let validator = Validator {
        pubkey,
        withdrawal_credentials,
        effective_balance,
        slashed: false,
        activation_eligibility_epoch: FAR_FUTURE_EPOCH,
        activation_epoch: FAR_FUTURE_EPOCH,
        exit_epoch: FAR_FUTURE_EPOCH,
        withdrawable_epoch: FAR_FUTURE_EPOCH,
    };

    let validator_index = state.validators().len_u64();

    state.validators_mut().push(validator)?;
    state.balances_mut().push(amount)?;
    state.cache_mut().push_validator(pubkey, validator_index);

    Ok(Some(validator_index))
}

pub fn process_voluntary_exit<P: Preset>(
    config: &Config,
    state: &mut (impl BeaconState<P> + ?Sized),
    signed_voluntary_exit: SignedVoluntaryExit,
    verifier: impl Verifier,
) -> Result<()> {
    validate_voluntary_exit_with_verifier(config, state, signed_voluntary_exit, verifier)?;

    // > Initiate exit
    initiate_validator_exit(config, state, signed_voluntary_exit.message.validator_index)
}

pub fn validate_voluntary_exit_with_verifier<P: Preset>(
    config: &Config,
    state: &(impl BeaconState<P> + ?Sized),
    signed_voluntary_exit: SignedVoluntaryExit,
    mut verifier: impl Verifier,
) -> Result<()> {
    let voluntary_exit = signed_voluntary_exit.message;
    let index = voluntary_exit.validator_index;
    let validator = *state.validators().get(index)?;
    let current_epoch = get_current_epoch(state);

    // > Verify the validator is active
    ensure!(
        is_active_validator(&validator, current_epoch),
        VoluntaryExitInvalidReason::NotActive {
            index,
            current_epoch,
        },
    );

    // > Verify exit has not been initiated
    ensure!(
        validator.exit_epoch == FAR_FUTURE_EPOCH,
        VoluntaryExitInvalidReason::AlreadyExited {
            index,
            exit_epoch: validator.exit_epoch,
        },
    );

    // > Exits must specify an epoch when they become valid; they are not valid before then
    ensure!(
        current_epoch >= voluntary_exit.epoch,
        VoluntaryExitInvalidReason::NotYetValid {
            epoch: voluntary_exit.epoch,
            current_epoch,
        },
    );

    // > Verify the validator has been active long enough
    ensure!(
        current_epoch >= validator.activation_epoch + config.shard_committee_period,
        VoluntaryExitInvalidReason::NotActiveLongEnough {
            index,
            activation_epoch: validator.activation_epoch,
            current_epoch,
        },
    );

    // > Verify signature
    verifier
        .verify_singular(
            voluntary_exit.signing_root(config, state),
            signed_voluntary_exit.signature,
            validator.pubkey,
            SignatureKind::VoluntaryExit,
        )
        .context(VoluntaryExitInvalidReason::SignatureInvalid)
}
