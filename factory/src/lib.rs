//! Builders for valid (and deliberately invalid) blocks and attestations.
//!
//! Everything here is signed with interop keys and checked with [`InsecureOracle`], so it is only
//! suitable for tests.

use std::sync::Arc;

use anyhow::{bail, ensure, Result};
use bls::{InsecureOracle, SignatureBytes};
use deposit_tree::DepositTree;
use genesis::interop;
use helper_functions::{
    accessors, misc,
    signing::{RandaoEpoch, SignForSingleFork},
};
use ssz::{BitList, ContiguousList, SszHash as _};
use transition_functions::combined::{self, BlockVerification};
use typenum::Unsigned as _;
use types::{
    altair::containers::{
        BeaconBlock as AltairBeaconBlock, BeaconBlockBody as AltairBeaconBlockBody, SyncAggregate,
    },
    combined::{BeaconBlock, BeaconState, SignedBeaconBlock},
    config::Config,
    nonstandard::{Phase, RelativeEpoch},
    phase0::{
        containers::{
            Attestation, AttestationData, AttesterSlashing, BeaconBlock as Phase0BeaconBlock,
            BeaconBlockBody as Phase0BeaconBlockBody, Checkpoint, Deposit, IndexedAttestation,
        },
        primitives::{Slot, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::BeaconState as _,
};

pub type BlockWithState<P> = (Arc<SignedBeaconBlock<P>>, Arc<BeaconState<P>>);

/// Operations to include in a block.
#[derive(Clone, Default)]
pub struct BlockContents<P: Preset> {
    pub attestations: Vec<Attestation<P>>,
    pub attester_slashings: Vec<AttesterSlashing<P>>,
    pub deposits: Vec<Deposit>,
}

/// Genesis with the smallest number of validators allowed by `config`.
pub fn min_genesis_state<P: Preset>(
    config: &Config,
) -> Result<(Arc<BeaconState<P>>, DepositTree)> {
    let (genesis_state, deposit_tree) = interop::quick_start_beacon_state(
        config,
        &InsecureOracle,
        config.min_genesis_time,
        config.min_genesis_active_validator_count,
    )?;

    Ok((Arc::new(genesis_state), deposit_tree))
}

pub fn empty_block<P: Preset>(
    config: &Config,
    pre_state: Arc<BeaconState<P>>,
    slot: Slot,
    graffiti: H256,
) -> Result<BlockWithState<P>> {
    custom_block(config, pre_state, slot, graffiti, BlockContents::default())
}

pub fn block_with_attestations<P: Preset>(
    config: &Config,
    pre_state: Arc<BeaconState<P>>,
    slot: Slot,
    graffiti: H256,
    attestations: Vec<Attestation<P>>,
) -> Result<BlockWithState<P>> {
    let contents = BlockContents {
        attestations,
        ..BlockContents::default()
    };

    custom_block(config, pre_state, slot, graffiti, contents)
}

/// Builds a block on top of `pre_state` and applies it.
///
/// The returned state is the post-state of the block with its root in `block.state_root`.
pub fn custom_block<P: Preset>(
    config: &Config,
    pre_state: Arc<BeaconState<P>>,
    slot: Slot,
    graffiti: H256,
    contents: BlockContents<P>,
) -> Result<BlockWithState<P>> {
    let mut state = advance(config, &pre_state, slot)?;
    let unsigned = unsigned_block(config, &state, graffiti, contents)?;

    // The block is signed after applying it, so signatures cannot be checked yet.
    let verification = BlockVerification {
        verify_state_root: false,
        verify_proposer: true,
        verify_signatures: false,
    };

    combined::process_block(
        config,
        &InsecureOracle,
        &mut state,
        &unsigned.clone().with_signature(SignatureBytes::empty()),
        verification,
    )?;

    let block = unsigned.with_state_root(state.hash_tree_root());
    let signed = sign_block(config, &state, block)?;

    Ok((Arc::new(signed), Arc::new(state)))
}

/// Builds a properly signed block without applying it.
///
/// Used for blocks that are expected to be rejected. The state root is left zeroed.
pub fn unapplied_block<P: Preset>(
    config: &Config,
    pre_state: &BeaconState<P>,
    slot: Slot,
    graffiti: H256,
    contents: BlockContents<P>,
) -> Result<Arc<SignedBeaconBlock<P>>> {
    let state = advance(config, pre_state, slot)?;
    let block = unsigned_block(config, &state, graffiti, contents)?;

    sign_block(config, &state, block).map(Arc::new)
}

/// Attestations from every member of every committee at `slot` voting for `beacon_block_root`.
///
/// `head_state` is the post-state of `beacon_block_root` at or before `slot`.
pub fn full_attestations<P: Preset>(
    config: &Config,
    head_state: &BeaconState<P>,
    beacon_block_root: H256,
    slot: Slot,
) -> Result<Vec<Attestation<P>>> {
    committee_attestations(config, head_state, beacon_block_root, slot, |_| true)
}

/// Like [`full_attestations`], but only validators accepted by `filter` participate.
/// Committees with no participants are skipped.
pub fn committee_attestations<P: Preset>(
    config: &Config,
    head_state: &BeaconState<P>,
    beacon_block_root: H256,
    slot: Slot,
    mut filter: impl FnMut(ValidatorIndex) -> bool,
) -> Result<Vec<Attestation<P>>> {
    let state = advance(config, head_state, slot)?;
    let committee_count = accessors::get_committee_count_per_slot(&state, RelativeEpoch::Current);
    let mut attestations = vec![];

    for committee_index in 0..committee_count {
        let committee = accessors::beacon_committee(&state, slot, committee_index)?;
        let data = attestation_data(&state, beacon_block_root, slot, committee_index)?;

        let mut aggregation_bits = BitList::with_length(committee.len())?;
        let mut signatures = vec![];

        for (position, validator_index) in committee.iter().copied().enumerate() {
            if filter(validator_index) {
                aggregation_bits.set(position, true);
                signatures.push(sign_attestation_data(config, &state, data, validator_index));
            }
        }

        if signatures.is_empty() {
            continue;
        }

        attestations.push(Attestation {
            aggregation_bits,
            data,
            signature: InsecureOracle::aggregate(signatures),
        });
    }

    Ok(attestations)
}

/// An attestation from `validator_index` alone, made in its assigned slot of the current epoch.
pub fn singular_attestation<P: Preset>(
    config: &Config,
    head_state: &BeaconState<P>,
    beacon_block_root: H256,
    validator_index: ValidatorIndex,
) -> Result<Attestation<P>> {
    let epoch = accessors::get_current_epoch(head_state);
    let start_slot = misc::compute_start_slot_at_epoch::<P>(epoch);

    for slot in start_slot..start_slot + P::SlotsPerEpoch::U64 {
        if slot < head_state.slot() {
            continue;
        }

        let mut attestations = committee_attestations(
            config,
            head_state,
            beacon_block_root,
            slot,
            |index| index == validator_index,
        )?;

        if let Some(attestation) = attestations.pop() {
            return Ok(attestation);
        }
    }

    bail!(
        "validator {validator_index} has no remaining assignment in epoch {epoch} \
         after slot {}",
        head_state.slot(),
    )
}

/// An attester slashing for a double vote by `validator_indices` in the current epoch of `state`.
pub fn double_vote_slashing<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    validator_indices: &[ValidatorIndex],
) -> Result<AttesterSlashing<P>> {
    ensure!(
        !validator_indices.is_empty(),
        "attester slashing needs at least one validator",
    );

    let mut attesting_indices = validator_indices.to_vec();
    attesting_indices.sort_unstable();
    attesting_indices.dedup();

    let target = Checkpoint {
        epoch: accessors::get_current_epoch(state),
        root: H256::zero(),
    };

    let data_1 = AttestationData {
        slot: state.slot(),
        index: 0,
        beacon_block_root: H256::repeat_byte(1),
        source: state.current_justified_checkpoint(),
        target,
    };

    let data_2 = AttestationData {
        beacon_block_root: H256::repeat_byte(2),
        ..data_1
    };

    let indexed_attestation = |data: AttestationData| -> Result<IndexedAttestation<P>> {
        let signatures = attesting_indices
            .iter()
            .map(|index| sign_attestation_data(config, state, data, *index));

        Ok(IndexedAttestation {
            attesting_indices: ContiguousList::try_from(attesting_indices.clone())?,
            data,
            signature: InsecureOracle::aggregate(signatures),
        })
    };

    Ok(AttesterSlashing {
        attestation_1: indexed_attestation(data_1)?,
        attestation_2: indexed_attestation(data_2)?,
    })
}

fn advance<P: Preset>(config: &Config, state: &BeaconState<P>, slot: Slot) -> Result<BeaconState<P>> {
    let mut state = state.clone();

    if state.slot() < slot {
        combined::process_slots(config, &mut state, slot)?;
    }

    Ok(state)
}

fn unsigned_block<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    graffiti: H256,
    contents: BlockContents<P>,
) -> Result<BeaconBlock<P>> {
    let BlockContents {
        attestations,
        attester_slashings,
        deposits,
    } = contents;

    let slot = state.slot();
    let proposer_index = accessors::get_beacon_proposer_index(state)?;
    let parent_root = accessors::latest_block_root(state);
    let epoch = accessors::get_current_epoch(state);

    let randao_reveal = RandaoEpoch::from(epoch).sign(
        config,
        state,
        interop::secret_key(proposer_index),
    );

    let block = match state.phase() {
        Phase::Phase0 => BeaconBlock::from(Phase0BeaconBlock {
            slot,
            proposer_index,
            parent_root,
            state_root: H256::zero(),
            body: Phase0BeaconBlockBody {
                randao_reveal,
                eth1_data: state.eth1_data(),
                graffiti,
                proposer_slashings: ContiguousList::default(),
                attester_slashings: ContiguousList::try_from(attester_slashings)?,
                attestations: ContiguousList::try_from(attestations)?,
                deposits: ContiguousList::try_from(deposits)?,
                voluntary_exits: ContiguousList::default(),
            },
        }),
        Phase::Altair => BeaconBlock::from(AltairBeaconBlock {
            slot,
            proposer_index,
            parent_root,
            state_root: H256::zero(),
            body: AltairBeaconBlockBody {
                randao_reveal,
                eth1_data: state.eth1_data(),
                graffiti,
                proposer_slashings: ContiguousList::default(),
                attester_slashings: ContiguousList::try_from(attester_slashings)?,
                attestations: ContiguousList::try_from(attestations)?,
                deposits: ContiguousList::try_from(deposits)?,
                voluntary_exits: ContiguousList::default(),
                sync_aggregate: SyncAggregate::empty(),
            },
        }),
    };

    Ok(block)
}

fn sign_block<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    block: BeaconBlock<P>,
) -> Result<SignedBeaconBlock<P>> {
    let proposer_index = match &block {
        BeaconBlock::Phase0(block) => block.proposer_index,
        BeaconBlock::Altair(block) => block.proposer_index,
    };

    let signature = block.sign(config, state, interop::secret_key(proposer_index));

    Ok(block.with_signature(signature))
}

fn attestation_data<P: Preset>(
    state: &BeaconState<P>,
    beacon_block_root: H256,
    slot: Slot,
    committee_index: u64,
) -> Result<AttestationData> {
    let epoch = misc::compute_epoch_at_slot::<P>(slot);
    let epoch_start_slot = misc::compute_start_slot_at_epoch::<P>(epoch);

    // The state has no root for its own slot yet.
    let target_root = if epoch_start_slot == state.slot() {
        beacon_block_root
    } else {
        accessors::get_block_root_at_slot(state, epoch_start_slot)?
    };

    Ok(AttestationData {
        slot,
        index: committee_index,
        beacon_block_root,
        source: state.current_justified_checkpoint(),
        target: Checkpoint {
            epoch,
            root: target_root,
        },
    })
}

fn sign_attestation_data<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    data: AttestationData,
    validator_index: ValidatorIndex,
) -> SignatureBytes {
    <AttestationData as SignForSingleFork<P>>::sign(
        &data,
        config,
        state,
        interop::secret_key(validator_index),
    )
}

#[cfg(test)]
mod tests {
    use helper_functions::verifier::SingleVerifier;
    use transition_functions::combined::state_transition;
    use types::preset::Minimal;

    use super::*;

    #[test]
    fn blocks_pass_full_verification() -> Result<()> {
        let config = Config::minimal();
        let (genesis_state, _) = min_genesis_state::<Minimal>(&config)?;
        let (block, post_state) = empty_block(&config, genesis_state.clone(), 1, H256::zero())?;

        let mut state = genesis_state.as_ref().clone();

        state_transition(
            &config,
            &InsecureOracle,
            &mut state,
            &block,
            BlockVerification::full(),
        )?;

        assert_eq!(state, *post_state);

        Ok(())
    }

    #[test]
    fn attestations_are_included_and_verified() -> Result<()> {
        let config = Config::minimal();
        let (genesis_state, _) = min_genesis_state::<Minimal>(&config)?;
        let (block_1, state_1) = empty_block(&config, genesis_state, 1, H256::zero())?;

        let attestations = full_attestations(&config, &state_1, block_1.block_root(), 1)?;

        assert!(!attestations.is_empty());

        let (block_2, _) =
            block_with_attestations(&config, state_1.clone(), 2, H256::zero(), attestations)?;

        let mut state = state_1.as_ref().clone();

        state_transition(
            &config,
            &InsecureOracle,
            &mut state,
            &block_2,
            BlockVerification::full(),
        )?;

        Ok(())
    }

    #[test]
    fn double_vote_slashing_is_valid() -> Result<()> {
        let config = Config::minimal();
        let (genesis_state, _) = min_genesis_state::<Minimal>(&config)?;
        let slashing = double_vote_slashing(&config, &genesis_state, &[3, 1])?;

        let slashed = transition_functions::unphased::validate_attester_slashing_with_verifier(
            &config,
            genesis_state.as_ref(),
            &slashing,
            SingleVerifier::new(&InsecureOracle),
        )?;

        assert_eq!(slashed, [1, 3]);

        Ok(())
    }
}
