use anyhow::{Context as _, Result};
use bls::SignatureOracle;
use helper_functions::{accessors, signing::SignForSingleFork as _, verifier::Verifier};
use types::{
    altair::{beacon_state::BeaconState, containers::SignedBeaconBlock},
    config::Config,
    preset::Preset,
};

use super::{block_processing, slot_processing};
use crate::unphased::{
    BlockHeaderInvalidReason, Error, ProcessSlots, ProposerPolicy, StateRootPolicy,
};

#[expect(clippy::too_many_arguments)]
pub fn state_transition<P: Preset>(
    config: &Config,
    oracle: &dyn SignatureOracle,
    state: &mut BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
    process_slots: ProcessSlots,
    proposer_policy: ProposerPolicy,
    state_root_policy: StateRootPolicy,
    mut verifier: impl Verifier,
) -> Result<()> {
    let block = &signed_block.message;

    // > Process slots (including those with no blocks) since block
    if process_slots.should_process(state, block) {
        slot_processing::process_slots(config, state, block.slot)?;
    }

    verifier.reserve(block_processing::count_required_signatures(block));

    // > Verify signature
    verify_block_signature(config, state, signed_block, &mut verifier)?;

    // > Process block
    block_processing::process_block(config, oracle, state, block, proposer_policy, verifier)?;

    // > Verify state root
    state_root_policy.verify(state, block)
}

pub fn verify_block_signature<P: Preset>(
    config: &Config,
    state: &BeaconState<P>,
    signed_block: &SignedBeaconBlock<P>,
    verifier: impl Verifier,
) -> Result<()> {
    let block = &signed_block.message;
    let public_key = *accessors::public_key(state, block.proposer_index)
        .context(Error::InvalidBlockHeader)?;

    block
        .verify(config, state, signed_block.signature, public_key, verifier)
        .context(BlockHeaderInvalidReason::SignatureInvalid)
        .context(Error::InvalidBlockHeader)
}
