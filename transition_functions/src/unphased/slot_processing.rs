use ssz::SszHash;
use types::{
    preset::Preset,
    traits::{BeaconBlock, BeaconState},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcessSlots {
    Always,
    IfNeeded,
    Never,
}

impl ProcessSlots {
    #[must_use]
    pub fn should_process<P: Preset>(
        self,
        state: &(impl BeaconState<P> + ?Sized),
        block: &(impl BeaconBlock<P> + ?Sized),
    ) -> bool {
        match self {
            Self::Always => true,
            // Testing for inequality makes blocks that try to rewind the state fail early in
            // `process_slots` instead of failing later on the state root.
            Self::IfNeeded => state.slot() != block.slot(),
            Self::Never => false,
        }
    }
}

pub fn process_slot<P: Preset>(state: &mut (impl BeaconState<P> + SszHash)) {
    let slot = state.slot();

    // > Cache state root
    let previous_state_root = state.hash_tree_root();
    *state.state_roots_mut().mod_index_mut(slot) = previous_state_root;

    // > Cache latest block header state root
    if state.latest_block_header().state_root.is_zero() {
        state.latest_block_header_mut().state_root = previous_state_root;
    }

    // > Cache block root
    let previous_block_root = state.latest_block_header().hash_tree_root();
    *state.block_roots_mut().mod_index_mut(slot) = previous_block_root;

    state.cache_mut().advance_slot();
}

#[cfg(test)]
mod tests {
    use types::{
        phase0::{beacon_state::BeaconState as Phase0BeaconState, primitives::H256},
        preset::Minimal,
    };

    use super::*;

    #[test]
    fn process_slot_caches_roots_of_previous_slot() {
        let mut state = Phase0BeaconState::<Minimal>::default();
        let state_root = state.hash_tree_root();

        process_slot(&mut state);

        assert_eq!(*state.state_roots.mod_index(0), state_root);
        assert_eq!(state.latest_block_header.state_root, state_root);
        assert_eq!(
            *state.block_roots.mod_index(0),
            state.latest_block_header.hash_tree_root(),
        );
    }

    #[test]
    fn process_slot_keeps_filled_header_state_root() {
        let mut state = Phase0BeaconState::<Minimal>::default();
        state.latest_block_header.state_root = H256::repeat_byte(1);

        process_slot(&mut state);

        assert_eq!(state.latest_block_header.state_root, H256::repeat_byte(1));
    }
}
