use anyhow::{ensure, Result};
use ssz::SszHash;
use types::{
    preset::Preset,
    traits::{BeaconBlock, BeaconState},
};

use crate::unphased::Error;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StateRootPolicy {
    Verify,
    Trust,
}

impl StateRootPolicy {
    pub fn verify<P: Preset>(
        self,
        state: &(impl BeaconState<P> + SszHash),
        block: &(impl BeaconBlock<P> + ?Sized),
    ) -> Result<()> {
        if self == Self::Verify {
            let computed = state.hash_tree_root();
            let in_block = block.state_root();

            ensure!(
                computed == in_block,
                Error::StateRootMismatch { computed, in_block },
            );
        }

        Ok(())
    }
}
