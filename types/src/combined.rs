use bls::SignatureBytes;
use derive_more::From;
use serde::{Deserialize, Serialize};
use ssz::{SszHash, H256};

use crate::{
    altair::{
        beacon_state::BeaconState as AltairBeaconState,
        containers::{
            BeaconBlock as AltairBeaconBlock, SignedBeaconBlock as AltairSignedBeaconBlock,
        },
    },
    nonstandard::Phase,
    phase0::{
        beacon_state::BeaconState as Phase0BeaconState,
        containers::{
            BeaconBlock as Phase0BeaconBlock, SignedBeaconBlock as Phase0SignedBeaconBlock,
        },
        primitives::Slot,
    },
    preset::Preset,
};

#[derive(Clone, PartialEq, Eq, Debug, From, Deserialize, Serialize)]
#[serde(bound = "", rename_all = "lowercase")]
pub enum BeaconState<P: Preset> {
    Phase0(Phase0BeaconState<P>),
    Altair(AltairBeaconState<P>),
}

impl<P: Preset> Default for BeaconState<P> {
    fn default() -> Self {
        Self::Phase0(Phase0BeaconState::default())
    }
}

impl<P: Preset> SszHash for BeaconState<P> {
    fn hash_tree_root(&self) -> H256 {
        match self {
            Self::Phase0(state) => state.hash_tree_root(),
            Self::Altair(state) => state.hash_tree_root(),
        }
    }
}

impl<P: Preset> BeaconState<P> {
    #[must_use]
    pub const fn phase0(&self) -> Option<&Phase0BeaconState<P>> {
        match self {
            Self::Phase0(state) => Some(state),
            Self::Altair(_) => None,
        }
    }

    #[must_use]
    pub const fn altair(&self) -> Option<&AltairBeaconState<P>> {
        match self {
            Self::Phase0(_) => None,
            Self::Altair(state) => Some(state),
        }
    }

    pub fn phase0_mut(&mut self) -> Option<&mut Phase0BeaconState<P>> {
        match self {
            Self::Phase0(state) => Some(state),
            Self::Altair(_) => None,
        }
    }

    pub fn altair_mut(&mut self) -> Option<&mut AltairBeaconState<P>> {
        match self {
            Self::Phase0(_) => None,
            Self::Altair(state) => Some(state),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, From, Deserialize, Serialize)]
#[serde(bound = "", rename_all = "lowercase")]
pub enum SignedBeaconBlock<P: Preset> {
    Phase0(Phase0SignedBeaconBlock<P>),
    Altair(AltairSignedBeaconBlock<P>),
}

impl<P: Preset> SszHash for SignedBeaconBlock<P> {
    fn hash_tree_root(&self) -> H256 {
        match self {
            Self::Phase0(block) => block.hash_tree_root(),
            Self::Altair(block) => block.hash_tree_root(),
        }
    }
}

impl<P: Preset> SignedBeaconBlock<P> {
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Phase0(_) => Phase::Phase0,
            Self::Altair(_) => Phase::Altair,
        }
    }

    #[must_use]
    pub const fn slot(&self) -> Slot {
        match self {
            Self::Phase0(block) => block.message.slot,
            Self::Altair(block) => block.message.slot,
        }
    }

    /// Returns the root of the unsigned block, which is what the rest of the chain refers to.
    #[must_use]
    pub fn block_root(&self) -> H256 {
        match self {
            Self::Phase0(block) => block.message.hash_tree_root(),
            Self::Altair(block) => block.message.hash_tree_root(),
        }
    }

    #[must_use]
    pub fn split(self) -> (BeaconBlock<P>, SignatureBytes) {
        match self {
            Self::Phase0(block) => (block.message.into(), block.signature),
            Self::Altair(block) => (block.message.into(), block.signature),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug, From, Deserialize, Serialize)]
#[serde(bound = "", rename_all = "lowercase")]
pub enum BeaconBlock<P: Preset> {
    Phase0(Phase0BeaconBlock<P>),
    Altair(AltairBeaconBlock<P>),
}

impl<P: Preset> SszHash for BeaconBlock<P> {
    fn hash_tree_root(&self) -> H256 {
        match self {
            Self::Phase0(block) => block.hash_tree_root(),
            Self::Altair(block) => block.hash_tree_root(),
        }
    }
}

impl<P: Preset> BeaconBlock<P> {
    #[must_use]
    pub const fn phase(&self) -> Phase {
        match self {
            Self::Phase0(_) => Phase::Phase0,
            Self::Altair(_) => Phase::Altair,
        }
    }

    #[must_use]
    pub fn with_signature(self, signature: SignatureBytes) -> SignedBeaconBlock<P> {
        match self {
            Self::Phase0(message) => Phase0SignedBeaconBlock { message, signature }.into(),
            Self::Altair(message) => AltairSignedBeaconBlock { message, signature }.into(),
        }
    }

    #[must_use]
    pub fn with_state_root(mut self, state_root: H256) -> Self {
        match &mut self {
            Self::Phase0(block) => block.state_root = state_root,
            Self::Altair(block) => block.state_root = state_root,
        }

        self
    }
}

#[cfg(test)]
mod tests {
    use crate::{preset::Minimal, traits::BeaconState as _};

    use super::*;

    #[test]
    fn state_survives_bincode_round_trip() {
        let state = BeaconState::<Minimal>::from(AltairBeaconState::default());
        let bytes = bincode::serialize(&state).expect("state can be serialized");
        let decoded = bincode::deserialize::<BeaconState<Minimal>>(&bytes)
            .expect("bytes were produced by serialize");

        assert_eq!(decoded, state);
        assert_eq!(decoded.phase(), Phase::Altair);
    }

    #[test]
    fn with_state_root_changes_block_root() {
        let block = BeaconBlock::<Minimal>::from(Phase0BeaconBlock::default());
        let modified = block.clone().with_state_root(H256::repeat_byte(1));

        assert_ne!(block.hash_tree_root(), modified.hash_tree_root());
        assert_eq!(
            modified.with_signature(SignatureBytes::default()).phase(),
            Phase::Phase0,
        );
    }
}
