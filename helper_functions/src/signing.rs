use anyhow::Result;
use bls::{PublicKeyBytes, SecretKey, SignatureBytes};
use derive_more::From;
use ssz::SszHash;
use types::{
    altair::{consts::DOMAIN_SYNC_COMMITTEE, containers::BeaconBlock as AltairBeaconBlock},
    combined::BeaconBlock as CombinedBeaconBlock,
    config::Config,
    phase0::{
        consts::{
            DOMAIN_BEACON_ATTESTER, DOMAIN_BEACON_PROPOSER, DOMAIN_DEPOSIT, DOMAIN_RANDAO,
            DOMAIN_VOLUNTARY_EXIT,
        },
        containers::{
            AttestationData, BeaconBlock as Phase0BeaconBlock, BeaconBlockHeader, DepositMessage,
            VoluntaryExit,
        },
        primitives::{DomainType, Epoch, Slot, H256},
    },
    preset::Preset,
    traits::BeaconState,
};

use crate::{accessors, error::SignatureKind, misc, verifier::Verifier};

// This wrapper is needed to differentiate between `Epoch` and `Slot`.
// They are aliased to the same type and thus cannot have different trait implementations.
#[derive(Clone, Copy, From)]
pub struct RandaoEpoch(Epoch);

impl SszHash for RandaoEpoch {
    fn hash_tree_root(&self) -> H256 {
        self.0.hash_tree_root()
    }
}

pub trait SignForAllForks: SszHash {
    const DOMAIN_TYPE: DomainType;
    const SIGNATURE_KIND: SignatureKind;

    fn signing_root(&self, config: &Config) -> H256 {
        let domain = misc::compute_domain(config, Self::DOMAIN_TYPE, None, None);
        misc::compute_signing_root(self, domain)
    }

    fn sign(&self, config: &Config, secret_key: SecretKey) -> SignatureBytes {
        secret_key.sign(self.signing_root(config))
    }

    fn verify(
        &self,
        config: &Config,
        signature_bytes: SignatureBytes,
        public_key: PublicKeyBytes,
        mut verifier: impl Verifier,
    ) -> Result<()> {
        verifier.verify_singular(
            self.signing_root(config),
            signature_bytes,
            public_key,
            Self::SIGNATURE_KIND,
        )
    }
}

pub trait SignForSingleFork<P: Preset>: SszHash {
    const DOMAIN_TYPE: DomainType;
    const SIGNATURE_KIND: SignatureKind;

    fn epoch(&self) -> Epoch;

    fn signing_root(&self, config: &Config, beacon_state: &(impl BeaconState<P> + ?Sized)) -> H256 {
        let epoch = Some(self.epoch());
        let domain = accessors::get_domain(config, beacon_state, Self::DOMAIN_TYPE, epoch);
        misc::compute_signing_root(self, domain)
    }

    fn sign(
        &self,
        config: &Config,
        beacon_state: &(impl BeaconState<P> + ?Sized),
        secret_key: SecretKey,
    ) -> SignatureBytes {
        secret_key.sign(self.signing_root(config, beacon_state))
    }

    fn verify(
        &self,
        config: &Config,
        beacon_state: &(impl BeaconState<P> + ?Sized),
        signature_bytes: SignatureBytes,
        public_key: PublicKeyBytes,
        mut verifier: impl Verifier,
    ) -> Result<()> {
        verifier.verify_singular(
            self.signing_root(config, beacon_state),
            signature_bytes,
            public_key,
            Self::SIGNATURE_KIND,
        )
    }
}

pub trait SignForSingleForkAtSlot<P: Preset>: SszHash {
    const DOMAIN_TYPE: DomainType;
    const SIGNATURE_KIND: SignatureKind;

    fn signing_root(
        &self,
        config: &Config,
        beacon_state: &(impl BeaconState<P> + ?Sized),
        slot: Slot,
    ) -> H256 {
        let epoch = misc::compute_epoch_at_slot::<P>(slot);
        let domain = accessors::get_domain(config, beacon_state, Self::DOMAIN_TYPE, Some(epoch));
        misc::compute_signing_root(self, domain)
    }

    fn sign(
        &self,
        config: &Config,
        beacon_state: &(impl BeaconState<P> + ?Sized),
        slot: Slot,
        secret_key: SecretKey,
    ) -> SignatureBytes {
        secret_key.sign(self.signing_root(config, beacon_state, slot))
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/beacon-chain.md#deposits>
impl SignForAllForks for DepositMessage {
    const DOMAIN_TYPE: DomainType = DOMAIN_DEPOSIT;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Deposit;
}

/// <https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/validator.md#aggregate-signature>
impl<P: Preset> SignForSingleFork<P> for AttestationData {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_ATTESTER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Attestation;

    fn epoch(&self) -> Epoch {
        self.target.epoch
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/validator.md#signature>
impl<P: Preset> SignForSingleFork<P> for Phase0BeaconBlock<P> {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }
}

impl<P: Preset> SignForSingleFork<P> for AltairBeaconBlock<P> {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }
}

impl<P: Preset> SignForSingleFork<P> for CombinedBeaconBlock<P> {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        let slot = match self {
            Self::Phase0(block) => block.slot,
            Self::Altair(block) => block.slot,
        };

        misc::compute_epoch_at_slot::<P>(slot)
    }
}

// A header has the same root as the block it was made from,
// so this is also how signatures of blocks of unknown phase are checked.
impl<P: Preset> SignForSingleFork<P> for BeaconBlockHeader {
    const DOMAIN_TYPE: DomainType = DOMAIN_BEACON_PROPOSER;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Block;

    fn epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/validator.md#randao-reveal>
impl<P: Preset> SignForSingleFork<P> for RandaoEpoch {
    const DOMAIN_TYPE: DomainType = DOMAIN_RANDAO;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::Randao;

    fn epoch(&self) -> Epoch {
        self.0
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/beacon-chain.md#voluntary-exits>
impl<P: Preset> SignForSingleFork<P> for VoluntaryExit {
    const DOMAIN_TYPE: DomainType = DOMAIN_VOLUNTARY_EXIT;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::VoluntaryExit;

    fn epoch(&self) -> Epoch {
        self.epoch
    }
}

/// <https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/altair/validator.md#sync-committee-messages>
impl<P: Preset> SignForSingleForkAtSlot<P> for H256 {
    const DOMAIN_TYPE: DomainType = DOMAIN_SYNC_COMMITTEE;
    const SIGNATURE_KIND: SignatureKind = SignatureKind::SyncAggregate;
}

#[cfg(test)]
mod tests {
    use bls::InsecureOracle;
    use types::{phase0::beacon_state::BeaconState as Phase0BeaconState, preset::Minimal};

    use crate::verifier::SingleVerifier;

    use super::*;

    #[test]
    fn block_and_header_share_signing_root() {
        let config = Config::minimal();
        let state = Phase0BeaconState::<Minimal>::default();

        let block = Phase0BeaconBlock::<Minimal> {
            slot: 3,
            proposer_index: 7,
            ..Phase0BeaconBlock::default()
        };

        let header = BeaconBlockHeader {
            slot: block.slot,
            proposer_index: block.proposer_index,
            parent_root: block.parent_root,
            state_root: block.state_root,
            body_root: block.body.hash_tree_root(),
        };

        assert_eq!(
            block.signing_root(&config, &state),
            SignForSingleFork::<Minimal>::signing_root(&header, &config, &state),
        );
    }

    #[test]
    fn randao_reveal_is_tied_to_epoch() {
        let config = Config::minimal();
        let state = Phase0BeaconState::<Minimal>::default();
        let secret_key = SecretKey::interop(0);
        let public_key = secret_key.to_public_key();
        let signature =
            SignForSingleFork::<Minimal>::sign(&RandaoEpoch::from(1), &config, &state, secret_key);
        let verifier = SingleVerifier::new(&InsecureOracle);

        SignForSingleFork::<Minimal>::verify(
            &RandaoEpoch::from(1),
            &config,
            &state,
            signature,
            public_key,
            verifier,
        )
        .expect("signature was made for epoch 1");

        SignForSingleFork::<Minimal>::verify(
            &RandaoEpoch::from(2),
            &config,
            &state,
            signature,
            public_key,
            verifier,
        )
        .expect_err("signature was made for epoch 1");
    }

    #[test]
    fn deposit_signatures_do_not_depend_on_state() {
        let config = Config::minimal();
        let secret_key = SecretKey::interop(5);

        let message = DepositMessage {
            pubkey: secret_key.to_public_key(),
            withdrawal_credentials: H256::zero(),
            amount: 32_000_000_000,
        };

        let signature = message.sign(&config, secret_key);

        message
            .verify(
                &config,
                signature,
                message.pubkey,
                SingleVerifier::new(&InsecureOracle),
            )
            .expect("deposit was signed with the matching key");
    }
}
