//! Deterministic stand-in for a BLS backend.
//!
//! Signatures are derived from public keys with SHA-256 and aggregated with XOR. Anyone who knows
//! a public key can forge signatures for it. This exists so that state transitions can be
//! exercised with signature verification enabled in tests and local interop networks.

use ethereum_types::H256;
use sha2::{Digest as _, Sha256};

use crate::{
    oracle::SignatureOracle,
    public_key_bytes::{PublicKeyBytes, COMPRESSED_SIZE},
    signature_bytes::{SignatureBytes, SIGNATURE_SIZE},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SecretKey(H256);

impl SecretKey {
    #[must_use]
    pub const fn new(bytes: H256) -> Self {
        Self(bytes)
    }

    /// Derives a key from a validator index the way interop genesis does.
    #[must_use]
    pub fn interop(index: u64) -> Self {
        Self(H256(Sha256::digest(index.to_le_bytes()).into()))
    }

    #[must_use]
    pub fn to_public_key(self) -> PublicKeyBytes {
        let mut bytes = [0; COMPRESSED_SIZE];

        for (chunk, counter) in bytes.chunks_mut(H256::len_bytes()).zip(0_u8..) {
            let digest = Sha256::new()
                .chain_update(b"public key")
                .chain_update(self.0)
                .chain_update([counter])
                .finalize();

            chunk.copy_from_slice(&digest[..chunk.len()]);
        }

        PublicKeyBytes(bytes)
    }

    #[must_use]
    pub fn sign(self, message: H256) -> SignatureBytes {
        expected_signature(&self.to_public_key(), message)
    }
}

#[derive(Clone, Copy, Default, Debug)]
pub struct InsecureOracle;

impl InsecureOracle {
    #[must_use]
    pub fn aggregate(signatures: impl IntoIterator<Item = SignatureBytes>) -> SignatureBytes {
        let mut aggregate = [0; SIGNATURE_SIZE];

        for signature in signatures {
            for (output, input) in aggregate.iter_mut().zip(signature.0) {
                *output ^= input;
            }
        }

        SignatureBytes(aggregate)
    }
}

impl SignatureOracle for InsecureOracle {
    fn verify(
        &self,
        public_key: &PublicKeyBytes,
        message: H256,
        signature: SignatureBytes,
    ) -> bool {
        expected_signature(public_key, message) == signature
    }

    fn aggregate_verify(
        &self,
        pairs: &[(PublicKeyBytes, H256)],
        signature: SignatureBytes,
    ) -> bool {
        if pairs.is_empty() {
            return false;
        }

        let expected = Self::aggregate(
            pairs
                .iter()
                .map(|(public_key, message)| expected_signature(public_key, *message)),
        );

        expected == signature
    }
}

fn expected_signature(public_key: &PublicKeyBytes, message: H256) -> SignatureBytes {
    let mut bytes = [0; SIGNATURE_SIZE];

    for (chunk, counter) in bytes.chunks_mut(H256::len_bytes()).zip(0_u8..) {
        let digest = Sha256::new()
            .chain_update(public_key.as_bytes())
            .chain_update(message)
            .chain_update([counter])
            .finalize();

        chunk.copy_from_slice(&digest);
    }

    SignatureBytes(bytes)
}
