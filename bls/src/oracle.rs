use ethereum_types::H256;

use crate::{public_key_bytes::PublicKeyBytes, signature_bytes::SignatureBytes};

/// Verification side of a BLS backend.
///
/// Messages are always signing roots, so they are passed as [`H256`].
pub trait SignatureOracle: Send + Sync {
    fn verify(&self, public_key: &PublicKeyBytes, message: H256, signature: SignatureBytes)
        -> bool;

    /// Verifies a signature aggregated from signatures over distinct `(public key, message)`
    /// pairs. Returns `false` for an empty set of pairs.
    fn aggregate_verify(
        &self,
        pairs: &[(PublicKeyBytes, H256)],
        signature: SignatureBytes,
    ) -> bool;

    /// Verifies a signature aggregated from signatures over the same message.
    /// Returns `false` for an empty set of keys.
    fn fast_aggregate_verify(
        &self,
        public_keys: &[PublicKeyBytes],
        message: H256,
        signature: SignatureBytes,
    ) -> bool {
        let pairs = public_keys
            .iter()
            .map(|public_key| (*public_key, message))
            .collect::<Vec<_>>();

        self.aggregate_verify(&pairs, signature)
    }
}
