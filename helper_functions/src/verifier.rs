#![expect(clippy::module_name_repetitions)]

use anyhow::{ensure, Result};
use bls::{PublicKeyBytes, SignatureBytes, SignatureOracle};
use derive_more::Constructor;
use rayon::iter::{IntoParallelRefIterator as _, ParallelIterator as _};
use static_assertions::assert_not_impl_any;
use types::phase0::primitives::H256;

use crate::error::{Error, SignatureKind};

pub trait Verifier {
    const IS_NULL: bool;

    fn reserve(&mut self, additional: usize);

    fn verify_singular(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_key: PublicKeyBytes,
        signature_kind: SignatureKind,
    ) -> Result<()>;

    fn verify_aggregate(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_keys: impl IntoIterator<Item = PublicKeyBytes>,
        signature_kind: SignatureKind,
    ) -> Result<()>;

    /// [`eth_fast_aggregate_verify`](https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/altair/bls.md#eth_fast_aggregate_verify)
    fn verify_aggregate_allowing_empty(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_keys: impl IntoIterator<Item = PublicKeyBytes>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        let mut public_keys = public_keys.into_iter().peekable();

        if signature_bytes.is_empty() {
            ensure!(
                public_keys.peek().is_none(),
                Error::SignatureInvalid(signature_kind),
            );

            return Ok(());
        }

        self.verify_aggregate(message, signature_bytes, public_keys, signature_kind)
    }

    fn finish(&self) -> Result<()>;
}

impl<V: Verifier> Verifier for &mut V {
    const IS_NULL: bool = V::IS_NULL;

    #[inline]
    fn reserve(&mut self, additional: usize) {
        (*self).reserve(additional)
    }

    #[inline]
    fn verify_singular(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_key: PublicKeyBytes,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        (*self).verify_singular(message, signature_bytes, public_key, signature_kind)
    }

    #[inline]
    fn verify_aggregate(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_keys: impl IntoIterator<Item = PublicKeyBytes>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        (*self).verify_aggregate(message, signature_bytes, public_keys, signature_kind)
    }

    #[inline]
    fn finish(&self) -> Result<()> {
        (**self).finish()
    }
}

/// Accepts every signature. Used when signatures were verified already or are irrelevant.
pub struct NullVerifier;

impl Verifier for NullVerifier {
    const IS_NULL: bool = true;

    #[inline]
    fn reserve(&mut self, _additional: usize) {}

    #[inline]
    fn verify_singular(
        &mut self,
        _message: H256,
        _signature_bytes: SignatureBytes,
        _public_key: PublicKeyBytes,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn verify_aggregate(
        &mut self,
        _message: H256,
        _signature_bytes: SignatureBytes,
        _public_keys: impl IntoIterator<Item = PublicKeyBytes>,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn finish(&self) -> Result<()> {
        Ok(())
    }
}

/// Verifies every signature as soon as it is submitted.
#[derive(Clone, Copy, Constructor)]
pub struct SingleVerifier<'oracle> {
    oracle: &'oracle dyn SignatureOracle,
}

impl Verifier for SingleVerifier<'_> {
    const IS_NULL: bool = false;

    #[inline]
    fn reserve(&mut self, _additional: usize) {}

    #[inline]
    fn verify_singular(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_key: PublicKeyBytes,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        ensure!(
            self.oracle.verify(&public_key, message, signature_bytes),
            Error::SignatureInvalid(signature_kind),
        );

        Ok(())
    }

    #[inline]
    fn verify_aggregate(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_keys: impl IntoIterator<Item = PublicKeyBytes>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        let triple = Triple::new(message, signature_bytes, public_keys.into_iter().collect());

        ensure!(
            triple.is_valid(self.oracle),
            Error::SignatureInvalid(signature_kind),
        );

        Ok(())
    }

    #[inline]
    fn finish(&self) -> Result<()> {
        Ok(())
    }
}

/// Defers verification until [`Verifier::finish`] and then checks all signatures in parallel.
///
/// Block processing submits several signatures per block. Collecting them first lets the
/// expensive part run on the Rayon thread pool after all cheap checks have passed.
pub struct MultiVerifier<'oracle> {
    oracle: &'oracle dyn SignatureOracle,
    triples: Vec<Triple>,
}

impl<'oracle> MultiVerifier<'oracle> {
    #[must_use]
    pub fn new(oracle: &'oracle dyn SignatureOracle) -> Self {
        Self {
            oracle,
            triples: vec![],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }
}

impl Verifier for MultiVerifier<'_> {
    const IS_NULL: bool = false;

    #[inline]
    fn reserve(&mut self, additional: usize) {
        self.triples.reserve_exact(additional);
    }

    #[inline]
    fn verify_singular(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_key: PublicKeyBytes,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        let triple = Triple::new(message, signature_bytes, vec![public_key]);
        self.triples.push(triple);
        Ok(())
    }

    #[inline]
    fn verify_aggregate(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_keys: impl IntoIterator<Item = PublicKeyBytes>,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        let triple = Triple::new(message, signature_bytes, public_keys.into_iter().collect());
        self.triples.push(triple);
        Ok(())
    }

    #[inline]
    fn finish(&self) -> Result<()> {
        let oracle = self.oracle;

        ensure!(
            self.triples.par_iter().all(|triple| triple.is_valid(oracle)),
            Error::SignatureInvalid(SignatureKind::Multi),
        );

        Ok(())
    }
}

#[derive(Constructor)]
struct Triple {
    message: H256,
    signature_bytes: SignatureBytes,
    public_keys: Vec<PublicKeyBytes>,
}

assert_not_impl_any!(Triple: Copy, Clone);

impl Triple {
    fn is_valid(&self, oracle: &dyn SignatureOracle) -> bool {
        match self.public_keys.as_slice() {
            [public_key] => oracle.verify(public_key, self.message, self.signature_bytes),
            public_keys => {
                oracle.fast_aggregate_verify(public_keys, self.message, self.signature_bytes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bls::{InsecureOracle, SecretKey};

    use super::*;

    fn signed(index: u64, message: H256) -> (PublicKeyBytes, SignatureBytes) {
        let secret_key = SecretKey::interop(index);
        (secret_key.to_public_key(), secret_key.sign(message))
    }

    #[test]
    fn single_verifier_rejects_wrong_message() {
        let message = H256::repeat_byte(1);
        let (public_key, signature) = signed(0, message);
        let mut verifier = SingleVerifier::new(&InsecureOracle);

        verifier
            .verify_singular(message, signature, public_key, SignatureKind::Block)
            .expect("signature is valid");

        let error = verifier
            .verify_singular(H256::zero(), signature, public_key, SignatureKind::Block)
            .expect_err("signature is over a different message");

        assert_eq!(error.to_string(), "block signature is invalid");
    }

    #[test]
    fn multi_verifier_defers_until_finish() {
        let message = H256::repeat_byte(2);
        let (public_key, signature) = signed(1, message);
        let mut verifier = MultiVerifier::new(&InsecureOracle);

        verifier
            .verify_singular(message, signature, public_key, SignatureKind::Randao)
            .expect("MultiVerifier does not verify eagerly");

        verifier.finish().expect("only valid signatures were submitted");

        verifier
            .verify_singular(message, SignatureBytes::default(), public_key, SignatureKind::Randao)
            .expect("MultiVerifier does not verify eagerly");

        assert_eq!(verifier.len(), 2);
        verifier.finish().expect_err("one signature is invalid");
    }

    #[test]
    fn aggregates_are_checked_against_all_keys() {
        let message = H256::repeat_byte(3);
        let (public_key_0, signature_0) = signed(0, message);
        let (public_key_1, signature_1) = signed(1, message);
        let aggregate = InsecureOracle::aggregate([signature_0, signature_1]);
        let mut verifier = SingleVerifier::new(&InsecureOracle);

        verifier
            .verify_aggregate(
                message,
                aggregate,
                [public_key_0, public_key_1],
                SignatureKind::Attestation,
            )
            .expect("aggregate covers both keys");

        verifier
            .verify_aggregate(message, aggregate, [public_key_0], SignatureKind::Attestation)
            .expect_err("aggregate covers a key that was not passed in");
    }

    #[test]
    fn empty_aggregate_is_allowed_only_with_infinity_signature() {
        let mut verifier = SingleVerifier::new(&InsecureOracle);

        verifier
            .verify_aggregate_allowing_empty(
                H256::zero(),
                SignatureBytes::empty(),
                [PublicKeyBytes::default(); 0],
                SignatureKind::SyncAggregate,
            )
            .expect("empty participation with the point at infinity is valid");

        verifier
            .verify_aggregate_allowing_empty(
                H256::zero(),
                SignatureBytes([0; 96]),
                [PublicKeyBytes::default(); 0],
                SignatureKind::SyncAggregate,
            )
            .expect_err("empty participation requires the point at infinity");
    }

    #[test]
    fn null_verifier_accepts_anything() {
        let mut verifier = NullVerifier;

        verifier
            .verify_singular(
                H256::zero(),
                SignatureBytes::default(),
                PublicKeyBytes::default(),
                SignatureKind::Deposit,
            )
            .expect("NullVerifier accepts every signature");

        assert!(NullVerifier::IS_NULL);
    }
}
