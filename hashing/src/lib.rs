use ethereum_types::H256;
use once_cell::sync::Lazy;
use sha2::{Digest as _, Sha256};

/// Roots of Merkle subtrees consisting only of zero chunks, indexed by height.
///
/// Height 40 covers the largest list limit used in the beacon state (the validator registry).
pub static ZERO_HASHES: Lazy<[H256; 41]> = Lazy::new(|| {
    let mut hashes = [H256::zero(); 41];

    for height in 1..hashes.len() {
        hashes[height] = hash_256_256(hashes[height - 1], hashes[height - 1]);
    }

    hashes
});

#[inline]
#[must_use]
pub fn hash_bytes(bytes: impl AsRef<[u8]>) -> H256 {
    H256(Sha256::digest(bytes).into())
}

#[inline]
#[must_use]
pub fn hash_64(value: u64) -> H256 {
    hash_bytes(value.to_le_bytes())
}

#[inline]
#[must_use]
pub fn hash_256(bytes: H256) -> H256 {
    hash_bytes(bytes)
}

#[inline]
#[must_use]
pub fn hash_256_8(a: H256, b: u8) -> H256 {
    Sha256::new()
        .chain_update(a)
        .chain_update([b])
        .finalize()
        .pipe_h256()
}

#[inline]
#[must_use]
pub fn hash_256_8_32(a: H256, b: u8, c: u32) -> H256 {
    Sha256::new()
        .chain_update(a)
        .chain_update([b])
        .chain_update(c.to_le_bytes())
        .finalize()
        .pipe_h256()
}

#[inline]
#[must_use]
pub fn hash_256_64(a: H256, b: u64) -> H256 {
    Sha256::new()
        .chain_update(a)
        .chain_update(b.to_le_bytes())
        .finalize()
        .pipe_h256()
}

#[inline]
#[must_use]
pub fn hash_32_64_256(a: [u8; 4], b: u64, c: H256) -> H256 {
    Sha256::new()
        .chain_update(a)
        .chain_update(b.to_le_bytes())
        .chain_update(c)
        .finalize()
        .pipe_h256()
}

#[inline]
#[must_use]
pub fn hash_256_256(left: H256, right: H256) -> H256 {
    Sha256::new()
        .chain_update(left)
        .chain_update(right)
        .finalize()
        .pipe_h256()
}

trait DigestOutputExt {
    fn pipe_h256(self) -> H256;
}

impl DigestOutputExt for sha2::digest::Output<Sha256> {
    fn pipe_h256(self) -> H256 {
        H256(self.into())
    }
}
