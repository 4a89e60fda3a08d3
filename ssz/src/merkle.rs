use ethereum_types::H256;
use hashing::ZERO_HASHES;

use crate::porcelain::SszHash;

/// Number of chunks needed to hold `length` values of type `T`.
#[must_use]
pub fn chunk_count<T: SszHash>(length: u64) -> u64 {
    let packing_factor = T::PACKING_FACTOR as u64;
    length.div_ceil(packing_factor)
}

/// Merkleizes `chunks` into a tree with room for `limit` chunks.
///
/// Missing leaves are filled in with precomputed zero subtrees, so sparse trees with huge limits
/// (like the validator registry) cost time proportional to the number of chunks present.
///
/// # Panics
///
/// Panics if there are more chunks than `limit` allows.
#[must_use]
pub fn merkleize(mut chunks: Vec<H256>, limit: u64) -> H256 {
    let limit = limit.max(1);

    assert!(chunks.len() as u64 <= limit);

    let depth = limit.next_power_of_two().trailing_zeros() as usize;

    if chunks.is_empty() {
        return ZERO_HASHES[depth];
    }

    for height in 0..depth {
        if chunks.len() % 2 == 1 {
            chunks.push(ZERO_HASHES[height]);
        }

        chunks = chunks
            .chunks_exact(2)
            .map(|pair| hashing::hash_256_256(pair[0], pair[1]))
            .collect();
    }

    chunks[0]
}

#[must_use]
pub fn merkleize_fields<const N: usize>(roots: [H256; N]) -> H256 {
    merkleize(roots.to_vec(), N as u64)
}

/// Splits `bytes` into zero-padded chunks and merkleizes them.
#[must_use]
pub fn merkleize_bytes(bytes: &[u8], limit: u64) -> H256 {
    let chunks = bytes
        .chunks(H256::len_bytes())
        .map(|chunk| {
            let mut padded = H256::zero();
            padded[..chunk.len()].copy_from_slice(chunk);
            padded
        })
        .collect();

    merkleize(chunks, limit)
}

#[must_use]
pub fn mix_in_length(root: H256, length: usize) -> H256 {
    let mut length_chunk = H256::zero();
    length_chunk[..size_of::<u64>()].copy_from_slice(&(length as u64).to_le_bytes());
    hashing::hash_256_256(root, length_chunk)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(0, 1 => ZERO_HASHES[0])]
    #[test_case(0, 4 => ZERO_HASHES[2])]
    #[test_case(0, 5 => ZERO_HASHES[3])]
    fn merkleize_empty(length: usize, limit: u64) -> H256 {
        merkleize(vec![H256::zero(); length], limit)
    }

    #[test]
    fn merkleize_single_chunk_is_identity() {
        let chunk = H256::repeat_byte(1);
        assert_eq!(merkleize(vec![chunk], 1), chunk);
    }

    #[test]
    fn merkleize_pads_with_zero_subtrees() {
        let a = H256::repeat_byte(1);
        let b = H256::repeat_byte(2);
        let c = H256::repeat_byte(3);

        let expected = hashing::hash_256_256(
            hashing::hash_256_256(a, b),
            hashing::hash_256_256(c, H256::zero()),
        );

        assert_eq!(merkleize(vec![a, b, c], 4), expected);
        assert_eq!(
            merkleize(vec![a, b, c], 8),
            hashing::hash_256_256(expected, ZERO_HASHES[2]),
        );
    }

    #[test]
    fn mix_in_length_writes_little_endian_prefix() {
        let root = H256::repeat_byte(9);
        let mut length_chunk = H256::zero();
        length_chunk.as_mut()[0] = 3;

        assert_eq!(
            mix_in_length(root, 3),
            hashing::hash_256_256(root, length_chunk),
        );
    }
}
