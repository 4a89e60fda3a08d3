use core::{
    num::NonZeroU64,
    ops::{Index as _, Rem as _},
};

use anyhow::Result;
use bit_field::BitArray as _;
use itertools::Itertools as _;
use tap::TryConv as _;
use types::{phase0::primitives::H256, preset::Preset};

const BITS_PER_HASH: u64 = H256::len_bytes() as u64 * 8;

/// Rearranges `slice` so that `slice[i]` becomes the element at
/// [`compute_shuffled_index`]`(i)` in the original order.
///
/// The result is what committees are sliced out of.
///
/// [`compute_shuffled_index`]: https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/beacon-chain.md#compute_shuffled_index
pub fn shuffle_slice<P: Preset, T: Copy>(slice: &mut [T], seed: H256) -> Result<()> {
    let Some(index_count) = slice.len().try_conv::<u64>().map(NonZeroU64::new)? else {
        return Ok(());
    };

    let mut positions = (0..index_count.get()).collect_vec();

    // Every round needs the same handful of source hashes for all positions.
    for round in 0..P::SHUFFLE_ROUND_COUNT {
        let pivot = compute_pivot(seed, round, index_count);

        let sources = (0..=(index_count.get() - 1) / BITS_PER_HASH)
            .map(|window| compute_source(seed, round, window))
            .collect_vec();

        for index in &mut positions {
            let flip = (pivot + index_count.get() - *index) % index_count;
            let position = (*index).max(flip);
            let source = sources[(position / BITS_PER_HASH).try_conv::<usize>()?];

            if source_bit(source, position) {
                *index = flip;
            }
        }
    }

    let original = slice.to_vec();

    for (element, position) in slice.iter_mut().zip(positions) {
        *element = original[position.try_conv::<usize>()?];
    }

    Ok(())
}

#[must_use]
pub fn shuffle_single<P: Preset>(mut index: u64, index_count: NonZeroU64, seed: H256) -> u64 {
    assert!(index < index_count.get());

    for round in 0..P::SHUFFLE_ROUND_COUNT {
        let pivot = compute_pivot(seed, round, index_count);
        let flip = (pivot + index_count.get() - index) % index_count;
        let position = index.max(flip);
        let source = compute_source(seed, round, position / BITS_PER_HASH);

        if source_bit(source, position) {
            index = flip;
        }
    }

    index
}

fn compute_pivot(seed: H256, round: u8, index_count: NonZeroU64) -> u64 {
    hashing::hash_256_8(seed, round)
        .index(..size_of::<u64>())
        .try_into()
        .map(u64::from_le_bytes)
        .expect("slice has the same size as u64")
        .rem(index_count)
}

fn compute_source(seed: H256, round: u8, position_window: u64) -> H256 {
    // Truncate to match the behavior of `compute_shuffled_index` in `consensus-specs`.
    #[expect(clippy::cast_possible_truncation)]
    let position_window = position_window as u32;

    hashing::hash_256_8_32(seed, round, position_window)
}

fn source_bit(source: H256, position: u64) -> bool {
    let bit_index = position.to_le_bytes()[0].into();
    source.as_bytes().get_bit(bit_index)
}

#[cfg(test)]
mod tests {
    use nonzero_ext::nonzero;
    use test_case::test_case;
    use types::preset::{Mainnet, Minimal};

    use super::*;

    #[test_case([1, 3, 6, 9, 0, 8, 2, 5, 4, 7]; "minimal")]
    fn shuffle_minimal_matches_reference_permutation(expected: [u64; 10]) {
        assert_eq!(shuffled_0_to_10::<Minimal>(), expected);
    }

    #[test_case([8, 5, 4, 7, 1, 2, 6, 9, 0, 3]; "mainnet")]
    fn shuffle_mainnet_matches_reference_permutation(expected: [u64; 10]) {
        assert_eq!(shuffled_0_to_10::<Mainnet>(), expected);
    }

    #[test]
    fn shuffle_slice_agrees_with_shuffle_single_across_windows() {
        let seed = H256::zero();
        let count = nonzero!(300_u64);
        let mut indices = (0..count.get()).collect_vec();

        shuffle_slice::<Minimal, _>(&mut indices, seed).expect("length fits in u64");

        assert_eq!(
            indices[..12],
            [84, 110, 148, 192, 294, 64, 92, 162, 226, 7, 51, 235],
        );

        for (position, shuffled) in (0..).zip(indices) {
            assert_eq!(shuffle_single::<Minimal>(position, count, seed), shuffled);
        }
    }

    #[test]
    fn empty_slice_is_left_alone() {
        let mut indices: [u64; 0] = [];
        shuffle_slice::<Minimal, _>(&mut indices, H256::zero()).expect("length fits in u64");
    }

    fn shuffled_0_to_10<P: Preset>() -> Vec<u64> {
        let mut indices = (0..10).collect_vec();
        shuffle_slice::<P, _>(&mut indices, H256::repeat_byte(1)).expect("length fits in u64");
        indices
    }
}
