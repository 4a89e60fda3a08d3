use core::{marker::PhantomData, ops::Range};

use bitvec::{order::Lsb0, vec::BitVec};
use derivative::Derivative;
use ethereum_types::H256;
use serde::{Deserialize, Serialize};
use typenum::Unsigned;

use crate::merkle;

#[derive(Derivative, Deserialize, Serialize)]
#[derivative(Clone, PartialEq, Eq, Debug)]
#[serde(bound = "")]
pub struct BitVector<N> {
    bits: BitVec<u8, Lsb0>,
    #[derivative(Debug = "ignore")]
    #[serde(skip)]
    phantom: PhantomData<N>,
}

impl<N: Unsigned> Default for BitVector<N> {
    fn default() -> Self {
        Self {
            bits: BitVec::repeat(false, N::USIZE),
            phantom: PhantomData,
        }
    }
}

impl<N> BitVector<N> {
    #[must_use]
    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index).map(|bit| *bit)
    }

    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn set(&mut self, index: usize, value: bool) {
        self.bits.set(index, value);
    }

    /// Returns `true` if every bit in `range` is set.
    #[must_use]
    pub fn all_in(&self, range: Range<usize>) -> bool {
        self.bits
            .get(range)
            .is_some_and(|bits| bits.all())
    }

    /// Moves every bit to the next higher index, dropping the highest one and clearing bit 0.
    pub fn shift_up_by_1(&mut self) {
        self.bits.shift_right(1);
    }

    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.bits.count_ones()
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter().by_vals()
    }
}

impl<N: Unsigned> crate::SszHash for BitVector<N> {
    fn hash_tree_root(&self) -> H256 {
        merkle::merkleize_bytes(self.bits.as_raw_slice(), N::U64.div_ceil(256))
    }
}

#[cfg(test)]
mod tests {
    use typenum::U4;

    use super::*;

    #[test]
    fn shift_up_by_1_moves_bits_towards_higher_indices() {
        let mut bits = BitVector::<U4>::default();

        bits.set(0, true);
        bits.set(3, true);
        bits.shift_up_by_1();

        itertools::assert_equal(bits.iter(), [false, true, false, false]);
    }

    #[test]
    fn all_in_checks_every_bit_in_range() {
        let mut bits = BitVector::<U4>::default();

        bits.set(1, true);
        bits.set(2, true);

        assert!(bits.all_in(1..3));
        assert!(!bits.all_in(0..3));
        assert!(!bits.all_in(2..5));
    }
}
