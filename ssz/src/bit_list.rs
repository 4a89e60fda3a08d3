use core::marker::PhantomData;

use bitvec::{order::Lsb0, vec::BitVec};
use derivative::Derivative;
use ethereum_types::H256;
use serde::{Deserialize, Serialize};
use typenum::Unsigned;

use crate::{error::ReadError, merkle};

#[derive(Derivative, Deserialize, Serialize)]
#[derivative(Clone, PartialEq, Eq, Default(bound = ""), Debug)]
#[serde(bound = "")]
pub struct BitList<N> {
    bits: BitVec<u8, Lsb0>,
    #[derivative(Debug = "ignore")]
    #[serde(skip)]
    phantom: PhantomData<N>,
}

impl<N: Unsigned> BitList<N> {
    pub fn with_length(length: usize) -> Result<Self, ReadError> {
        if length > N::USIZE {
            return Err(ReadError::BitListTooLong {
                maximum: N::USIZE,
                actual: length,
            });
        }

        Ok(Self {
            bits: BitVec::repeat(false, length),
            phantom: PhantomData,
        })
    }
}

impl<N> BitList<N> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

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

    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.bits.count_ones()
    }

    #[must_use]
    pub fn any(&self) -> bool {
        self.bits.any()
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter().by_vals()
    }
}

impl<N: Unsigned> crate::SszHash for BitList<N> {
    fn hash_tree_root(&self) -> H256 {
        let limit = N::U64.div_ceil(256);
        let root = merkle::merkleize_bytes(self.bits.as_raw_slice(), limit);
        merkle::mix_in_length(root, self.bits.len())
    }
}
