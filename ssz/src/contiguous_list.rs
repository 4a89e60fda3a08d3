use core::{marker::PhantomData, ops::Deref};

use derivative::Derivative;
use ethereum_types::H256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use typenum::Unsigned;

use crate::{
    error::ReadError,
    merkle::{self, chunk_count},
    porcelain::SszHash,
};

/// Small variable-length list stored in a single allocation.
///
/// Used for operation lists in blocks, which are never modified after construction.
#[derive(Derivative)]
#[derivative(
    Clone(bound = "T: Clone"),
    PartialEq(bound = "T: PartialEq"),
    Eq(bound = "T: Eq"),
    Default(bound = ""),
    Debug(bound = "T: core::fmt::Debug")
)]
pub struct ContiguousList<T, N> {
    elements: Box<[T]>,
    #[derivative(Debug = "ignore")]
    phantom: PhantomData<N>,
}

impl<T, N> Deref for ContiguousList<T, N> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.elements
    }
}

impl<'list, T, N> IntoIterator for &'list ContiguousList<T, N> {
    type Item = &'list T;
    type IntoIter = core::slice::Iter<'list, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl<T, N: Unsigned> TryFrom<Vec<T>> for ContiguousList<T, N> {
    type Error = ReadError;

    fn try_from(elements: Vec<T>) -> Result<Self, Self::Error> {
        if elements.len() > N::USIZE {
            return Err(ReadError::ListTooLong {
                maximum: N::USIZE,
                actual: elements.len(),
            });
        }

        Ok(Self {
            elements: elements.into_boxed_slice(),
            phantom: PhantomData,
        })
    }
}

impl<T, N: Unsigned> ContiguousList<T, N> {
    pub fn try_from_iter(elements: impl IntoIterator<Item = T>) -> Result<Self, ReadError> {
        elements.into_iter().collect::<Vec<_>>().try_into()
    }
}

impl<T: Serialize, N> Serialize for ContiguousList<T, N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.elements.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>, N: Unsigned> Deserialize<'de> for ContiguousList<T, N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<T>::deserialize(deserializer)?
            .try_into()
            .map_err(serde::de::Error::custom)
    }
}

impl<T: SszHash, N: Unsigned> SszHash for ContiguousList<T, N> {
    fn hash_tree_root(&self) -> H256 {
        let root = merkle::merkleize(T::pack(self.elements.iter()), chunk_count::<T>(N::U64));
        merkle::mix_in_length(root, self.elements.len())
    }
}

#[cfg(test)]
mod tests {
    use typenum::U2;

    use super::*;

    #[test]
    fn length_is_part_of_root() {
        let empty = ContiguousList::<H256, U2>::default();
        let single = ContiguousList::<H256, U2>::try_from(vec![H256::zero()])
            .expect("length is within limit");

        assert_ne!(empty.hash_tree_root(), single.hash_tree_root());
    }

    #[test]
    fn rejects_too_many_elements() {
        assert!(ContiguousList::<u64, U2>::try_from(vec![1, 2, 3]).is_err());
    }
}
