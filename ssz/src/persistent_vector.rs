use core::{fmt::Debug, marker::PhantomData};

use derivative::Derivative;
use ethereum_types::H256;
use im::Vector;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use typenum::{NonZero, Unsigned};

use crate::{
    error::{IndexError, ReadError},
    merkle::{self, chunk_count},
    persistent_list::usize_index,
    porcelain::SszHash,
};

/// Fixed-length vector backed by [`im::Vector`].
///
/// Ring buffers in the beacon state (block roots, RANDAO mixes, slashings) are stored in these
/// and accessed with [`PersistentVector::mod_index`].
#[derive(Derivative)]
#[derivative(
    Clone(bound = "T: Clone"),
    PartialEq(bound = "T: Clone + PartialEq"),
    Eq(bound = "T: Clone + Eq")
)]
pub struct PersistentVector<T: Clone, N> {
    elements: Vector<T>,
    phantom: PhantomData<N>,
}

impl<T: Clone + Default, N: Unsigned> Default for PersistentVector<T, N> {
    fn default() -> Self {
        Self::repeat_element(T::default())
    }
}

impl<T: Clone + Debug, N> Debug for PersistentVector<T, N> {
    fn fmt(&self, formatter: &mut core::fmt::Formatter) -> core::fmt::Result {
        formatter.debug_list().entries(&self.elements).finish()
    }
}

impl<'vector, T: Clone, N> IntoIterator for &'vector PersistentVector<T, N> {
    type Item = &'vector T;
    type IntoIter = im::vector::Iter<'vector, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl<T: Clone + Serialize, N> Serialize for PersistentVector<T, N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.elements)
    }
}

impl<'de, T: Clone + Deserialize<'de>, N: Unsigned> Deserialize<'de> for PersistentVector<T, N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Self::try_from_iter(Vec::<T>::deserialize(deserializer)?)
            .map_err(serde::de::Error::custom)
    }
}

impl<T: Clone + SszHash, N: Unsigned> SszHash for PersistentVector<T, N> {
    fn hash_tree_root(&self) -> H256 {
        merkle::merkleize(T::pack(&self.elements), chunk_count::<T>(N::U64))
    }
}

impl<T: Clone, N: Unsigned> PersistentVector<T, N> {
    #[must_use]
    pub fn repeat_element(element: T) -> Self {
        Self {
            elements: Vector::from(vec![element; N::USIZE]),
            phantom: PhantomData,
        }
    }

    pub fn try_from_iter(elements: impl IntoIterator<Item = T>) -> Result<Self, ReadError> {
        let elements = elements.into_iter().collect::<Vector<_>>();

        if elements.len() != N::USIZE {
            return Err(ReadError::VectorSizeMismatch {
                expected: N::USIZE,
                actual: elements.len(),
            });
        }

        Ok(Self {
            elements,
            phantom: PhantomData,
        })
    }

    pub fn get(&self, index: u64) -> Result<&T, IndexError> {
        let index = usize_index(index)?;

        self.elements.get(index).ok_or(IndexError::OutOfBounds {
            length: N::USIZE,
            index,
        })
    }

    pub fn iter(&self) -> im::vector::Iter<'_, T> {
        self.elements.iter()
    }

    pub fn update(&mut self, updater: impl FnMut(&mut T)) {
        self.elements.iter_mut().for_each(updater);
    }
}

impl<T: Clone, N: Unsigned + NonZero> PersistentVector<T, N> {
    #[must_use]
    pub fn mod_index(&self, index: u64) -> &T {
        &self.elements[Self::wrap(index)]
    }

    pub fn mod_index_mut(&mut self, index: u64) -> &mut T {
        &mut self.elements[Self::wrap(index)]
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "the remainder is less than N, which fits in usize"
    )]
    const fn wrap(index: u64) -> usize {
        (index % N::U64) as usize
    }
}

#[cfg(test)]
mod tests {
    use typenum::U4;

    use super::*;

    #[test]
    fn mod_index_wraps_around() {
        let mut vector = PersistentVector::<u64, U4>::default();

        *vector.mod_index_mut(6) = 42;

        assert_eq!(vector.get(2).ok(), Some(&42));
        assert_eq!(*vector.mod_index(10), 42);
    }

    #[test]
    fn try_from_iter_requires_exact_length() {
        assert_eq!(
            PersistentVector::<u64, U4>::try_from_iter([1, 2, 3]).err(),
            Some(ReadError::VectorSizeMismatch {
                expected: 4,
                actual: 3,
            }),
        );
    }

    #[test]
    fn root_of_default_vector_is_zero_subtree() {
        assert_eq!(
            PersistentVector::<H256, U4>::default().hash_tree_root(),
            hashing::ZERO_HASHES[2],
        );
    }
}
