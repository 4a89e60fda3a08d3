use core::{fmt::Debug, marker::PhantomData};

use derivative::Derivative;
use ethereum_types::H256;
use im::Vector;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use typenum::Unsigned;

use crate::{
    error::{IndexError, PushError, ReadError},
    merkle::{self, chunk_count},
    porcelain::SszHash,
};

/// Variable-length list with a type-level maximum length.
///
/// Backed by [`im::Vector`], so clones share structure and are cheap.
#[derive(Derivative)]
#[derivative(
    Clone(bound = "T: Clone"),
    PartialEq(bound = "T: Clone + PartialEq"),
    Eq(bound = "T: Clone + Eq"),
    Default(bound = "T: Clone")
)]
pub struct PersistentList<T: Clone, N> {
    elements: Vector<T>,
    phantom: PhantomData<N>,
}

impl<T: Clone + Debug, N> Debug for PersistentList<T, N> {
    fn fmt(&self, formatter: &mut core::fmt::Formatter) -> core::fmt::Result {
        formatter.debug_list().entries(&self.elements).finish()
    }
}

impl<'list, T: Clone, N> IntoIterator for &'list PersistentList<T, N> {
    type Item = &'list T;
    type IntoIter = im::vector::Iter<'list, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl<T: Clone + Serialize, N> Serialize for PersistentList<T, N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.elements)
    }
}

impl<'de, T: Clone + Deserialize<'de>, N: Unsigned> Deserialize<'de> for PersistentList<T, N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let elements = Vec::<T>::deserialize(deserializer)?;

        if elements.len() > N::USIZE {
            return Err(serde::de::Error::custom(ReadError::ListTooLong {
                maximum: N::USIZE,
                actual: elements.len(),
            }));
        }

        Ok(Self {
            elements: elements.into_iter().collect(),
            phantom: PhantomData,
        })
    }
}

impl<T: Clone + SszHash, N: Unsigned> SszHash for PersistentList<T, N> {
    fn hash_tree_root(&self) -> H256 {
        let chunks = T::pack(&self.elements);
        let root = merkle::merkleize(chunks, chunk_count::<T>(N::U64));
        merkle::mix_in_length(root, self.elements.len())
    }
}

impl<T: Clone, N: Unsigned> PersistentList<T, N> {
    pub fn try_from_iter(elements: impl IntoIterator<Item = T>) -> Result<Self, ReadError> {
        let elements = elements.into_iter().collect::<Vector<_>>();

        if elements.len() > N::USIZE {
            return Err(ReadError::ListTooLong {
                maximum: N::USIZE,
                actual: elements.len(),
            });
        }

        Ok(Self {
            elements,
            phantom: PhantomData,
        })
    }

    pub fn push(&mut self, element: T) -> Result<(), PushError> {
        if self.elements.len() >= N::USIZE {
            return Err(PushError::ListFull);
        }

        self.elements.push_back(element);

        Ok(())
    }
}

impl<T: Clone, N> PersistentList<T, N> {
    #[must_use]
    pub fn len_u64(&self) -> u64 {
        self.elements.len() as u64
    }

    #[must_use]
    pub fn len_usize(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: u64) -> Result<&T, IndexError> {
        let index = usize_index(index)?;
        let length = self.elements.len();

        self.elements
            .get(index)
            .ok_or(IndexError::OutOfBounds { length, index })
    }

    pub fn get_mut(&mut self, index: u64) -> Result<&mut T, IndexError> {
        let index = usize_index(index)?;
        let length = self.elements.len();

        self.elements
            .get_mut(index)
            .ok_or(IndexError::OutOfBounds { length, index })
    }

    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.elements.last()
    }

    pub fn iter(&self) -> im::vector::Iter<'_, T> {
        self.elements.iter()
    }

    pub fn update(&mut self, updater: impl FnMut(&mut T)) {
        self.elements.iter_mut().for_each(updater);
    }
}

pub(crate) fn usize_index(index: u64) -> Result<usize, IndexError> {
    index
        .try_into()
        .map_err(|_| IndexError::DoesNotFitInUsize { index })
}

#[cfg(test)]
mod tests {
    use typenum::{U2, U4};

    use super::*;

    #[test]
    fn push_fails_when_list_is_full() {
        let mut list = PersistentList::<u64, U2>::default();

        list.push(1).expect("list has room for 2 elements");
        list.push(2).expect("list has room for 2 elements");

        assert!(matches!(list.push(3), Err(PushError::ListFull)));
        assert_eq!(list.len_u64(), 2);
    }

    #[test]
    fn clones_do_not_observe_later_mutations() {
        let mut original =
            PersistentList::<u64, U4>::try_from_iter([1, 2, 3]).expect("length is within limit");

        let snapshot = original.clone();

        *original.get_mut(1).expect("index is in bounds") = 20;

        assert_eq!(snapshot.get(1).ok(), Some(&2));
        assert_eq!(original.get(1).ok(), Some(&20));
        assert_ne!(snapshot.hash_tree_root(), original.hash_tree_root());
    }

    #[test]
    fn out_of_bounds_access_fails() {
        let list = PersistentList::<u64, U4>::try_from_iter([1]).expect("length is within limit");

        assert!(matches!(
            list.get(1),
            Err(IndexError::OutOfBounds {
                length: 1,
                index: 1,
            }),
        ));
    }

    #[test]
    fn try_from_iter_rejects_too_many_elements() {
        assert_eq!(
            PersistentList::<u64, U2>::try_from_iter([1, 2, 3]).err(),
            Some(ReadError::ListTooLong {
                maximum: 2,
                actual: 3,
            }),
        );
    }
}
