//! Hashing side of the consensus codec.
//!
//! Values are fingerprinted with [`SszHash::hash_tree_root`]. Large collections in the beacon
//! state are backed by persistent vectors so that cloning a state shares structure with the
//! original.

pub use ethereum_types::H256;

pub use crate::{
    bit_list::BitList,
    bit_vector::BitVector,
    contiguous_list::ContiguousList,
    error::{IndexError, PushError, ReadError},
    merkle::{chunk_count, merkleize, merkleize_bytes, merkleize_fields, mix_in_length},
    persistent_list::PersistentList,
    persistent_vector::PersistentVector,
    porcelain::SszHash,
};

mod basic;
mod bit_list;
mod bit_vector;
mod contiguous_list;
mod error;
mod merkle;
mod persistent_list;
mod persistent_vector;
mod porcelain;

/// Implements [`SszHash`] for a container by merkleizing the roots of its fields in order.
#[macro_export]
macro_rules! impl_ssz_hash {
    ($type:ident $(<$generic:ident: $bound:path>)? { $($field:ident),+ $(,)? }) => {
        impl$(<$generic: $bound>)? $crate::SszHash for $type$(<$generic>)? {
            fn hash_tree_root(&self) -> $crate::H256 {
                $crate::merkleize_fields([$($crate::SszHash::hash_tree_root(&self.$field)),+])
            }
        }
    };
}
