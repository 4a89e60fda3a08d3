//! An implementation of the [Fork Choice specification] on top of a proto-array.
//!
//! [Fork Choice specification]: https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/fork-choice.md
//!
//! Blocks are stored in an array ordered so that parents precede their children.
//! Each node caches the total weight of its subtree along with pointers to its best child and
//! best descendant. Computing the head is a lookup of the best descendant of the justified block
//! once weights have been updated.
//!
//! Votes are tracked per validator. [`Store::update_head`] moves the weight of every vote that
//! changed since the previous call and propagates the differences to ancestors in a single pass.
//! The proposer boost (if enabled in [`types::config::Config`]) is applied the same way.
//!
//! The [`Store`] does not run the state transition and does not verify signatures.
//! Callers are expected to do both before passing blocks and attestations to it.

pub use crate::{
    error::Error,
    misc::{
        justified_balances, AttestationAction, CheckpointChanges, LatestMessage, ProtoBlock,
        QueuedAttestation, VoteTracker,
    },
    proto_array::{Difference, Viability},
    store::Store,
    store_config::{StoreConfig, DEFAULT_CACHE_LOCK_TIMEOUT_MILLIS},
};

mod error;
mod misc;
mod proto_array;
mod store;
mod store_config;
