//! Caches of beacon states shared between threads.
//!
//! Entries for a single block root are guarded by their own lock.
//! A computation started through `get_or_insert_with` holds that lock until it finishes,
//! so concurrent requests for the same block root wait for it instead of repeating it.

pub use crate::{
    checkpoint_state_cache::CheckpointStateCache,
    state_cache::{CacheLockError, StateCache},
};

mod checkpoint_state_cache;
mod state_cache;
