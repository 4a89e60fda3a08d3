use core::time::Duration;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use im::{HashMap, OrdMap};
use log::{debug, warn};
use parking_lot::{Mutex, MutexGuard};
use std_ext::ArcExt as _;
use tap::Pipe as _;
use thiserror::Error;
use types::{
    combined::BeaconState,
    phase0::primitives::{Slot, H256},
    preset::Preset,
    traits::BeaconState as _,
};

type StateMap<P> = OrdMap<Slot, Arc<BeaconState<P>>>;
type StateMapLock<P> = Arc<Mutex<StateMap<P>>>;

#[derive(Debug, Error)]
pub enum CacheLockError {
    #[error("could not obtain state cache lock in {} ms", timeout.as_millis())]
    CacheLockTimeout { timeout: Duration },
    #[error(
        "could not obtain state cache lock in {} ms with block root {block_root:?}",
        timeout.as_millis(),
    )]
    StateMapLockTimeout { block_root: H256, timeout: Duration },
}

/// States keyed by the root of the latest block applied to them and their slot.
///
/// A state stored under `(block_root, slot)` is the post-state of `block_root` advanced through
/// empty slots up to `slot`.
pub struct StateCache<P: Preset> {
    cache: Mutex<HashMap<H256, StateMapLock<P>>>,
    try_lock_timeout: Duration,
}

impl<P: Preset> StateCache<P> {
    #[must_use]
    pub fn new(try_lock_timeout: Duration) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            try_lock_timeout,
        }
    }

    /// Returns the latest state for `block_root` at or before `slot`.
    pub fn before_or_at_slot(
        &self,
        block_root: H256,
        slot: Slot,
    ) -> Result<Option<Arc<BeaconState<P>>>> {
        let Some(state_map_lock) = self.get_by_root(block_root)? else {
            return Ok(None);
        };

        let state = self
            .try_lock_map(&state_map_lock, block_root)?
            .get_prev(&slot)
            .map(|(_, state)| state.clone_arc());

        Ok(state)
    }

    pub fn at_slot(&self, block_root: H256, slot: Slot) -> Result<Option<Arc<BeaconState<P>>>> {
        Ok(self
            .before_or_at_slot(block_root, slot)?
            .filter(|state| state.slot() == slot))
    }

    /// Returns the state at `slot` for `block_root`, computing it with `f` if it is missing.
    ///
    /// `f` is passed the latest cached state before `slot`, if any.
    /// Concurrent calls for the same block root are serialized,
    /// so a state is computed at most once even if requested by multiple threads.
    /// If the lock cannot be obtained in time, `f` is called without caching the result.
    pub fn get_or_insert_with(
        &self,
        block_root: H256,
        slot: Slot,
        f: impl FnOnce(Option<&Arc<BeaconState<P>>>) -> Result<Arc<BeaconState<P>>>,
    ) -> Result<Arc<BeaconState<P>>> {
        let state_map_lock = match self.get_or_init_by_root(block_root) {
            Ok(lock) => lock,
            Err(error) => {
                if error.is::<CacheLockError>() {
                    return f(None);
                }

                return Err(error);
            }
        };

        let mut state_map_guard = match self.try_lock_map(&state_map_lock, block_root) {
            Ok(guard) => guard,
            Err(error) => {
                if error.is::<CacheLockError>() {
                    return f(None);
                }

                return Err(error);
            }
        };

        let pre_state = state_map_guard.get_prev(&slot).map(|(_, state)| state);

        if let Some(state) = pre_state {
            if state.slot() == slot {
                return Ok(state.clone_arc());
            }
        }

        let post_state = match f(pre_state) {
            Ok(post_state) => post_state,
            Err(error) => {
                if state_map_guard.is_empty() {
                    drop(state_map_guard);
                    self.try_lock_cache()?.remove(&block_root);
                }

                return Err(error);
            }
        };

        state_map_guard.insert(post_state.slot(), post_state.clone_arc());

        Ok(post_state)
    }

    pub fn insert(&self, block_root: H256, state: Arc<BeaconState<P>>) -> Result<()> {
        let state_map_lock = self.get_or_init_by_root(block_root)?;

        self.try_lock_map(&state_map_lock, block_root)?
            .insert(state.slot(), state);

        Ok(())
    }

    pub fn contains(&self, block_root: H256) -> Result<bool> {
        Ok(self.try_lock_cache()?.contains_key(&block_root))
    }

    pub fn len(&self) -> Result<usize> {
        let lengths = self
            .all_state_map_locks()?
            .into_iter()
            .map(|(block_root, state_map_lock)| {
                self.try_lock_map(&state_map_lock, block_root)?
                    .len()
                    .pipe(Ok)
            })
            .collect::<Result<Vec<_>>>()?;

        lengths.into_iter().sum::<usize>().pipe(Ok)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Removes all states with slots up to and including `last_pruned_slot`.
    ///
    /// States for block roots locked by other threads are left in place.
    pub fn prune(&self, last_pruned_slot: Slot) -> Result<()> {
        for (block_root, state_map_lock) in self.all_state_map_locks()? {
            let Ok(mut state_map) = self.try_lock_map(&state_map_lock, block_root) else {
                continue;
            };

            let (_, retained) = state_map.split(&last_pruned_slot);
            *state_map = retained;
        }

        self.try_lock_cache()?.retain(|block_root, state_map_lock| {
            self.try_lock_map(state_map_lock, *block_root)
                .ok()
                .is_none_or(|state_map| !state_map.is_empty())
        });

        debug!("pruned state cache up to slot {last_pruned_slot}");

        Ok(())
    }

    /// Removes all states for the given block roots.
    pub fn remove_blocks(&self, block_roots: impl IntoIterator<Item = H256>) -> Result<()> {
        let mut cache = self.try_lock_cache()?;

        for block_root in block_roots {
            cache.remove(&block_root);
        }

        Ok(())
    }

    fn all_state_map_locks(&self) -> Result<Vec<(H256, StateMapLock<P>)>> {
        self.try_lock_cache()?
            .iter()
            .map(|(block_root, state_map_lock)| (*block_root, state_map_lock.clone_arc()))
            .collect::<Vec<_>>()
            .pipe(Ok)
    }

    fn get_or_init_by_root(&self, block_root: H256) -> Result<StateMapLock<P>> {
        self.try_lock_cache()?
            .entry(block_root)
            .or_insert_with(StateMapLock::default)
            .clone_arc()
            .pipe(Ok)
    }

    fn get_by_root(&self, block_root: H256) -> Result<Option<StateMapLock<P>>> {
        self.try_lock_cache()?.get(&block_root).cloned().pipe(Ok)
    }

    fn try_lock_cache(&self) -> Result<MutexGuard<HashMap<H256, StateMapLock<P>>>> {
        let timeout = self.try_lock_timeout;

        self.cache.try_lock_for(timeout).ok_or_else(|| {
            let error = CacheLockError::CacheLockTimeout { timeout };

            warn!("{error:?}");

            anyhow!(error)
        })
    }

    fn try_lock_map<'map>(
        &self,
        state_map_lock: &'map StateMapLock<P>,
        block_root: H256,
    ) -> Result<MutexGuard<'map, StateMap<P>>> {
        let timeout = self.try_lock_timeout;

        state_map_lock.try_lock_for(timeout).ok_or_else(|| {
            let error = CacheLockError::StateMapLockTimeout {
                block_root,
                timeout,
            };

            warn!("{error:?}");

            anyhow!(error)
        })
    }
}
