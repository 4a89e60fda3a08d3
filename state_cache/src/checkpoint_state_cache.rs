use core::time::Duration;
use std::sync::Arc;

use anyhow::{ensure, Result};
use helper_functions::misc;
use thiserror::Error;
use types::{
    combined::BeaconState,
    phase0::{
        containers::Checkpoint,
        primitives::{Epoch, Slot, H256},
    },
    preset::Preset,
    traits::BeaconState as _,
};

use crate::state_cache::StateCache;

#[derive(Debug, Error)]
enum Error {
    #[error("state is not at the start of the checkpoint epoch (checkpoint: {checkpoint:?}, slot: {slot})")]
    StateNotAtCheckpoint { checkpoint: Checkpoint, slot: Slot },
}

/// States at the start of checkpoint epochs.
///
/// The state for `Checkpoint { epoch, root }` is the post-state of block `root` advanced to the
/// first slot of `epoch`. Justification and attestation validation refer to these.
pub struct CheckpointStateCache<P: Preset> {
    states: StateCache<P>,
}

impl<P: Preset> CheckpointStateCache<P> {
    #[must_use]
    pub fn new(try_lock_timeout: Duration) -> Self {
        Self {
            states: StateCache::new(try_lock_timeout),
        }
    }

    pub fn get(&self, checkpoint: Checkpoint) -> Result<Option<Arc<BeaconState<P>>>> {
        self.states
            .at_slot(checkpoint.root, Self::checkpoint_slot(checkpoint))
    }

    /// Returns the latest cached checkpoint state for `block_root` with an epoch up to
    /// `max_epoch`.
    pub fn get_latest(
        &self,
        block_root: H256,
        max_epoch: Epoch,
    ) -> Result<Option<(Checkpoint, Arc<BeaconState<P>>)>> {
        let max_slot = misc::compute_start_slot_at_epoch::<P>(max_epoch);

        let latest = self
            .states
            .before_or_at_slot(block_root, max_slot)?
            .map(|state| {
                let checkpoint = Checkpoint {
                    epoch: misc::compute_epoch_at_slot::<P>(state.slot()),
                    root: block_root,
                };

                (checkpoint, state)
            });

        Ok(latest)
    }

    pub fn get_or_insert_with(
        &self,
        checkpoint: Checkpoint,
        f: impl FnOnce() -> Result<Arc<BeaconState<P>>>,
    ) -> Result<Arc<BeaconState<P>>> {
        let slot = Self::checkpoint_slot(checkpoint);

        self.states
            .get_or_insert_with(checkpoint.root, slot, |_| {
                let state = f()?;
                Self::validate(checkpoint, &state)?;
                Ok(state)
            })
    }

    pub fn insert(&self, checkpoint: Checkpoint, state: Arc<BeaconState<P>>) -> Result<()> {
        Self::validate(checkpoint, &state)?;
        self.states.insert(checkpoint.root, state)
    }

    pub fn len(&self) -> Result<usize> {
        self.states.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.states.is_empty()
    }

    /// Removes states for checkpoints older than `finalized_epoch`.
    pub fn prune(&self, finalized_epoch: Epoch) -> Result<()> {
        let finalized_slot = misc::compute_start_slot_at_epoch::<P>(finalized_epoch);

        match finalized_slot.checked_sub(1) {
            Some(last_pruned_slot) => self.states.prune(last_pruned_slot),
            None => Ok(()),
        }
    }

    pub fn remove_blocks(&self, block_roots: impl IntoIterator<Item = H256>) -> Result<()> {
        self.states.remove_blocks(block_roots)
    }

    fn validate(checkpoint: Checkpoint, state: &BeaconState<P>) -> Result<()> {
        let slot = state.slot();

        ensure!(
            slot == Self::checkpoint_slot(checkpoint),
            Error::StateNotAtCheckpoint { checkpoint, slot },
        );

        Ok(())
    }

    fn checkpoint_slot(checkpoint: Checkpoint) -> Slot {
        misc::compute_start_slot_at_epoch::<P>(checkpoint.epoch)
    }
}

#[cfg(test)]
mod tests {
    use types::{phase0::beacon_state::BeaconState as Phase0BeaconState, preset::Minimal};

    use super::*;

    const ROOT: H256 = H256::repeat_byte(1);

    fn state_at_slot(slot: Slot) -> Arc<BeaconState<Minimal>> {
        Arc::new(
            Phase0BeaconState {
                slot,
                ..Phase0BeaconState::default()
            }
            .into(),
        )
    }

    fn checkpoint(epoch: Epoch) -> Checkpoint {
        Checkpoint { epoch, root: ROOT }
    }

    #[test]
    fn get_latest_finds_newest_checkpoint_not_after_epoch() -> Result<()> {
        let cache = CheckpointStateCache::<Minimal>::new(Duration::from_secs(1));

        cache.insert(checkpoint(1), state_at_slot(8))?;
        cache.insert(checkpoint(3), state_at_slot(24))?;

        assert_eq!(cache.get_latest(ROOT, 0)?, None);
        assert_eq!(
            cache.get_latest(ROOT, 2)?,
            Some((checkpoint(1), state_at_slot(8))),
        );
        assert_eq!(
            cache.get_latest(ROOT, 5)?,
            Some((checkpoint(3), state_at_slot(24))),
        );
        assert_eq!(cache.get(checkpoint(2))?, None);

        Ok(())
    }

    #[test]
    fn rejects_states_not_at_epoch_start() {
        let cache = CheckpointStateCache::<Minimal>::new(Duration::from_secs(1));

        assert!(cache.insert(checkpoint(1), state_at_slot(9)).is_err());
        assert!(cache
            .get_or_insert_with(checkpoint(1), || Ok(state_at_slot(9)))
            .is_err());
    }

    #[test]
    fn prune_evicts_checkpoints_before_finalized_epoch() -> Result<()> {
        let cache = CheckpointStateCache::<Minimal>::new(Duration::from_secs(1));

        cache.insert(checkpoint(1), state_at_slot(8))?;
        cache.insert(checkpoint(2), state_at_slot(16))?;

        cache.prune(2)?;

        assert_eq!(cache.get(checkpoint(1))?, None);
        assert_eq!(cache.get(checkpoint(2))?, Some(state_at_slot(16)));
        assert_eq!(cache.len()?, 1);

        Ok(())
    }
}
