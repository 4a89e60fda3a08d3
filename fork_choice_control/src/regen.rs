use std::{collections::BTreeSet, sync::Arc};

use anyhow::{bail, Result};
use bls::SignatureOracle;
use fork_choice_store::{Error as StoreError, ProtoBlock, Store, StoreConfig};
use helper_functions::{accessors, misc};
use log::debug;
use parking_lot::Mutex;
use state_cache::{CheckpointStateCache, StateCache};
use std_ext::ArcExt as _;
use transition_functions::combined::{self, BlockVerification};
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    config::Config as ChainConfig,
    phase0::{
        containers::Checkpoint,
        primitives::{Epoch, Slot, H256},
    },
    preset::Preset,
    traits::{BeaconState as _, SignedBeaconBlock as _},
};

use crate::{
    error::{Error, RegenUnavailableReason},
    storage::{self, StateByBlockRoot, StateByCheckpoint, Storage},
};

/// Produces states for blocks known to fork choice.
///
/// States come from the in-memory caches if possible. Otherwise they are regenerated by replaying
/// blocks on top of the nearest ancestor state found in the caches or in storage.
pub struct Regen<P: Preset, S> {
    chain_config: Arc<ChainConfig>,
    store_config: StoreConfig,
    oracle: Arc<dyn SignatureOracle>,
    state_cache: StateCache<P>,
    checkpoint_states: CheckpointStateCache<P>,
    // Checkpoints whose states have been written to `storage`, ordered by root and then epoch.
    persisted_checkpoints: Mutex<BTreeSet<(H256, Epoch)>>,
    storage: Arc<S>,
}

impl<P: Preset, S: Storage> Regen<P, S> {
    #[must_use]
    pub fn new(
        chain_config: Arc<ChainConfig>,
        store_config: StoreConfig,
        oracle: Arc<dyn SignatureOracle>,
        storage: Arc<S>,
    ) -> Self {
        let timeout = store_config.state_cache_lock_timeout;

        Self {
            chain_config,
            store_config,
            oracle,
            state_cache: StateCache::new(timeout),
            checkpoint_states: CheckpointStateCache::new(timeout),
            persisted_checkpoints: Mutex::default(),
            storage,
        }
    }

    /// Returns the post-state of `block_root` advanced through empty slots up to `slot`.
    pub fn block_slot_state(
        &self,
        store: &Store<P>,
        block_root: H256,
        slot: Slot,
    ) -> Result<Arc<BeaconState<P>>> {
        let Some(block) = store.block(block_root) else {
            bail!(unavailable(RegenUnavailableReason::BlockNotInForkChoice {
                block_root
            }));
        };

        let block_slot = block.slot();

        if slot < block_slot {
            bail!(unavailable(RegenUnavailableReason::SlotBeforeBlockSlot {
                block_root,
                block_slot,
                slot,
            }));
        }

        let max_empty_slots = self.store_config.max_empty_slots;

        if slot - block_slot > max_empty_slots {
            bail!(unavailable(RegenUnavailableReason::StateFarBehind {
                block_root,
                block_slot,
                slot,
                max_empty_slots,
            }));
        }

        self.state_cache
            .get_or_insert_with(block_root, slot, |cached| {
                let mut state = match cached {
                    Some(state) => state.clone_arc(),
                    None => self.replay_post_state(store, block)?,
                };

                if state.slot() < slot {
                    combined::process_slots(&self.chain_config, state.make_mut(), slot)?;
                }

                Ok(state)
            })
    }

    /// Returns the state `block` should be applied to.
    ///
    /// If the parent of `block` is from an earlier epoch, the checkpoint state is used so that it
    /// ends up in the checkpoint cache.
    pub fn pre_state(
        &self,
        store: &Store<P>,
        block: &SignedBeaconBlock<P>,
    ) -> Result<Arc<BeaconState<P>>> {
        let block_root = block.block_root();
        let parent_root = block.message().parent_root();
        let slot = block.message().slot();

        let Some(parent) = store.block(parent_root) else {
            bail!(StoreError::UnknownParent {
                block_root,
                parent_root,
            });
        };

        let epoch = misc::compute_epoch_at_slot::<P>(slot);
        let epoch_start_slot = misc::compute_start_slot_at_epoch::<P>(epoch);

        // Blocks after long gaps are applied to the parent post-state directly.
        // `process_slots` has no bound of its own.
        if parent.epoch() < epoch
            && epoch_start_slot - parent.slot() <= self.store_config.max_empty_slots
        {
            let checkpoint = Checkpoint {
                epoch,
                root: parent_root,
            };

            return self.checkpoint_state(store, checkpoint);
        }

        self.block_slot_state(store, parent_root, parent.slot())
    }

    /// Returns the post-state of `checkpoint.root` advanced to the start of `checkpoint.epoch`.
    ///
    /// Newly computed checkpoint states are written to storage.
    pub fn checkpoint_state(
        &self,
        store: &Store<P>,
        checkpoint: Checkpoint,
    ) -> Result<Arc<BeaconState<P>>> {
        self.checkpoint_states.get_or_insert_with(checkpoint, || {
            if let Some(state) = self.stored_checkpoint_state(checkpoint)? {
                return Ok(state);
            }

            let slot = misc::compute_start_slot_at_epoch::<P>(checkpoint.epoch);
            let state = self.block_slot_state(store, checkpoint.root, slot)?;

            self.persist_checkpoint_state(checkpoint, &state)?;

            Ok(state)
        })
    }

    /// Returns the post-state of the block whose state root is `state_root`.
    ///
    /// Only blocks still present in fork choice are searched.
    pub fn state_by_state_root(
        &self,
        store: &Store<P>,
        state_root: H256,
    ) -> Result<Option<Arc<BeaconState<P>>>> {
        let Some(block) = store
            .blocks()
            .find(|block| block.state_root() == state_root)
        else {
            return Ok(None);
        };

        self.block_slot_state(store, block.block_root, block.slot())
            .map(Some)
    }

    /// Caches the post-state of a newly imported block.
    ///
    /// The state is also written to storage if it is the first one in its epoch.
    /// Nothing is cached or stored if this fails.
    pub fn insert_post_state(
        &self,
        block_root: H256,
        parent_slot: Slot,
        state: Arc<BeaconState<P>>,
    ) -> Result<()> {
        let epoch = accessors::get_current_epoch(&*state);

        self.insert_checkpoint_state_if_at_epoch_start(block_root, &state)?;
        self.state_cache.insert(block_root, state.clone_arc())?;

        if misc::compute_epoch_at_slot::<P>(parent_slot) >= epoch {
            return Ok(());
        }

        let saved = storage::save(&*self.storage, StateByBlockRoot(block_root), &*state);

        if saved.is_err() {
            self.state_cache.remove_blocks([block_root])?;
            self.checkpoint_states.remove_blocks([block_root])?;
        }

        saved
    }

    /// Caches and stores the anchor state. Regeneration of any later state starts from it.
    pub fn insert_anchor_state(&self, block_root: H256, state: Arc<BeaconState<P>>) -> Result<()> {
        storage::save(&*self.storage, StateByBlockRoot(block_root), &*state)?;

        self.insert_checkpoint_state_if_at_epoch_start(block_root, &state)?;
        self.state_cache.insert(block_root, state)
    }

    /// Drops states made unreachable by finalization.
    ///
    /// `store` must already be pruned. A state for the finalized block is kept in storage,
    /// since ancestors of it can no longer be used to regenerate states.
    pub fn prune_finalized(&self, store: &Store<P>, pruned_block_roots: &[H256]) -> Result<()> {
        let finalized_checkpoint = store.finalized_checkpoint();
        let finalized_epoch = finalized_checkpoint.epoch;
        let finalized_root = finalized_checkpoint.root;

        let Some(finalized_block) = store.block(finalized_root) else {
            bail!(unavailable(RegenUnavailableReason::BlockNotInForkChoice {
                block_root: finalized_root,
            }));
        };

        let finalized_slot = finalized_block.slot();

        if let Some(state) = self.state_cache.at_slot(finalized_root, finalized_slot)? {
            storage::save(&*self.storage, StateByBlockRoot(finalized_root), &*state)?;
        } else if !storage::contains(&*self.storage, StateByBlockRoot(finalized_root))? {
            let state = self.checkpoint_state(store, finalized_checkpoint)?;
            self.persist_checkpoint_state(finalized_checkpoint, &state)?;
        }

        self.state_cache
            .remove_blocks(pruned_block_roots.iter().copied())?;

        self.checkpoint_states
            .remove_blocks(pruned_block_roots.iter().copied())?;

        if let Some(last_pruned_slot) = finalized_slot.checked_sub(1) {
            self.state_cache.prune(last_pruned_slot)?;
        }

        self.checkpoint_states.prune(finalized_epoch)?;

        for block_root in pruned_block_roots {
            storage::delete(&*self.storage, StateByBlockRoot(*block_root))?;
        }

        let stale_checkpoints = {
            let mut persisted_checkpoints = self.persisted_checkpoints.lock();

            let (stale, retained) = core::mem::take(&mut *persisted_checkpoints)
                .into_iter()
                .partition::<Vec<_>, _>(|(root, epoch)| {
                    *epoch < finalized_epoch || pruned_block_roots.contains(root)
                });

            *persisted_checkpoints = retained.into_iter().collect();

            stale
        };

        for (root, epoch) in stale_checkpoints {
            storage::delete(&*self.storage, StateByCheckpoint(Checkpoint { epoch, root }))?;
        }

        debug!(
            "pruned states of {} blocks on finalization of epoch {finalized_epoch}",
            pruned_block_roots.len(),
        );

        Ok(())
    }

    /// Evicts in-memory states older than the configured window.
    ///
    /// Evicted states can still be regenerated from the ones in storage.
    pub fn prune_unfinalized(&self, current_slot: Slot) -> Result<()> {
        let window = self.store_config.unfinalized_states_in_memory;

        if let Some(last_pruned_slot) = current_slot.checked_sub(window) {
            self.state_cache.prune(last_pruned_slot)?;
        }

        Ok(())
    }

    #[must_use]
    pub const fn state_cache(&self) -> &StateCache<P> {
        &self.state_cache
    }

    #[must_use]
    pub const fn checkpoint_states(&self) -> &CheckpointStateCache<P> {
        &self.checkpoint_states
    }

    fn insert_checkpoint_state_if_at_epoch_start(
        &self,
        block_root: H256,
        state: &Arc<BeaconState<P>>,
    ) -> Result<()> {
        let epoch = accessors::get_current_epoch(&**state);

        if misc::compute_start_slot_at_epoch::<P>(epoch) != state.slot() {
            return Ok(());
        }

        let checkpoint = Checkpoint {
            epoch,
            root: block_root,
        };

        self.checkpoint_states.insert(checkpoint, state.clone_arc())
    }

    // Must not read from or write to `self.state_cache` for `target.block_root`.
    // The caller holds the lock for it.
    fn replay_post_state(
        &self,
        store: &Store<P>,
        target: &ProtoBlock<P>,
    ) -> Result<Arc<BeaconState<P>>> {
        if let Some(state) = self.stored_state(target.block_root)? {
            return Ok(state);
        }

        let max_blocks = self.store_config.max_blocks_to_replay::<P>();
        let mut blocks_to_replay: Vec<&ProtoBlock<P>> = vec![];
        let mut seed = None;

        for ancestor in store.iterate_ancestors(target.block_root) {
            if let Some(child) = blocks_to_replay.last() {
                if let Some(state) = self.seed_state(ancestor.block_root, child.slot())? {
                    seed = Some(state);
                    break;
                }
            }

            if u64::try_from(blocks_to_replay.len())? >= max_blocks {
                bail!(unavailable(RegenUnavailableReason::TooManyBlocksToReplay {
                    block_root: target.block_root,
                    max_blocks,
                }));
            }

            blocks_to_replay.push(ancestor);
        }

        let Some(mut state) = seed else {
            bail!(unavailable(RegenUnavailableReason::NoSeedState {
                block_root: target.block_root,
            }));
        };

        debug!(
            "replaying {} blocks to regenerate state of block {:?} starting from slot {}",
            blocks_to_replay.len(),
            target.block_root,
            state.slot(),
        );

        while let Some(block) = blocks_to_replay.pop() {
            combined::state_transition(
                &self.chain_config,
                self.oracle.as_ref(),
                state.make_mut(),
                &block.block,
                BlockVerification::trusted(),
            )?;

            if block.block_root != target.block_root {
                self.state_cache.insert(block.block_root, state.clone_arc())?;
            }
        }

        Ok(state)
    }

    // The returned state is at a slot no later than `child_slot`.
    fn seed_state(
        &self,
        block_root: H256,
        child_slot: Slot,
    ) -> Result<Option<Arc<BeaconState<P>>>> {
        if let Some(state) = self.state_cache.before_or_at_slot(block_root, child_slot)? {
            return Ok(Some(state));
        }

        let child_epoch = misc::compute_epoch_at_slot::<P>(child_slot);

        if let Some((_, state)) = self.checkpoint_states.get_latest(block_root, child_epoch)? {
            return Ok(Some(state));
        }

        if let Some(state) = self.stored_state(block_root)? {
            return Ok(Some(state));
        }

        let latest_persisted = self
            .persisted_checkpoints
            .lock()
            .range((block_root, 0)..=(block_root, child_epoch))
            .next_back()
            .copied();

        match latest_persisted {
            Some((root, epoch)) => self.stored_checkpoint_state(Checkpoint { epoch, root }),
            None => Ok(None),
        }
    }

    fn stored_state(&self, block_root: H256) -> Result<Option<Arc<BeaconState<P>>>> {
        let state = storage::get::<BeaconState<P>>(&*self.storage, StateByBlockRoot(block_root))?;
        Ok(state.map(Arc::new))
    }

    fn stored_checkpoint_state(
        &self,
        checkpoint: Checkpoint,
    ) -> Result<Option<Arc<BeaconState<P>>>> {
        let key = (checkpoint.root, checkpoint.epoch);

        if !self.persisted_checkpoints.lock().contains(&key) {
            return Ok(None);
        }

        let state = storage::get::<BeaconState<P>>(&*self.storage, StateByCheckpoint(checkpoint))?;
        Ok(state.map(Arc::new))
    }

    fn persist_checkpoint_state(
        &self,
        checkpoint: Checkpoint,
        state: &BeaconState<P>,
    ) -> Result<()> {
        let key = (checkpoint.root, checkpoint.epoch);

        if self.persisted_checkpoints.lock().contains(&key) {
            return Ok(());
        }

        storage::save(&*self.storage, StateByCheckpoint(checkpoint), state)?;
        self.persisted_checkpoints.lock().insert(key);

        Ok(())
    }
}

fn unavailable(reason: RegenUnavailableReason) -> Error {
    Error::from(reason)
}

#[cfg(test)]
mod tests {
    use bls::InsecureOracle;
    use ssz::SszHash as _;
    use std_ext::ArcExt as _;
    use types::{
        preset::Minimal,
        traits::{BeaconState as _, SignedBeaconBlock as _},
    };

    use crate::{error::ErrorKind, storage::InMemoryStorage};

    use super::*;

    struct Chain {
        config: Arc<ChainConfig>,
        store: Store<Minimal>,
        block_roots: Vec<H256>,
        states: Vec<Arc<BeaconState<Minimal>>>,
    }

    impl Chain {
        // Builds a chain with a block in every slot from genesis to `last_slot`.
        fn new(last_slot: Slot) -> Result<Self> {
            let config = Arc::new(ChainConfig::minimal());
            let (genesis_state, _) = factory::min_genesis_state::<Minimal>(&config)?;
            let genesis_block = Arc::new(genesis::beacon_block(&genesis_state));

            let mut store = Store::new(
                config.clone_arc(),
                StoreConfig::minimal::<Minimal>(),
                genesis_block.clone_arc(),
                &genesis_state,
            );

            store.update_time(last_slot)?;

            let mut block_roots = vec![genesis_block.block_root()];
            let mut states = vec![genesis_state];

            for slot in 1..=last_slot {
                let pre_state = states.last().expect("genesis state is always present");
                let (block, post_state) =
                    factory::empty_block(&config, pre_state.clone_arc(), slot, H256::zero())?;

                let block_root = block.block_root();

                store.on_block(block_root, block, &post_state)?;

                block_roots.push(block_root);
                states.push(post_state);
            }

            Ok(Self {
                config,
                store,
                block_roots,
                states,
            })
        }

        fn regen(&self, store_config: StoreConfig) -> Regen<Minimal, InMemoryStorage> {
            Regen::new(
                self.config.clone_arc(),
                store_config,
                Arc::new(InsecureOracle),
                Arc::new(InMemoryStorage::default()),
            )
        }

        fn regen_with_anchor(&self) -> Result<Regen<Minimal, InMemoryStorage>> {
            let regen = self.regen(StoreConfig::minimal::<Minimal>());
            regen.insert_anchor_state(self.block_roots[0], self.states[0].clone_arc())?;
            Ok(regen)
        }
    }

    fn unavailable_reason(error: &anyhow::Error) -> Option<RegenUnavailableReason> {
        match error.downcast_ref()? {
            Error::RegenUnavailable { reason } => Some(*reason),
            Error::AnchorMismatch { .. } => None,
        }
    }

    #[test]
    fn replays_blocks_on_top_of_anchor_state() -> Result<()> {
        let chain = Chain::new(4)?;
        let regen = chain.regen_with_anchor()?;

        let state = regen.block_slot_state(&chain.store, chain.block_roots[4], 4)?;

        assert_eq!(state.hash_tree_root(), chain.states[4].hash_tree_root());

        for block_root in &chain.block_roots[1..] {
            assert!(regen.state_cache().contains(*block_root)?);
        }

        Ok(())
    }

    #[test]
    fn advances_post_state_through_empty_slots() -> Result<()> {
        let chain = Chain::new(2)?;
        let regen = chain.regen_with_anchor()?;

        let state = regen.block_slot_state(&chain.store, chain.block_roots[2], 6)?;

        let mut expected_state = (*chain.states[2]).clone();
        combined::process_slots(&chain.config, &mut expected_state, 6)?;

        assert_eq!(state.slot(), 6);
        assert_eq!(state.hash_tree_root(), expected_state.hash_tree_root());

        Ok(())
    }

    #[test]
    fn uses_stored_state_as_seed() -> Result<()> {
        let chain = Chain::new(4)?;
        let regen = chain.regen(StoreConfig::minimal::<Minimal>());

        storage::save(
            &*regen.storage,
            StateByBlockRoot(chain.block_roots[2]),
            &*chain.states[2],
        )?;

        let state = regen.block_slot_state(&chain.store, chain.block_roots[4], 4)?;

        assert_eq!(state.hash_tree_root(), chain.states[4].hash_tree_root());
        assert!(!regen.state_cache().contains(chain.block_roots[1])?);

        Ok(())
    }

    #[test]
    fn fails_without_seed_state() -> Result<()> {
        let chain = Chain::new(3)?;
        let regen = chain.regen(StoreConfig::minimal::<Minimal>());

        let error = regen
            .block_slot_state(&chain.store, chain.block_roots[3], 3)
            .expect_err("no state should be available");

        assert_eq!(
            unavailable_reason(&error),
            Some(RegenUnavailableReason::NoSeedState {
                block_root: chain.block_roots[3],
            }),
        );

        assert_eq!(ErrorKind::of(&error), ErrorKind::RegenUnavailable);
        assert!(!regen.state_cache().contains(chain.block_roots[3])?);

        Ok(())
    }

    #[test]
    fn fails_when_too_many_blocks_need_replaying() -> Result<()> {
        let chain = Chain::new(3)?;

        let store_config = StoreConfig {
            max_epochs_to_replay: 0,
            ..StoreConfig::minimal::<Minimal>()
        };

        let regen = chain.regen(store_config);
        regen.insert_anchor_state(chain.block_roots[0], chain.states[0].clone_arc())?;

        let error = regen
            .block_slot_state(&chain.store, chain.block_roots[3], 3)
            .expect_err("replay should be refused");

        assert_eq!(
            unavailable_reason(&error),
            Some(RegenUnavailableReason::TooManyBlocksToReplay {
                block_root: chain.block_roots[3],
                max_blocks: 0,
            }),
        );

        Ok(())
    }

    #[test]
    fn checkpoint_state_is_at_start_of_epoch() -> Result<()> {
        let chain = Chain::new(3)?;
        let regen = chain.regen_with_anchor()?;

        let checkpoint = Checkpoint {
            epoch: 1,
            root: chain.block_roots[3],
        };

        let state = regen.checkpoint_state(&chain.store, checkpoint)?;

        assert_eq!(state.slot(), 8);
        assert_eq!(regen.checkpoint_states().get(checkpoint)?, Some(state));

        Ok(())
    }

    #[test]
    fn computed_checkpoint_states_are_persisted() -> Result<()> {
        let chain = Chain::new(3)?;
        let regen = chain.regen_with_anchor()?;

        let checkpoint = Checkpoint {
            epoch: 1,
            root: chain.block_roots[3],
        };

        let state = regen.checkpoint_state(&chain.store, checkpoint)?;

        assert!(regen.storage.contains(StateByCheckpoint(checkpoint)));

        regen
            .checkpoint_states()
            .remove_blocks(chain.block_roots.iter().copied())?;

        regen
            .state_cache()
            .remove_blocks(chain.block_roots.iter().copied())?;

        storage::delete(&*regen.storage, StateByBlockRoot(chain.block_roots[0]))?;

        let reloaded = regen.checkpoint_state(&chain.store, checkpoint)?;

        assert_eq!(reloaded.hash_tree_root(), state.hash_tree_root());

        Ok(())
    }

    #[test]
    fn persisted_checkpoint_state_is_used_as_seed() -> Result<()> {
        let chain = Chain::new(9)?;
        let regen = chain.regen_with_anchor()?;

        let checkpoint = Checkpoint {
            epoch: 1,
            root: chain.block_roots[7],
        };

        regen.checkpoint_state(&chain.store, checkpoint)?;

        regen
            .checkpoint_states()
            .remove_blocks(chain.block_roots.iter().copied())?;

        regen
            .state_cache()
            .remove_blocks(chain.block_roots.iter().copied())?;

        storage::delete(&*regen.storage, StateByBlockRoot(chain.block_roots[0]))?;

        let state = regen.block_slot_state(&chain.store, chain.block_roots[9], 9)?;

        assert_eq!(state.hash_tree_root(), chain.states[9].hash_tree_root());
        assert!(regen.state_cache().contains(chain.block_roots[8])?);
        assert!(!regen.state_cache().contains(chain.block_roots[6])?);

        Ok(())
    }

    #[test]
    fn only_first_post_state_of_epoch_is_stored() -> Result<()> {
        let chain = Chain::new(9)?;
        let regen = chain.regen_with_anchor()?;

        regen.insert_post_state(chain.block_roots[8], 7, chain.states[8].clone_arc())?;
        regen.insert_post_state(chain.block_roots[9], 8, chain.states[9].clone_arc())?;

        assert!(regen
            .storage
            .contains(StateByBlockRoot(chain.block_roots[8])));

        assert!(!regen
            .storage
            .contains(StateByBlockRoot(chain.block_roots[9])));

        let checkpoint = Checkpoint {
            epoch: 1,
            root: chain.block_roots[8],
        };

        assert!(regen.checkpoint_states().get(checkpoint)?.is_some());

        Ok(())
    }

    #[test]
    fn state_is_found_by_state_root() -> Result<()> {
        let chain = Chain::new(2)?;
        let regen = chain.regen_with_anchor()?;

        let state_root = chain.states[2].hash_tree_root();
        let state = regen.state_by_state_root(&chain.store, state_root)?;

        assert_eq!(state.map(|state| state.hash_tree_root()), Some(state_root));
        assert_eq!(regen.state_by_state_root(&chain.store, H256::zero())?, None);

        Ok(())
    }
}
