// `Controller` serializes all mutations of fork choice behind `mutation_lock`.
//
// State transitions for blocks run without holding the `Store` lock, so queries like
// `Controller::head` are not blocked by block processing. The `Store` is only locked for writing
// for the short time it takes to insert a block or record votes.

use std::sync::Arc;

use anyhow::{ensure, Result};
use bls::SignatureOracle;
use fork_choice_store::{
    AttestationAction, CheckpointChanges, Error as StoreError, ProtoBlock, Store, StoreConfig,
};
use futures::channel::mpsc::UnboundedReceiver;
use helper_functions::{accessors, misc, predicates, verifier::SingleVerifier};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use ssz::SszHash as _;
use std_ext::ArcExt as _;
use transition_functions::{
    combined::{self, BlockVerification},
    unphased,
};
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    config::Config as ChainConfig,
    phase0::{
        containers::{Attestation, AttesterSlashing, Checkpoint},
        primitives::{Gwei, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::{BeaconState as _, SignedBeaconBlock as _},
};

use crate::{
    error::Error,
    events::{Event, EventChannel},
    regen::Regen,
    storage::{self, BlockByRoot, Storage},
};

pub struct Controller<P: Preset, S> {
    chain_config: Arc<ChainConfig>,
    oracle: Arc<dyn SignatureOracle>,
    store: RwLock<Store<P>>,
    regen: Regen<P, S>,
    storage: Arc<S>,
    events: EventChannel,
    mutation_lock: Mutex<()>,
}

impl<P: Preset, S: Storage> Controller<P, S> {
    /// Initializes fork choice with `anchor_block` as the justified and finalized block.
    ///
    /// `anchor_state` must be the post-state of `anchor_block`.
    pub fn new(
        chain_config: Arc<ChainConfig>,
        store_config: StoreConfig,
        anchor_state: Arc<BeaconState<P>>,
        anchor_block: Arc<SignedBeaconBlock<P>>,
        storage: Arc<S>,
        oracle: Arc<dyn SignatureOracle>,
    ) -> Result<(Self, UnboundedReceiver<Event>)> {
        let block_root = anchor_block.block_root();
        let block_slot = anchor_block.message().slot();
        let state_slot = anchor_state.slot();

        ensure!(
            block_slot == state_slot
                && anchor_block.message().state_root() == anchor_state.hash_tree_root(),
            Error::AnchorMismatch {
                block_root,
                block_slot,
                state_slot,
            },
        );

        let store = Store::new(
            chain_config.clone_arc(),
            store_config,
            anchor_block.clone_arc(),
            &anchor_state,
        );

        let regen = Regen::new(
            chain_config.clone_arc(),
            store_config,
            oracle.clone_arc(),
            storage.clone_arc(),
        );

        regen.insert_anchor_state(block_root, anchor_state)?;
        storage::save(&*storage, BlockByRoot(block_root), &*anchor_block)?;

        let (events, receiver) = EventChannel::new();

        info!("fork choice initialized with anchor block {block_root:?} at slot {block_slot}");

        let controller = Self {
            chain_config,
            oracle,
            store: RwLock::new(store),
            regen,
            storage,
            events,
            mutation_lock: Mutex::new(()),
        };

        Ok((controller, receiver))
    }

    #[must_use]
    pub fn chain_config(&self) -> &Arc<ChainConfig> {
        &self.chain_config
    }

    #[must_use]
    pub fn slot(&self) -> Slot {
        self.store.read().slot()
    }

    /// Returns the head computed by the latest call to [`Controller::update_head`].
    ///
    /// Block imports and ticks update the head automatically.
    #[must_use]
    pub fn head(&self) -> ProtoBlock<P> {
        self.store.read().head().clone()
    }

    pub fn head_state(&self) -> Result<Arc<BeaconState<P>>> {
        let store = self.store.read();
        let head = store.head();
        self.regen.block_slot_state(&store, head.block_root, head.slot())
    }

    #[must_use]
    pub fn justified_checkpoint(&self) -> Checkpoint {
        self.store.read().justified_checkpoint()
    }

    #[must_use]
    pub fn finalized_checkpoint(&self) -> Checkpoint {
        self.store.read().finalized_checkpoint()
    }

    #[must_use]
    pub fn best_justified_checkpoint(&self) -> Checkpoint {
        self.store.read().best_justified_checkpoint()
    }

    #[must_use]
    pub fn contains_block(&self, block_root: H256) -> bool {
        self.store.read().has_block(block_root)
    }

    #[must_use]
    pub fn is_descendant(&self, ancestor_root: H256, descendant_root: H256) -> bool {
        self.store
            .read()
            .is_descendant(ancestor_root, descendant_root)
    }

    /// Returns the total effective balance of votes for `block_root` and its descendants.
    ///
    /// Votes recorded since the last call to [`Self::update_head`] are not included.
    #[must_use]
    pub fn weight(&self, block_root: H256) -> Option<Gwei> {
        self.store.read().weight(block_root)
    }

    #[must_use]
    pub fn block(&self, block_root: H256) -> Option<ProtoBlock<P>> {
        self.store.read().block(block_root).cloned()
    }

    /// Returns the post-state of `block_root` advanced to `slot`.
    ///
    /// Used to obtain the state a proposer builds a block on.
    pub fn block_slot_state(&self, block_root: H256, slot: Slot) -> Result<Arc<BeaconState<P>>> {
        self.regen
            .block_slot_state(&self.store.read(), block_root, slot)
    }

    pub fn pre_state(&self, block: &SignedBeaconBlock<P>) -> Result<Arc<BeaconState<P>>> {
        self.regen.pre_state(&self.store.read(), block)
    }

    pub fn checkpoint_state(&self, checkpoint: Checkpoint) -> Result<Arc<BeaconState<P>>> {
        self.regen.checkpoint_state(&self.store.read(), checkpoint)
    }

    pub fn state_by_state_root(&self, state_root: H256) -> Result<Option<Arc<BeaconState<P>>>> {
        self.regen
            .state_by_state_root(&self.store.read(), state_root)
    }

    /// Advances the fork choice clock to `slot`.
    pub fn on_tick(&self, slot: Slot) -> Result<()> {
        let _mutation_guard = self.mutation_lock.lock();

        {
            let store = self.store.read();
            let best_justified_checkpoint = store.best_justified_checkpoint();

            // The best justified checkpoint may be adopted at the start of an epoch.
            if misc::compute_epoch_at_slot::<P>(slot) > store.current_epoch()
                && store.has_block(best_justified_checkpoint.root)
            {
                self.prepare_justified_state(&store, best_justified_checkpoint)?;
            }
        }

        let mut store = self.store.write();
        let old_head = store.head().clone();
        let changes = store.update_time(slot)?;

        self.apply_checkpoint_changes(&mut store, &changes)?;
        self.update_head_and_notify(&mut store, &old_head)?;

        drop(store);

        self.regen.prune_unfinalized(slot)
    }

    /// Runs the state transition for `block` and adds it to fork choice.
    ///
    /// Attestations and attester slashings in the block are applied to fork choice as well.
    /// Importing a block that is already known does nothing.
    /// If validation, the state transition or a storage write fails, neither fork choice nor
    /// storage contain the block.
    pub fn on_block(
        &self,
        block: Arc<SignedBeaconBlock<P>>,
        verification: BlockVerification,
    ) -> Result<H256> {
        let _mutation_guard = self.mutation_lock.lock();

        let block_root = block.block_root();
        let slot = block.message().slot();
        let parent_root = block.message().parent_root();

        let (pre_state, parent_slot) = {
            let store = self.store.read();

            if store.has_block(block_root) {
                debug!("ignoring known block {block_root:?} at slot {slot}");
                return Ok(block_root);
            }

            store.validate_block(block_root, &block)?;

            let Some(parent) = store.block(parent_root) else {
                return Err(StoreError::UnknownParent {
                    block_root,
                    parent_root,
                }
                .into());
            };

            (self.regen.pre_state(&store, &block)?, parent.slot())
        };

        let mut post_state = pre_state;

        combined::state_transition(
            &self.chain_config,
            self.oracle.as_ref(),
            post_state.make_mut(),
            &block,
            verification,
        )?;

        self.prepare_justified_state(
            &self.store.read(),
            post_state.current_justified_checkpoint(),
        )?;

        storage::save(&*self.storage, BlockByRoot(block_root), &*block)?;

        let inserted = self
            .regen
            .insert_post_state(block_root, parent_slot, post_state.clone_arc());

        if inserted.is_err() {
            storage::delete(&*self.storage, BlockByRoot(block_root))?;
        }

        inserted?;

        // The store cannot have changed since the block was validated.
        let mut store = self.store.write();
        let old_head = store.head().clone();
        let changes = store.on_block(block_root, block.clone_arc(), &post_state)?;

        debug!("imported block {block_root:?} at slot {slot}");

        let body = block.message().body();

        for attestation in body.attestations() {
            let action = accessors::get_indexed_attestation(&*post_state, attestation)
                .and_then(|indexed| store.on_attestation(&indexed, true));

            if let Err(error) = action {
                debug!("attestation in block {block_root:?} ignored by fork choice: {error:#}");
            }
        }

        for attester_slashing in body.attester_slashings() {
            store.on_attester_slashing(accessors::slashable_indices(attester_slashing));
        }

        self.apply_checkpoint_changes(&mut store, &changes)?;
        self.update_head_and_notify(&mut store, &old_head)?;

        Ok(block_root)
    }

    /// Validates `attestation` against the state at its target and records its votes.
    ///
    /// Votes only affect the head the next time it is computed.
    pub fn on_attestation(&self, attestation: &Attestation<P>) -> Result<AttestationAction> {
        let _mutation_guard = self.mutation_lock.lock();

        let target = attestation.data.target;

        let indexed_attestation = {
            let store = self.store.read();

            store.validate_on_attestation(attestation.data, false)?;

            let target_state = self.regen.checkpoint_state(&store, target)?;
            let indexed_attestation =
                accessors::get_indexed_attestation(&*target_state, attestation)?;

            predicates::validate_received_indexed_attestation(
                &self.chain_config,
                &*target_state,
                &indexed_attestation,
                SingleVerifier::new(self.oracle.as_ref()),
            )?;

            indexed_attestation
        };

        self.store
            .write()
            .on_attestation(&indexed_attestation, false)
    }

    /// Validates `attester_slashing` against the head state and stops counting votes of the
    /// slashable validators.
    pub fn on_attester_slashing(
        &self,
        attester_slashing: &AttesterSlashing<P>,
    ) -> Result<Vec<ValidatorIndex>> {
        let _mutation_guard = self.mutation_lock.lock();

        let head_state = self.head_state()?;

        let slashable_indices = unphased::validate_attester_slashing_with_verifier(
            &self.chain_config,
            &*head_state,
            attester_slashing,
            SingleVerifier::new(self.oracle.as_ref()),
        )?;

        self.store
            .write()
            .on_attester_slashing(slashable_indices.iter().copied());

        info!("validators {slashable_indices:?} marked as equivocating");

        Ok(slashable_indices)
    }

    /// Applies votes recorded since the head was last computed.
    pub fn update_head(&self) -> Result<ProtoBlock<P>> {
        let _mutation_guard = self.mutation_lock.lock();

        let mut store = self.store.write();
        let old_head = store.head().clone();

        self.update_head_and_notify(&mut store, &old_head)?;

        Ok(store.head().clone())
    }

    fn apply_checkpoint_changes(
        &self,
        store: &mut Store<P>,
        changes: &CheckpointChanges,
    ) -> Result<()> {
        if changes.justified_checkpoint_updated {
            let justified_checkpoint = store.justified_checkpoint();

            // Prepared by `Self::prepare_justified_state` before the store was modified.
            let state = self.regen.checkpoint_state(store, justified_checkpoint)?;

            store.update_justified_balances(fork_choice_store::justified_balances(&*state));

            debug!("justified checkpoint updated to {justified_checkpoint:?}");
        }

        if changes.finalized_checkpoint_updated {
            let finalized_checkpoint = store.finalized_checkpoint();

            self.regen
                .prune_finalized(store, &changes.pruned_block_roots)?;

            for block_root in &changes.pruned_block_roots {
                storage::delete(&*self.storage, BlockByRoot(*block_root))?;
            }

            info!(
                "finalized checkpoint updated to {finalized_checkpoint:?}, \
                 pruned {} blocks",
                changes.pruned_block_roots.len(),
            );

            self.events.send_finalized_event(store);
        }

        Ok(())
    }

    // Computes the state of `checkpoint` in case fork choice switches to it.
    // Checkpoints with roots unknown to fork choice, like the zeroed ones in genesis states,
    // cannot become justified.
    fn prepare_justified_state(&self, store: &Store<P>, checkpoint: Checkpoint) -> Result<()> {
        if checkpoint == store.justified_checkpoint() || !store.has_block(checkpoint.root) {
            return Ok(());
        }

        self.regen.checkpoint_state(store, checkpoint)?;

        Ok(())
    }

    fn update_head_and_notify(&self, store: &mut Store<P>, old_head: &ProtoBlock<P>) -> Result<()> {
        let new_head_root = store.update_head()?.block_root;

        if new_head_root == old_head.block_root {
            return Ok(());
        }

        if !store.is_descendant(old_head.block_root, new_head_root) {
            warn!(
                "chain reorganized from {:?} at slot {} to {new_head_root:?}",
                old_head.block_root,
                old_head.slot(),
            );
        }

        debug!("head changed to {new_head_root:?}");

        self.events.send_head_events(store, old_head);

        Ok(())
    }
}
