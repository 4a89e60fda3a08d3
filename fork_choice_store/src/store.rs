use std::{collections::HashSet, sync::Arc};

use anyhow::{ensure, Result};
use helper_functions::{accessors, misc};
use ssz::SszHash as _;
use typenum::Unsigned as _;
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    config::Config as ChainConfig,
    phase0::{
        containers::{AttestationData, Checkpoint, IndexedAttestation},
        primitives::{Epoch, Gwei, Slot, ValidatorIndex, H256},
    },
    preset::Preset,
    traits::{BeaconState as _, SignedBeaconBlock as _},
};

use crate::{
    error::Error,
    misc::{
        self as store_misc, AttestationAction, CheckpointChanges, LatestMessage, ProtoBlock,
        QueuedAttestation, VoteTracker,
    },
    proto_array::{Difference, ProtoArray, Viability},
    store_config::StoreConfig,
};

/// [`Store`](https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/fork-choice.md#store)
/// backed by a proto-array.
///
/// Votes are recorded by [`Store::on_attestation`] but only affect weights when
/// [`Store::update_head`] is called.
#[derive(Clone)]
pub struct Store<P: Preset> {
    chain_config: Arc<ChainConfig>,
    store_config: StoreConfig,
    slot: Slot,
    anchor_epoch: Epoch,
    justified_checkpoint: Checkpoint,
    finalized_checkpoint: Checkpoint,
    best_justified_checkpoint: Checkpoint,
    // Effective balances in the state at `justified_checkpoint`.
    justified_balances: Arc<[Gwei]>,
    // Balances that the weights in `proto_array` were last computed with.
    applied_balances: Arc<[Gwei]>,
    proposer_boost_root: H256,
    applied_proposer_boost: Option<(H256, Gwei)>,
    equivocating_indices: HashSet<ValidatorIndex>,
    votes: Vec<VoteTracker>,
    queued_attestations: Vec<QueuedAttestation>,
    proto_array: ProtoArray<P>,
    head: ProtoBlock<P>,
}

impl<P: Preset> Store<P> {
    /// [`get_forkchoice_store`](https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/fork-choice.md#get_forkchoice_store)
    ///
    /// # Panics
    ///
    /// Panics if `anchor_block` does not correspond to `anchor_state`.
    #[must_use]
    pub fn new(
        chain_config: Arc<ChainConfig>,
        store_config: StoreConfig,
        anchor_block: Arc<SignedBeaconBlock<P>>,
        anchor_state: &BeaconState<P>,
    ) -> Self {
        let block_root = anchor_block.block_root();
        let anchor_epoch = accessors::get_current_epoch(anchor_state);

        assert_eq!(anchor_block.message().slot(), anchor_state.slot());
        assert_eq!(
            anchor_block.message().state_root(),
            anchor_state.hash_tree_root(),
        );

        let checkpoint = Checkpoint {
            epoch: anchor_epoch,
            root: block_root,
        };

        let anchor = ProtoBlock {
            block_root,
            block: anchor_block,
            justified_checkpoint: checkpoint,
            finalized_checkpoint: checkpoint,
        };

        let justified_balances = store_misc::justified_balances(anchor_state);

        Self {
            chain_config,
            store_config,
            slot: anchor_state.slot(),
            anchor_epoch,
            justified_checkpoint: checkpoint,
            finalized_checkpoint: checkpoint,
            best_justified_checkpoint: checkpoint,
            applied_balances: justified_balances.clone(),
            justified_balances,
            proposer_boost_root: H256::zero(),
            applied_proposer_boost: None,
            equivocating_indices: HashSet::new(),
            votes: vec![],
            queued_attestations: vec![],
            proto_array: ProtoArray::new(anchor.clone()),
            head: anchor,
        }
    }

    #[must_use]
    pub fn chain_config(&self) -> &ChainConfig {
        &self.chain_config
    }

    #[must_use]
    pub const fn store_config(&self) -> &StoreConfig {
        &self.store_config
    }

    #[must_use]
    pub const fn slot(&self) -> Slot {
        self.slot
    }

    #[must_use]
    pub fn current_epoch(&self) -> Epoch {
        misc::compute_epoch_at_slot::<P>(self.slot)
    }

    #[must_use]
    pub fn previous_epoch(&self) -> Epoch {
        self.current_epoch().saturating_sub(1)
    }

    #[must_use]
    pub const fn justified_checkpoint(&self) -> Checkpoint {
        self.justified_checkpoint
    }

    #[must_use]
    pub const fn finalized_checkpoint(&self) -> Checkpoint {
        self.finalized_checkpoint
    }

    #[must_use]
    pub const fn best_justified_checkpoint(&self) -> Checkpoint {
        self.best_justified_checkpoint
    }

    #[must_use]
    pub const fn proposer_boost_root(&self) -> H256 {
        self.proposer_boost_root
    }

    /// Returns the head as of the last call to [`Store::update_head`].
    #[must_use]
    pub const fn head(&self) -> &ProtoBlock<P> {
        &self.head
    }

    #[must_use]
    pub fn has_block(&self, block_root: H256) -> bool {
        self.proto_array.contains(block_root)
    }

    #[must_use]
    pub fn block(&self, block_root: H256) -> Option<&ProtoBlock<P>> {
        self.proto_array.get(block_root)
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.proto_array.len()
    }

    #[must_use]
    pub fn weight(&self, block_root: H256) -> Option<Gwei> {
        self.proto_array.weight(block_root)
    }

    /// Blocks without children, including ones that cannot become the head.
    pub fn heads(&self) -> impl Iterator<Item = &ProtoBlock<P>> {
        self.proto_array.leaves()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &ProtoBlock<P>> {
        self.proto_array.iter()
    }

    /// Iterates over the block with `block_root` and its ancestors down to the finalized block.
    pub fn iterate_ancestors(&self, block_root: H256) -> impl Iterator<Item = &ProtoBlock<P>> {
        self.proto_array.ancestors(block_root)
    }

    /// [`get_ancestor`](https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/fork-choice.md#get_ancestor)
    ///
    /// Returns the root of the latest ancestor of `block_root` at or before `slot`.
    /// Returns `None` if that ancestor has been pruned or `block_root` is unknown.
    #[must_use]
    pub fn get_ancestor(&self, block_root: H256, slot: Slot) -> Option<H256> {
        self.iterate_ancestors(block_root)
            .find(|block| block.slot() <= slot)
            .map(|block| block.block_root)
    }

    /// Returns `true` if `descendant_root` is `ancestor_root` or one of its descendants.
    #[must_use]
    pub fn is_descendant(&self, ancestor_root: H256, descendant_root: H256) -> bool {
        let Some(ancestor) = self.block(ancestor_root) else {
            return false;
        };

        self.get_ancestor(descendant_root, ancestor.slot()) == Some(ancestor_root)
    }

    /// Returns the block in the canonical chain proposed at `slot`, if there is one.
    #[must_use]
    pub fn canonical_block_at_slot(&self, slot: Slot) -> Option<&ProtoBlock<P>> {
        self.iterate_ancestors(self.head.block_root)
            .find(|block| block.slot() <= slot)
            .filter(|block| block.slot() == slot)
    }

    #[must_use]
    pub fn latest_message(&self, validator_index: ValidatorIndex) -> Option<LatestMessage> {
        let index = usize::try_from(validator_index).ok()?;
        let vote = self.votes.get(index)?;

        (!vote.is_empty() && !vote.next_root.is_zero()).then_some(LatestMessage {
            epoch: vote.next_epoch,
            beacon_block_root: vote.next_root,
        })
    }

    #[must_use]
    pub fn is_equivocating(&self, validator_index: ValidatorIndex) -> bool {
        self.equivocating_indices.contains(&validator_index)
    }

    #[must_use]
    pub fn queued_attestation_count(&self) -> usize {
        self.queued_attestations.len()
    }

    #[must_use]
    pub fn justified_balances(&self) -> &Arc<[Gwei]> {
        &self.justified_balances
    }

    /// Replaces the balances used to weigh votes.
    ///
    /// Callers should do this whenever the justified checkpoint changes,
    /// passing balances from the state at the new checkpoint.
    pub fn update_justified_balances(&mut self, justified_balances: Arc<[Gwei]>) {
        self.justified_balances = justified_balances;
    }

    /// [`on_tick`](https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/fork-choice.md#on_tick)
    /// with slot granularity.
    pub fn update_time(&mut self, slot: Slot) -> Result<CheckpointChanges> {
        let mut changes = CheckpointChanges::default();

        // Slot updates can come in any order.
        if slot <= self.slot {
            return Ok(changes);
        }

        let old_epoch = self.current_epoch();

        self.slot = slot;

        // > Reset store.proposer_boost_root if this is a new slot
        self.proposer_boost_root = H256::zero();

        // > Update store.justified_checkpoint if a better checkpoint on the store.finalized_checkpoint chain
        if self.current_epoch() > old_epoch
            && self.best_justified_checkpoint.epoch > self.justified_checkpoint.epoch
            && self.is_descendant_of_finalized(self.best_justified_checkpoint.root)
        {
            self.justified_checkpoint = self.best_justified_checkpoint;
            changes.justified_checkpoint_updated = true;
        }

        // > Attestations can only affect the fork choice of subsequent slots
        let (ready, delayed) = core::mem::take(&mut self.queued_attestations)
            .into_iter()
            .partition::<Vec<_>, _>(|queued| queued.data.slot < slot);

        self.queued_attestations = delayed;

        for queued in ready {
            self.record_votes(queued.data, queued.attesting_indices)?;
        }

        Ok(changes)
    }

    /// [`on_block`](https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/fork-choice.md#on_block)
    ///
    /// `post_state` must be the result of applying `block` to the state of its parent.
    /// Running the state transition is the responsibility of the caller.
    pub fn on_block(
        &mut self,
        block_root: H256,
        block: Arc<SignedBeaconBlock<P>>,
        post_state: &BeaconState<P>,
    ) -> Result<CheckpointChanges> {
        if self.has_block(block_root) {
            return Ok(CheckpointChanges::default());
        }

        self.validate_block(block_root, &block)?;

        let slot = block.message().slot();
        let proto_block = ProtoBlock::new(block_root, block, post_state);
        let justified_checkpoint = proto_block.justified_checkpoint;
        let finalized_checkpoint = proto_block.finalized_checkpoint;

        self.proto_array.insert(proto_block)?;

        // > Add proposer score boost if the block is timely
        //
        // Time is tracked with slot granularity, so every block for the current slot is timely.
        // Only the first one is boosted.
        if self.slot == slot && self.proposer_boost_root.is_zero() {
            self.proposer_boost_root = block_root;
        }

        Ok(self.update_checkpoints(justified_checkpoint, finalized_checkpoint))
    }

    /// Performs the checks of [`Store::on_block`] without modifying the store.
    ///
    /// A block that passes them is only rejected by [`Store::on_block`] if the store changes in
    /// between.
    pub fn validate_block(&self, block_root: H256, block: &SignedBeaconBlock<P>) -> Result<()> {
        let slot = block.message().slot();
        let parent_root = block.message().parent_root();

        // > Parent block must be known
        ensure!(
            self.has_block(parent_root),
            Error::UnknownParent {
                block_root,
                parent_root,
            },
        );

        // > Blocks cannot be in the future.
        ensure!(
            slot <= self.slot,
            Error::BlockFromFuture {
                block_root,
                slot,
                current_slot: self.slot,
            },
        );

        // > Check that block is later than the finalized epoch slot
        let finalized_slot = self.finalized_slot();

        ensure!(
            finalized_slot < slot,
            Error::BlockNotNewerThanFinalized {
                block_root,
                slot,
                finalized_slot,
            },
        );

        // > Check block is a descendant of the finalized block at the checkpoint finalized slot
        ensure!(
            self.is_descendant_of_finalized(parent_root),
            Error::BlockNotDescendantOfFinalized {
                block_root,
                finalized_checkpoint: self.finalized_checkpoint,
            },
        );

        Ok(())
    }

    /// [`on_attestation`](https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/fork-choice.md#on_attestation)
    ///
    /// The signature must already have been verified by the caller.
    /// Attestations for the current slot are queued until the next slot.
    pub fn on_attestation(
        &mut self,
        attestation: &IndexedAttestation<P>,
        is_from_block: bool,
    ) -> Result<AttestationAction> {
        let data = attestation.data;

        self.validate_on_attestation(data, is_from_block)?;

        let attesting_indices = attestation.attesting_indices.iter().copied();

        if self.slot <= data.slot {
            self.queued_attestations.push(QueuedAttestation {
                data,
                attesting_indices: attesting_indices.collect(),
            });

            return Ok(AttestationAction::DelayUntilSlot);
        }

        self.record_votes(data, attesting_indices)?;

        Ok(AttestationAction::Accept)
    }

    /// [`on_attester_slashing`](https://github.com/ethereum/consensus-specs/blob/v1.2.0/specs/phase0/fork-choice.md#on_attester_slashing)
    ///
    /// Takes indices that have already been determined to be slashable.
    /// Votes of equivocating validators are removed the next time the head is computed.
    pub fn on_attester_slashing(
        &mut self,
        slashable_indices: impl IntoIterator<Item = ValidatorIndex>,
    ) {
        self.equivocating_indices.extend(slashable_indices);
    }

    /// [`get_head`](https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/fork-choice.md#get_head)
    ///
    /// Applies all votes recorded since the last call and walks down from the justified block.
    pub fn update_head(&mut self) -> Result<&ProtoBlock<P>> {
        let mut deltas = self.compute_deltas()?;

        self.apply_proposer_boost(&mut deltas)?;

        self.proto_array
            .apply_score_changes(&mut deltas, self.viability())?;

        self.applied_balances = self.justified_balances.clone();

        let head = self
            .proto_array
            .find_head(self.justified_checkpoint.root)
            .ok_or(Error::JustifiedBlockMissing {
                checkpoint: self.justified_checkpoint,
            })?;

        self.head = head.clone();

        Ok(&self.head)
    }

    /// Performs the checks of [`Store::on_attestation`] without modifying the store.
    pub fn validate_on_attestation(
        &self,
        data: AttestationData,
        is_from_block: bool,
    ) -> Result<()> {
        let AttestationData {
            slot,
            beacon_block_root,
            target,
            ..
        } = data;

        // > If the given attestation is not from a beacon block message,
        // > we have to check the target epoch scope.
        if !is_from_block {
            let current_epoch = self.current_epoch();

            // > Attestations must be from the current or previous epoch
            ensure!(
                target.epoch == current_epoch || target.epoch == self.previous_epoch(),
                Error::AttestationTargetOutOfRange {
                    data,
                    current_epoch,
                },
            );
        }

        // > Check that the epoch number and slot number are matching
        ensure!(
            target.epoch == misc::compute_epoch_at_slot::<P>(slot),
            Error::AttestationTargetsWrongEpoch { data },
        );

        // > Attestations target be for a known block.
        ensure!(
            self.has_block(target.root),
            Error::UnknownBlock {
                block_root: target.root,
            },
        );

        // > Attestations must be for a known block.
        let block = self.block(beacon_block_root).ok_or(Error::UnknownBlock {
            block_root: beacon_block_root,
        })?;

        // > Attestations must not be for blocks in the future.
        ensure!(
            block.slot() <= slot,
            Error::AttestationForFutureBlock {
                data,
                block_slot: block.slot(),
            },
        );

        // > LMD vote must be consistent with FFG vote target
        let target_slot = misc::compute_start_slot_at_epoch::<P>(target.epoch);

        ensure!(
            self.get_ancestor(beacon_block_root, target_slot) == Some(target.root),
            Error::LmdGhostInconsistentWithFfgTarget { data },
        );

        Ok(())
    }

    // > Update latest messages for attesting indices
    fn record_votes(
        &mut self,
        data: AttestationData,
        attesting_indices: impl IntoIterator<Item = ValidatorIndex>,
    ) -> Result<()> {
        for validator_index in attesting_indices {
            if self.equivocating_indices.contains(&validator_index) {
                continue;
            }

            let index = usize::try_from(validator_index)?;

            if self.votes.len() <= index {
                self.votes.resize(index + 1, VoteTracker::default());
            }

            let vote = &mut self.votes[index];

            if vote.is_empty() || data.target.epoch > vote.next_epoch {
                vote.next_root = data.beacon_block_root;
                vote.next_epoch = data.target.epoch;
            }
        }

        Ok(())
    }

    fn compute_deltas(&mut self) -> Result<Vec<Difference>> {
        let mut deltas = vec![0; self.proto_array.len()];

        for (index, vote) in self.votes.iter_mut().enumerate() {
            if vote.current_root.is_zero() && vote.next_root.is_zero() {
                continue;
            }

            let validator_index = ValidatorIndex::try_from(index)?;
            let equivocating = self.equivocating_indices.contains(&validator_index);

            let old_balance = self.applied_balances.get(index).copied().unwrap_or_default();

            let new_balance = if equivocating {
                0
            } else {
                self.justified_balances.get(index).copied().unwrap_or_default()
            };

            if vote.current_root == vote.next_root && old_balance == new_balance {
                continue;
            }

            if let Some(current_index) = self.proto_array.index(vote.current_root) {
                deltas[current_index] -= Difference::try_from(old_balance)?;
            }

            if equivocating {
                vote.current_root = H256::zero();
                vote.next_root = H256::zero();
                continue;
            }

            if let Some(next_index) = self.proto_array.index(vote.next_root) {
                deltas[next_index] += Difference::try_from(new_balance)?;
            }

            vote.current_root = vote.next_root;
        }

        Ok(deltas)
    }

    // Proposer boost is disabled by setting `ChainConfig.proposer_score_boost` to `None`.
    fn apply_proposer_boost(&mut self, deltas: &mut [Difference]) -> Result<()> {
        if let Some((block_root, score)) = self.applied_proposer_boost.take() {
            if let Some(index) = self.proto_array.index(block_root) {
                deltas[index] -= Difference::try_from(score)?;
            }
        }

        let Some(percentage) = self.chain_config.proposer_score_boost else {
            return Ok(());
        };

        if self.proposer_boost_root.is_zero() {
            return Ok(());
        }

        let Some(index) = self.proto_array.index(self.proposer_boost_root) else {
            return Ok(());
        };

        // > Boost is applied if ``root`` is an ancestor of ``proposer_boost_root``
        let total_balance = self.justified_balances.iter().sum::<Gwei>();
        let committee_weight = total_balance / P::SlotsPerEpoch::U64;
        let score = committee_weight * percentage / 100;

        deltas[index] += Difference::try_from(score)?;

        self.applied_proposer_boost = Some((self.proposer_boost_root, score));

        Ok(())
    }

    fn update_checkpoints(
        &mut self,
        justified_checkpoint: Checkpoint,
        finalized_checkpoint: Checkpoint,
    ) -> CheckpointChanges {
        let old_justified_checkpoint = self.justified_checkpoint;
        let mut finalized_checkpoint_updated = false;

        // > Update justified checkpoint
        if justified_checkpoint.epoch > self.justified_checkpoint.epoch {
            if justified_checkpoint.epoch > self.best_justified_checkpoint.epoch {
                self.best_justified_checkpoint = justified_checkpoint;
            }

            if self.should_update_justified_checkpoint(justified_checkpoint) {
                self.justified_checkpoint = justified_checkpoint;
            }
        }

        // > Update finalized checkpoint
        if finalized_checkpoint.epoch > self.finalized_checkpoint.epoch {
            self.finalized_checkpoint = finalized_checkpoint;
            finalized_checkpoint_updated = true;

            // > Potentially update justified if different from store
            // > Update justified if new justified is later than store justified
            // > or if store justified is not in chain with finalized checkpoint
            if self.justified_checkpoint != justified_checkpoint
                && (justified_checkpoint.epoch > self.justified_checkpoint.epoch
                    || !self.is_descendant_of_finalized(self.justified_checkpoint.root))
            {
                self.justified_checkpoint = justified_checkpoint;
            }
        }

        let pruned_block_roots = if finalized_checkpoint_updated {
            self.prune()
        } else {
            vec![]
        };

        CheckpointChanges {
            justified_checkpoint_updated: old_justified_checkpoint != self.justified_checkpoint,
            finalized_checkpoint_updated,
            pruned_block_roots,
        }
    }

    /// [`should_update_justified_checkpoint`](https://github.com/ethereum/consensus-specs/blob/v1.1.0/specs/phase0/fork-choice.md#should_update_justified_checkpoint)
    fn should_update_justified_checkpoint(&self, new_justified_checkpoint: Checkpoint) -> bool {
        let slots_since_epoch_start = misc::slots_since_epoch_start::<P>(self.slot);

        if slots_since_epoch_start < self.chain_config.safe_slots_to_update_justified {
            return true;
        }

        let justified_slot = misc::compute_start_slot_at_epoch::<P>(self.justified_checkpoint.epoch);

        self.get_ancestor(new_justified_checkpoint.root, justified_slot)
            == Some(self.justified_checkpoint.root)
    }

    fn prune(&mut self) -> Vec<H256> {
        let pruned = self.proto_array.prune(self.finalized_checkpoint.root);

        if !pruned.is_empty() {
            self.queued_attestations
                .retain(|queued| self.proto_array.contains(queued.data.beacon_block_root));
        }

        pruned.into_iter().map(|block| block.block_root).collect()
    }

    fn is_descendant_of_finalized(&self, block_root: H256) -> bool {
        self.is_descendant(self.finalized_checkpoint.root, block_root)
    }

    fn finalized_slot(&self) -> Slot {
        misc::compute_start_slot_at_epoch::<P>(self.finalized_checkpoint.epoch)
    }

    const fn viability(&self) -> Viability {
        Viability {
            justified_epoch: self.justified_checkpoint.epoch,
            finalized_epoch: self.finalized_checkpoint.epoch,
            anchor_epoch: self.anchor_epoch,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quickcheck_macros::quickcheck;
    use ssz::{ContiguousList, SszHash as _};
    use test_case::test_case;
    use types::{
        phase0::{
            beacon_state::BeaconState as Phase0BeaconState,
            containers::{
                BeaconBlock as Phase0BeaconBlock, BeaconBlockBody as Phase0BeaconBlockBody,
                SignedBeaconBlock as Phase0SignedBeaconBlock,
            },
        },
        preset::Minimal,
    };

    use super::*;

    const BALANCE: Gwei = 1_000_000_000;
    const VALIDATOR_COUNT: usize = 64;

    struct Harness {
        store: Store<Minimal>,
        anchor_root: H256,
    }

    impl Harness {
        fn new(chain_config: ChainConfig) -> Self {
            let anchor_state = BeaconState::from(Phase0BeaconState::<Minimal>::default());

            let anchor_block = Phase0SignedBeaconBlock::<Minimal> {
                message: Phase0BeaconBlock {
                    state_root: anchor_state.hash_tree_root(),
                    ..Phase0BeaconBlock::default()
                },
                ..Phase0SignedBeaconBlock::default()
            };

            let anchor_root = anchor_block.message.hash_tree_root();

            let mut store = Store::new(
                Arc::new(chain_config),
                StoreConfig::default(),
                Arc::new(anchor_block.into()),
                &anchor_state,
            );

            store.update_justified_balances(vec![BALANCE; VALIDATOR_COUNT].into());

            Self { store, anchor_root }
        }

        fn add_block(&mut self, slot: Slot, parent_root: H256, graffiti: u8) -> Result<H256> {
            self.add_block_with_checkpoints(
                slot,
                parent_root,
                graffiti,
                Checkpoint::default(),
                Checkpoint::default(),
            )
        }

        fn add_block_with_checkpoints(
            &mut self,
            slot: Slot,
            parent_root: H256,
            graffiti: u8,
            justified_checkpoint: Checkpoint,
            finalized_checkpoint: Checkpoint,
        ) -> Result<H256> {
            let block = SignedBeaconBlock::from(Phase0SignedBeaconBlock::<Minimal> {
                message: Phase0BeaconBlock {
                    slot,
                    parent_root,
                    body: Phase0BeaconBlockBody {
                        graffiti: H256::repeat_byte(graffiti),
                        ..Phase0BeaconBlockBody::default()
                    },
                    ..Phase0BeaconBlock::default()
                },
                ..Phase0SignedBeaconBlock::default()
            });

            let post_state = BeaconState::from(Phase0BeaconState::<Minimal> {
                slot,
                current_justified_checkpoint: justified_checkpoint,
                finalized_checkpoint,
                ..Phase0BeaconState::default()
            });

            let block_root = block.block_root();

            self.store.on_block(block_root, Arc::new(block), &post_state)?;

            Ok(block_root)
        }

        fn vote(
            &mut self,
            slot: Slot,
            beacon_block_root: H256,
            validators: impl IntoIterator<Item = ValidatorIndex>,
        ) -> Result<AttestationAction> {
            self.attest(slot, beacon_block_root, validators, false)
        }

        fn attest(
            &mut self,
            slot: Slot,
            beacon_block_root: H256,
            validators: impl IntoIterator<Item = ValidatorIndex>,
            is_from_block: bool,
        ) -> Result<AttestationAction> {
            let target_epoch = misc::compute_epoch_at_slot::<Minimal>(slot);
            let target_slot = misc::compute_start_slot_at_epoch::<Minimal>(target_epoch);

            let target_root = self
                .store
                .get_ancestor(beacon_block_root, target_slot)
                .unwrap_or(beacon_block_root);

            let attestation = IndexedAttestation {
                attesting_indices: ContiguousList::try_from_iter(validators)?,
                data: AttestationData {
                    slot,
                    index: 0,
                    beacon_block_root,
                    source: Checkpoint::default(),
                    target: Checkpoint {
                        epoch: target_epoch,
                        root: target_root,
                    },
                },
                ..IndexedAttestation::default()
            };

            self.store.on_attestation(&attestation, is_from_block)
        }

        fn head_root(&mut self) -> Result<H256> {
            Ok(self.store.update_head()?.block_root)
        }
    }

    fn harness() -> Harness {
        Harness::new(ChainConfig::minimal().without_proposer_boost())
    }

    #[test]
    fn new_store_starts_at_anchor() {
        let harness = harness();
        let store = &harness.store;

        assert_eq!(store.head().block_root, harness.anchor_root);
        assert_eq!(store.justified_checkpoint().root, harness.anchor_root);
        assert_eq!(store.finalized_checkpoint().root, harness.anchor_root);
        assert_eq!(store.best_justified_checkpoint().root, harness.anchor_root);
        assert_eq!(store.block_count(), 1);
    }

    #[test]
    fn single_block_becomes_head() -> Result<()> {
        let mut harness = harness();

        harness.store.update_time(1)?;

        let block_root = harness.add_block(1, harness.anchor_root, 1)?;

        assert_eq!(harness.head_root()?, block_root);
        assert_eq!(
            harness
                .store
                .canonical_block_at_slot(1)
                .map(|block| block.block_root),
            Some(block_root),
        );
        assert!(harness.store.canonical_block_at_slot(2).is_none());

        Ok(())
    }

    #[test]
    fn heavier_sibling_wins() -> Result<()> {
        let mut harness = harness();

        harness.store.update_time(3)?;

        let parent = harness.add_block(1, harness.anchor_root, 1)?;
        let a = harness.add_block(2, parent, 2)?;
        let b = harness.add_block(2, parent, 3)?;

        harness.vote(2, a, 0..40)?;
        harness.vote(2, b, 40..64)?;

        assert_eq!(harness.head_root()?, a);
        assert_eq!(harness.store.weight(a), Some(40 * BALANCE));
        assert_eq!(harness.store.weight(b), Some(24 * BALANCE));
        assert_eq!(harness.store.weight(parent), Some(64 * BALANCE));

        Ok(())
    }

    #[test_case(0; "without votes")]
    #[test_case(32; "with equal votes")]
    fn ties_are_broken_by_greater_root(votes_per_block: u64) -> Result<()> {
        let mut harness = harness();

        harness.store.update_time(3)?;

        let parent = harness.add_block(1, harness.anchor_root, 1)?;
        let a = harness.add_block(2, parent, 2)?;
        let b = harness.add_block(2, parent, 3)?;

        if votes_per_block > 0 {
            harness.vote(2, a, 0..votes_per_block)?;
            harness.vote(2, b, votes_per_block..2 * votes_per_block)?;
        }

        let head = harness.head_root()?;

        assert_eq!(head, a.max(b));

        // The result must not depend on how many times the head is computed.
        assert_eq!(harness.head_root()?, head);

        Ok(())
    }

    #[test]
    fn later_votes_replace_earlier_ones() -> Result<()> {
        let mut harness = harness();

        harness.store.update_time(10)?;

        let a = harness.add_block(1, harness.anchor_root, 1)?;
        let b = harness.add_block(1, harness.anchor_root, 2)?;

        harness.vote(1, a, 0..10)?;
        harness.vote(1, b, 10..15)?;

        assert_eq!(harness.head_root()?, a);

        // Votes from the same epoch do not replace earlier ones.
        harness.vote(2, b, 0..10)?;

        assert_eq!(harness.head_root()?, a);

        // Votes from a later epoch do.
        let c = harness.add_block(9, b, 3)?;

        harness.vote(9, c, 0..10)?;

        assert_eq!(harness.head_root()?, c);
        assert_eq!(
            harness.store.latest_message(0),
            Some(LatestMessage {
                epoch: 1,
                beacon_block_root: c,
            }),
        );
        assert_eq!(harness.store.weight(a), Some(0));

        Ok(())
    }

    #[test]
    fn attestations_for_current_slot_are_queued() -> Result<()> {
        let mut harness = harness();

        harness.store.update_time(2)?;

        let a = harness.add_block(1, harness.anchor_root, 1)?;
        let b = harness.add_block(1, harness.anchor_root, 2)?;
        let lighter = a.min(b);

        assert_eq!(
            harness.vote(2, lighter, 0..10)?,
            AttestationAction::DelayUntilSlot,
        );
        assert_eq!(harness.store.queued_attestation_count(), 1);
        assert_eq!(harness.head_root()?, a.max(b));

        harness.store.update_time(3)?;

        assert_eq!(harness.store.queued_attestation_count(), 0);
        assert_eq!(harness.head_root()?, lighter);

        Ok(())
    }

    #[test]
    fn attestation_validation() -> Result<()> {
        let mut harness = harness();

        harness.store.update_time(12)?;

        let block_root = harness.add_block(5, harness.anchor_root, 1)?;

        let error = harness
            .vote(5, H256::repeat_byte(0xff), 0..1)
            .expect_err("block is unknown");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::UnknownBlock { .. }),
        ));

        let error = harness
            .vote(4, block_root, 0..1)
            .expect_err("block is newer than attestation");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::AttestationForFutureBlock { .. }),
        ));

        harness.store.update_time(40)?;

        let error = harness
            .vote(6, block_root, 0..1)
            .expect_err("target is older than the previous epoch");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::AttestationTargetOutOfRange { .. }),
        ));

        // Attestations included in blocks are not subject to the epoch window.
        assert_eq!(
            harness.attest(6, block_root, 0..1, true)?,
            AttestationAction::Accept,
        );

        Ok(())
    }

    #[test]
    fn equivocating_validators_lose_their_weight() -> Result<()> {
        let mut harness = harness();

        harness.store.update_time(3)?;

        let a = harness.add_block(1, harness.anchor_root, 1)?;
        let b = harness.add_block(1, harness.anchor_root, 2)?;

        harness.vote(1, a, 0..10)?;
        harness.vote(1, b, 10..15)?;

        assert_eq!(harness.head_root()?, a);

        harness.store.on_attester_slashing(0..6);

        assert!(harness.store.is_equivocating(0));
        assert_eq!(harness.head_root()?, b);
        assert_eq!(harness.store.weight(a), Some(4 * BALANCE));

        // Later votes from slashed validators are ignored.
        harness.vote(2, a, 0..6)?;

        assert_eq!(harness.head_root()?, b);

        Ok(())
    }

    #[test]
    fn proposer_boost_applies_until_next_slot() -> Result<()> {
        let mut harness = Harness::new(ChainConfig::minimal());

        harness.store.update_time(1)?;

        let a = harness.add_block(1, harness.anchor_root, 1)?;

        harness.store.update_time(2)?;

        // Committee weight is 8 validators, so the boost is worth 3.2 validators.
        let b = harness.add_block(2, harness.anchor_root, 2)?;

        harness.vote(1, a, 0..3)?;

        assert_eq!(harness.store.proposer_boost_root(), b);
        assert_eq!(harness.head_root()?, b);

        harness.store.update_time(3)?;

        assert_eq!(harness.head_root()?, a);

        Ok(())
    }

    #[test]
    fn rejects_blocks_with_unknown_parent() {
        let mut harness = harness();

        let error = harness
            .add_block(0, H256::repeat_byte(0xff), 1)
            .expect_err("parent is unknown");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::UnknownParent { .. }),
        ));
    }

    #[test]
    fn rejects_blocks_from_the_future() -> Result<()> {
        let mut harness = harness();

        harness.store.update_time(1)?;

        let error = harness
            .add_block(2, harness.anchor_root, 1)
            .expect_err("block is from a future slot");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::BlockFromFuture { .. }),
        ));

        Ok(())
    }

    #[test]
    fn validate_block_does_not_insert_block() -> Result<()> {
        let mut harness = harness();

        harness.store.update_time(1)?;

        let block = SignedBeaconBlock::from(Phase0SignedBeaconBlock::<Minimal> {
            message: Phase0BeaconBlock {
                slot: 1,
                parent_root: harness.anchor_root,
                ..Phase0BeaconBlock::default()
            },
            ..Phase0SignedBeaconBlock::default()
        });

        let block_root = block.block_root();

        harness.store.validate_block(block_root, &block)?;

        assert!(!harness.store.has_block(block_root));
        assert_eq!(harness.store.block_count(), 1);

        let orphan = SignedBeaconBlock::from(Phase0SignedBeaconBlock::<Minimal> {
            message: Phase0BeaconBlock {
                slot: 1,
                parent_root: H256::repeat_byte(0xff),
                ..Phase0BeaconBlock::default()
            },
            ..Phase0SignedBeaconBlock::default()
        });

        let error = harness
            .store
            .validate_block(orphan.block_root(), &orphan)
            .expect_err("parent is unknown");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::UnknownParent { .. }),
        ));

        Ok(())
    }

    #[test]
    fn finalization_prunes_other_branches() -> Result<()> {
        let mut harness = harness();

        harness.store.update_time(30)?;

        let a = harness.add_block(8, harness.anchor_root, 1)?;
        let b = harness.add_block(9, harness.anchor_root, 2)?;

        let justified = Checkpoint { epoch: 1, root: a };
        let c = harness.add_block_with_checkpoints(17, a, 3, justified, Checkpoint::default())?;

        let d = harness.add_block_with_checkpoints(
            25,
            c,
            4,
            Checkpoint { epoch: 2, root: c },
            justified,
        )?;

        assert_eq!(harness.store.finalized_checkpoint(), justified);
        assert!(!harness.store.has_block(b));
        assert!(!harness.store.has_block(harness.anchor_root));
        assert!(harness.store.is_descendant(a, d));
        assert_eq!(harness.head_root()?, d);

        // Blocks that do not descend from the finalized block are rejected.
        let error = harness
            .add_block(26, b, 5)
            .expect_err("parent was pruned");

        assert!(matches!(
            error.downcast_ref::<Error>(),
            Some(Error::UnknownParent { .. }),
        ));

        Ok(())
    }

    #[test]
    fn justified_checkpoint_is_delayed_outside_safe_slots() -> Result<()> {
        let mut harness = harness();

        harness.store.update_time(8)?;

        let a = harness.add_block(8, harness.anchor_root, 1)?;
        let b = harness.add_block(9, harness.anchor_root, 2)?;

        // `safe_slots_to_update_justified` is 2 in the minimal configuration.
        harness.store.update_time(13)?;

        let justified_a = Checkpoint { epoch: 1, root: a };
        harness.add_block_with_checkpoints(12, a, 3, justified_a, Checkpoint::default())?;

        assert_eq!(harness.store.justified_checkpoint(), justified_a);

        // A conflicting checkpoint outside the safe slots is only remembered.
        let justified_b = Checkpoint { epoch: 2, root: b };
        harness.add_block_with_checkpoints(13, b, 4, justified_b, Checkpoint::default())?;

        assert_eq!(harness.store.justified_checkpoint(), justified_a);
        assert_eq!(harness.store.best_justified_checkpoint(), justified_b);

        let changes = harness.store.update_time(16)?;

        assert!(changes.justified_checkpoint_updated);
        assert_eq!(harness.store.justified_checkpoint(), justified_b);

        Ok(())
    }

    #[quickcheck]
    fn head_descends_from_finalized_block(weights: Vec<(u8, u8)>) -> bool {
        let mut harness = harness();

        harness
            .store
            .update_time(100)
            .expect("time can always move forward");

        // Votes are submitted as if they were included in blocks to bypass the epoch window.

        let mut roots = vec![harness.anchor_root];

        for (index, (parent, votes)) in weights.into_iter().take(20).enumerate() {
            let parent_root = roots[usize::from(parent) % roots.len()];
            let parent_slot = harness.store.block(parent_root).map_or(0, ProtoBlock::slot);
            let slot = parent_slot + 1;
            let graffiti = u8::try_from(index).expect("at most 20 blocks are added");

            let Ok(block_root) = harness.add_block(slot, parent_root, graffiti) else {
                return false;
            };

            let first = u64::from(votes) % 64;

            if harness.attest(slot, block_root, first..64, true).is_err() {
                return false;
            }

            roots.push(block_root);
        }

        let finalized_root = harness.store.finalized_checkpoint().root;

        harness
            .head_root()
            .is_ok_and(|head| harness.store.is_descendant(finalized_root, head))
    }
}
