use fork_choice_store::{ProtoBlock, Store};
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use helper_functions::misc;
use log::debug;
use serde::Serialize;
use strum::AsRefStr;
use types::{
    phase0::primitives::{Epoch, Slot, H256},
    preset::Preset,
};

#[derive(Clone, PartialEq, Eq, Debug, AsRefStr)]
pub enum Event {
    HeadChanged(HeadEvent),
    Finalized(FinalizedEvent),
    Reorg(ReorgEvent),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct HeadEvent {
    pub slot: Slot,
    pub block: H256,
    pub state: H256,
    pub epoch_transition: bool,
}

impl HeadEvent {
    fn new<P: Preset>(old_head: &ProtoBlock<P>, new_head: &ProtoBlock<P>) -> Self {
        Self {
            slot: new_head.slot(),
            block: new_head.block_root,
            state: new_head.state_root(),
            epoch_transition: new_head.epoch() > old_head.epoch(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct FinalizedEvent {
    pub block: H256,
    pub state: H256,
    pub epoch: Epoch,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize)]
pub struct ReorgEvent {
    pub slot: Slot,
    pub depth: u64,
    pub old_head_block: H256,
    pub new_head_block: H256,
    pub old_head_state: H256,
    pub new_head_state: H256,
    pub epoch: Epoch,
}

impl ReorgEvent {
    /// Returns `None` if `new_head` extends the chain of `old_head`.
    ///
    /// `depth` is the number of slots between `old_head` and the latest block shared by both
    /// chains. It is 0 if `old_head` has been pruned.
    fn new<P: Preset>(
        store: &Store<P>,
        old_head: &ProtoBlock<P>,
        new_head: &ProtoBlock<P>,
    ) -> Option<Self> {
        if store.is_descendant(old_head.block_root, new_head.block_root) {
            return None;
        }

        let common_ancestor_slot = store
            .iterate_ancestors(old_head.block_root)
            .find(|ancestor| store.is_descendant(ancestor.block_root, new_head.block_root))
            .map_or(old_head.slot(), ProtoBlock::slot);

        Some(Self {
            slot: new_head.slot(),
            depth: old_head.slot().saturating_sub(common_ancestor_slot),
            old_head_block: old_head.block_root,
            new_head_block: new_head.block_root,
            old_head_state: old_head.state_root(),
            new_head_state: new_head.state_root(),
            epoch: misc::compute_epoch_at_slot::<P>(new_head.slot()),
        })
    }
}

pub struct EventChannel {
    tx: UnboundedSender<Event>,
}

impl EventChannel {
    #[must_use]
    pub fn new() -> (Self, UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded();
        (Self { tx }, rx)
    }

    /// Sends events describing the move from `old_head` to the current head of `store`.
    pub fn send_head_events<P: Preset>(&self, store: &Store<P>, old_head: &ProtoBlock<P>) {
        let new_head = store.head();

        if new_head.block_root == old_head.block_root {
            return;
        }

        if let Some(reorg) = ReorgEvent::new(store, old_head, new_head) {
            self.send(Event::Reorg(reorg));
        }

        self.send(Event::HeadChanged(HeadEvent::new(old_head, new_head)));
    }

    pub fn send_finalized_event<P: Preset>(&self, store: &Store<P>) {
        let checkpoint = store.finalized_checkpoint();

        let state = store
            .block(checkpoint.root)
            .map(ProtoBlock::state_root)
            .unwrap_or_default();

        self.send(Event::Finalized(FinalizedEvent {
            block: checkpoint.root,
            state,
            epoch: checkpoint.epoch,
        }));
    }

    fn send(&self, event: Event) {
        let name = event.as_ref().to_owned();

        // The receiver may have been dropped.
        if let Err(error) = self.tx.unbounded_send(event) {
            debug!("failed to send {name} event: {error}");
        }
    }
}
