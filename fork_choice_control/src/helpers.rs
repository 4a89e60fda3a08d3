use std::sync::Arc;

use anyhow::Result;
use bls::InsecureOracle;
use fork_choice_store::StoreConfig;
use futures::channel::mpsc::UnboundedReceiver;
use helper_functions::misc;
use std_ext::ArcExt as _;
use transition_functions::combined::BlockVerification;
use types::{
    combined::{BeaconState, SignedBeaconBlock},
    config::Config,
    phase0::{
        containers::{Attestation, Checkpoint},
        primitives::{Epoch, Slot, ValidatorIndex, H256},
    },
    preset::{Minimal, Preset},
};

use crate::{controller::Controller, error::ErrorKind, events::Event, storage::InMemoryStorage};

pub type TestController<P> = Controller<P, InMemoryStorage>;

pub struct Context<P: Preset> {
    config: Arc<Config>,
    controller: TestController<P>,
    storage: Arc<InMemoryStorage>,
    event_rx: UnboundedReceiver<Event>,
    genesis_block: Arc<SignedBeaconBlock<P>>,
    genesis_state: Arc<BeaconState<P>>,
}

impl Context<Minimal> {
    #[must_use]
    pub fn minimal() -> Self {
        Self::with_config(Config::minimal())
    }
}

impl<P: Preset> Context<P> {
    #[must_use]
    pub fn with_config(config: Config) -> Self {
        Self::new(config, StoreConfig::minimal::<P>())
    }

    #[must_use]
    pub fn new(config: Config, store_config: StoreConfig) -> Self {
        let config = Arc::new(config);

        let (genesis_state, _) = factory::min_genesis_state::<P>(&config)
            .expect("genesis state should be constructed successfully");

        let genesis_block = Arc::new(genesis::beacon_block(&genesis_state));
        let storage = Arc::new(InMemoryStorage::default());

        let (controller, event_rx) = Controller::new(
            config.clone_arc(),
            store_config,
            genesis_state.clone_arc(),
            genesis_block.clone_arc(),
            storage.clone_arc(),
            Arc::new(InsecureOracle),
        )
        .expect("genesis block and state should match");

        Self {
            config,
            controller,
            storage,
            event_rx,
            genesis_block,
            genesis_state,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn controller(&self) -> &TestController<P> {
        &self.controller
    }

    #[must_use]
    pub fn storage(&self) -> &InMemoryStorage {
        &self.storage
    }

    #[must_use]
    pub fn genesis(&self) -> (Arc<SignedBeaconBlock<P>>, Arc<BeaconState<P>>) {
        (self.genesis_block.clone_arc(), self.genesis_state.clone_arc())
    }

    #[must_use]
    pub fn genesis_root(&self) -> H256 {
        self.genesis_block.block_root()
    }

    // The `graffiti` parameters make otherwise identical blocks distinct.

    #[must_use]
    pub fn empty_block(
        &self,
        pre_state: &Arc<BeaconState<P>>,
        slot: Slot,
        graffiti: H256,
    ) -> (Arc<SignedBeaconBlock<P>>, Arc<BeaconState<P>>) {
        factory::empty_block(self.config(), pre_state.clone_arc(), slot, graffiti)
            .expect("block should be constructed successfully")
    }

    #[must_use]
    pub fn block_with_attestations(
        &self,
        pre_state: &Arc<BeaconState<P>>,
        slot: Slot,
        graffiti: H256,
        attestations: Vec<Attestation<P>>,
    ) -> (Arc<SignedBeaconBlock<P>>, Arc<BeaconState<P>>) {
        factory::block_with_attestations(
            self.config(),
            pre_state.clone_arc(),
            slot,
            graffiti,
            attestations,
        )
        .expect("block should be constructed successfully")
    }

    /// Attestations for `beacon_block_root` from the validators accepted by `filter`
    /// in every slot of the epoch containing `first_slot`, starting from `first_slot`.
    #[must_use]
    pub fn attestations_in_epoch(
        &self,
        head_state: &BeaconState<P>,
        beacon_block_root: H256,
        first_slot: Slot,
        mut filter: impl FnMut(ValidatorIndex) -> bool,
    ) -> Vec<Attestation<P>> {
        let epoch = epoch_at_slot::<P>(first_slot);

        (first_slot..start_of_epoch::<P>(epoch + 1))
            .flat_map(|slot| {
                factory::committee_attestations(
                    self.config(),
                    head_state,
                    beacon_block_root,
                    slot,
                    &mut filter,
                )
                .expect("attestations should be constructed successfully")
            })
            .collect()
    }

    pub fn on_slot(&self, slot: Slot) {
        self.controller
            .on_tick(slot)
            .expect("ticks should always be processed successfully");

        assert_eq!(self.controller.slot(), slot);
    }

    pub fn on_valid_block(&self, block: &Arc<SignedBeaconBlock<P>>) -> H256 {
        self.controller
            .on_block(block.clone_arc(), BlockVerification::full())
            .expect("block should be valid")
    }

    #[must_use]
    pub fn on_invalid_block(&self, block: &Arc<SignedBeaconBlock<P>>) -> ErrorKind {
        let error = self
            .controller
            .on_block(block.clone_arc(), BlockVerification::full())
            .expect_err("block should be invalid");

        ErrorKind::of(&error)
    }

    pub fn on_acceptable_attestations(&self, attestations: &[Attestation<P>]) {
        for attestation in attestations {
            self.controller
                .on_attestation(attestation)
                .expect("attestation should be accepted");
        }
    }

    pub fn update_head(&self) -> H256 {
        self.controller
            .update_head()
            .expect("head should be computed successfully")
            .block_root
    }

    pub fn assert_head(&self, expected_slot: Slot, expected_root: H256) {
        let head = self.controller.head();

        assert_eq!(head.slot(), expected_slot);
        assert_eq!(head.block_root, expected_root);
    }

    pub fn assert_justified_checkpoint(&self, expected_checkpoint: Checkpoint) {
        assert_eq!(self.controller.justified_checkpoint(), expected_checkpoint);
    }

    pub fn assert_finalized_checkpoint(&self, expected_checkpoint: Checkpoint) {
        assert_eq!(self.controller.finalized_checkpoint(), expected_checkpoint);
    }

    pub fn block_state(&self, block_root: H256) -> Result<Arc<BeaconState<P>>> {
        let block = self
            .controller
            .block(block_root)
            .expect("block should be present in fork choice");

        self.controller.block_slot_state(block_root, block.slot())
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        core::iter::from_fn(|| self.event_rx.try_next().ok().flatten()).collect()
    }
}

#[must_use]
pub fn epoch_at_slot<P: Preset>(slot: Slot) -> Epoch {
    misc::compute_epoch_at_slot::<P>(slot)
}

#[must_use]
pub fn start_of_epoch<P: Preset>(epoch: Epoch) -> Slot {
    misc::compute_start_slot_at_epoch::<P>(epoch)
}
