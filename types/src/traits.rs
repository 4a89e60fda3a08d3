//! Traits for accessing fields shared by types from different phases.
//!
//! Functions generic over these traits work with both phase-specific containers and the combined
//! enums in [`crate::combined`].

use core::fmt::Debug;
use std::sync::Arc;

use bls::SignatureBytes;
use duplicate::duplicate_item;
use ssz::{BitVector, ContiguousList, SszHash as _};

use crate::{
    altair::{
        beacon_state::BeaconState as AltairBeaconState,
        containers::{
            BeaconBlock as AltairBeaconBlock, BeaconBlockBody as AltairBeaconBlockBody,
            SignedBeaconBlock as AltairSignedBeaconBlock, SyncAggregate, SyncCommittee,
        },
    },
    cache::Cache,
    collections::{
        Balances, EpochParticipation, Eth1DataVotes, HistoricalRoots, InactivityScores,
        RandaoMixes, RecentRoots, Slashings, Validators,
    },
    combined::{
        BeaconBlock as CombinedBeaconBlock, BeaconState as CombinedBeaconState,
        SignedBeaconBlock as CombinedSignedBeaconBlock,
    },
    nonstandard::Phase,
    phase0::{
        beacon_state::BeaconState as Phase0BeaconState,
        consts::JustificationBitsLength,
        containers::{
            Attestation, AttesterSlashing, BeaconBlock as Phase0BeaconBlock,
            BeaconBlockBody as Phase0BeaconBlockBody, BeaconBlockHeader, Checkpoint, Deposit,
            Eth1Data, Fork, ProposerSlashing, SignedBeaconBlock as Phase0SignedBeaconBlock,
            SignedVoluntaryExit,
        },
        primitives::{DepositIndex, Slot, UnixSeconds, ValidatorIndex, H256},
    },
    preset::Preset,
};

pub trait BeaconState<P: Preset>: Send + Sync {
    fn genesis_time(&self) -> UnixSeconds;
    fn genesis_validators_root(&self) -> H256;
    fn slot(&self) -> Slot;
    fn fork(&self) -> Fork;
    fn latest_block_header(&self) -> BeaconBlockHeader;
    fn block_roots(&self) -> &RecentRoots<P>;
    fn state_roots(&self) -> &RecentRoots<P>;
    fn historical_roots(&self) -> &HistoricalRoots<P>;
    fn eth1_data(&self) -> Eth1Data;
    fn eth1_data_votes(&self) -> &Eth1DataVotes<P>;
    fn eth1_deposit_index(&self) -> DepositIndex;
    fn validators(&self) -> &Validators<P>;
    fn balances(&self) -> &Balances<P>;
    fn randao_mixes(&self) -> &RandaoMixes<P>;
    fn slashings(&self) -> &Slashings<P>;
    fn justification_bits(&self) -> &BitVector<JustificationBitsLength>;
    fn previous_justified_checkpoint(&self) -> Checkpoint;
    fn current_justified_checkpoint(&self) -> Checkpoint;
    fn finalized_checkpoint(&self) -> Checkpoint;
    fn cache(&self) -> &Cache;

    fn genesis_time_mut(&mut self) -> &mut UnixSeconds;
    fn genesis_validators_root_mut(&mut self) -> &mut H256;
    fn slot_mut(&mut self) -> &mut Slot;
    fn fork_mut(&mut self) -> &mut Fork;
    fn latest_block_header_mut(&mut self) -> &mut BeaconBlockHeader;
    fn block_roots_mut(&mut self) -> &mut RecentRoots<P>;
    fn state_roots_mut(&mut self) -> &mut RecentRoots<P>;
    fn historical_roots_mut(&mut self) -> &mut HistoricalRoots<P>;
    fn eth1_data_mut(&mut self) -> &mut Eth1Data;
    fn eth1_data_votes_mut(&mut self) -> &mut Eth1DataVotes<P>;
    fn eth1_deposit_index_mut(&mut self) -> &mut DepositIndex;
    fn validators_mut(&mut self) -> &mut Validators<P>;
    fn balances_mut(&mut self) -> &mut Balances<P>;
    fn randao_mixes_mut(&mut self) -> &mut RandaoMixes<P>;
    fn slashings_mut(&mut self) -> &mut Slashings<P>;
    fn justification_bits_mut(&mut self) -> &mut BitVector<JustificationBitsLength>;
    fn previous_justified_checkpoint_mut(&mut self) -> &mut Checkpoint;
    fn current_justified_checkpoint_mut(&mut self) -> &mut Checkpoint;
    fn finalized_checkpoint_mut(&mut self) -> &mut Checkpoint;
    fn cache_mut(&mut self) -> &mut Cache;

    // Needed to split borrows in epoch processing.
    fn validators_mut_with_balances(&mut self) -> (&mut Validators<P>, &Balances<P>);

    fn phase(&self) -> Phase;
    fn post_altair(&self) -> Option<&dyn PostAltairBeaconState<P>>;
}

#[duplicate_item(
    implementor
    get_copy(field) get_ref(field) get_ref_mut(field) split_body phase_body post_altair_body;
    [Phase0BeaconState<P>]
    [self.field] [&self.field] [&mut self.field] [(&mut self.validators, &self.balances)]
    [Phase::Phase0] [None];
    [AltairBeaconState<P>]
    [self.field] [&self.field] [&mut self.field] [(&mut self.validators, &self.balances)]
    [Phase::Altair] [Some(self)];
    [CombinedBeaconState<P>]
    [
        match self {
            Self::Phase0(state) => state.field,
            Self::Altair(state) => state.field,
        }
    ]
    [
        match self {
            Self::Phase0(state) => &state.field,
            Self::Altair(state) => &state.field,
        }
    ]
    [
        match self {
            Self::Phase0(state) => &mut state.field,
            Self::Altair(state) => &mut state.field,
        }
    ]
    [
        match self {
            Self::Phase0(state) => (&mut state.validators, &state.balances),
            Self::Altair(state) => (&mut state.validators, &state.balances),
        }
    ]
    [
        match self {
            Self::Phase0(_) => Phase::Phase0,
            Self::Altair(_) => Phase::Altair,
        }
    ]
    [
        match self {
            Self::Phase0(_) => None,
            Self::Altair(state) => Some(state),
        }
    ];
)]
impl<P: Preset> BeaconState<P> for implementor {
    #[duplicate_item(
        field                           return_type;
        [genesis_time]                  [UnixSeconds];
        [genesis_validators_root]       [H256];
        [slot]                          [Slot];
        [fork]                          [Fork];
        [latest_block_header]           [BeaconBlockHeader];
        [eth1_data]                     [Eth1Data];
        [eth1_deposit_index]            [DepositIndex];
        [previous_justified_checkpoint] [Checkpoint];
        [current_justified_checkpoint]  [Checkpoint];
        [finalized_checkpoint]          [Checkpoint];
    )]
    fn field(&self) -> return_type {
        get_copy([field])
    }

    #[duplicate_item(
        field                return_type;
        [block_roots]        [RecentRoots<P>];
        [state_roots]        [RecentRoots<P>];
        [historical_roots]   [HistoricalRoots<P>];
        [eth1_data_votes]    [Eth1DataVotes<P>];
        [validators]         [Validators<P>];
        [balances]           [Balances<P>];
        [randao_mixes]       [RandaoMixes<P>];
        [slashings]          [Slashings<P>];
        [justification_bits] [BitVector<JustificationBitsLength>];
        [cache]              [Cache];
    )]
    fn field(&self) -> &return_type {
        get_ref([field])
    }

    #[duplicate_item(
        field                           method                              return_type;
        [genesis_time]                  [genesis_time_mut]                  [UnixSeconds];
        [genesis_validators_root]       [genesis_validators_root_mut]       [H256];
        [slot]                          [slot_mut]                          [Slot];
        [fork]                          [fork_mut]                          [Fork];
        [latest_block_header]           [latest_block_header_mut]           [BeaconBlockHeader];
        [block_roots]                   [block_roots_mut]                   [RecentRoots<P>];
        [state_roots]                   [state_roots_mut]                   [RecentRoots<P>];
        [historical_roots]              [historical_roots_mut]              [HistoricalRoots<P>];
        [eth1_data]                     [eth1_data_mut]                     [Eth1Data];
        [eth1_data_votes]               [eth1_data_votes_mut]               [Eth1DataVotes<P>];
        [eth1_deposit_index]            [eth1_deposit_index_mut]            [DepositIndex];
        [validators]                    [validators_mut]                    [Validators<P>];
        [balances]                      [balances_mut]                      [Balances<P>];
        [randao_mixes]                  [randao_mixes_mut]                  [RandaoMixes<P>];
        [slashings]                     [slashings_mut]                     [Slashings<P>];
        [justification_bits]            [justification_bits_mut]            [BitVector<JustificationBitsLength>];
        [previous_justified_checkpoint] [previous_justified_checkpoint_mut] [Checkpoint];
        [current_justified_checkpoint]  [current_justified_checkpoint_mut]  [Checkpoint];
        [finalized_checkpoint]          [finalized_checkpoint_mut]          [Checkpoint];
        [cache]                         [cache_mut]                         [Cache];
    )]
    fn method(&mut self) -> &mut return_type {
        get_ref_mut([field])
    }

    fn validators_mut_with_balances(&mut self) -> (&mut Validators<P>, &Balances<P>) {
        split_body
    }

    fn phase(&self) -> Phase {
        phase_body
    }

    fn post_altair(&self) -> Option<&dyn PostAltairBeaconState<P>> {
        post_altair_body
    }
}

pub trait PostAltairBeaconState<P: Preset>: BeaconState<P> {
    fn previous_epoch_participation(&self) -> &EpochParticipation<P>;
    fn current_epoch_participation(&self) -> &EpochParticipation<P>;
    fn inactivity_scores(&self) -> &InactivityScores<P>;
    fn current_sync_committee(&self) -> &Arc<SyncCommittee<P>>;
    fn next_sync_committee(&self) -> &Arc<SyncCommittee<P>>;

    fn previous_epoch_participation_mut(&mut self) -> &mut EpochParticipation<P>;
    fn current_epoch_participation_mut(&mut self) -> &mut EpochParticipation<P>;
    fn inactivity_scores_mut(&mut self) -> &mut InactivityScores<P>;
    fn current_sync_committee_mut(&mut self) -> &mut Arc<SyncCommittee<P>>;
    fn next_sync_committee_mut(&mut self) -> &mut Arc<SyncCommittee<P>>;
}

impl<P: Preset> PostAltairBeaconState<P> for AltairBeaconState<P> {
    #[duplicate_item(
        field                          return_type;
        [previous_epoch_participation] [EpochParticipation<P>];
        [current_epoch_participation]  [EpochParticipation<P>];
        [inactivity_scores]            [InactivityScores<P>];
        [current_sync_committee]       [Arc<SyncCommittee<P>>];
        [next_sync_committee]          [Arc<SyncCommittee<P>>];
    )]
    fn field(&self) -> &return_type {
        &self.field
    }

    #[duplicate_item(
        field                          method                             return_type;
        [previous_epoch_participation] [previous_epoch_participation_mut] [EpochParticipation<P>];
        [current_epoch_participation]  [current_epoch_participation_mut]  [EpochParticipation<P>];
        [inactivity_scores]            [inactivity_scores_mut]            [InactivityScores<P>];
        [current_sync_committee]       [current_sync_committee_mut]       [Arc<SyncCommittee<P>>];
        [next_sync_committee]          [next_sync_committee_mut]          [Arc<SyncCommittee<P>>];
    )]
    fn method(&mut self) -> &mut return_type {
        &mut self.field
    }
}

pub trait SignedBeaconBlock<P: Preset>: Debug + Send + Sync {
    fn message(&self) -> &dyn BeaconBlock<P>;
    fn signature(&self) -> SignatureBytes;
}

#[duplicate_item(
    implementor;
    [Phase0SignedBeaconBlock<P>];
    [AltairSignedBeaconBlock<P>];
)]
impl<P: Preset> SignedBeaconBlock<P> for implementor {
    fn message(&self) -> &dyn BeaconBlock<P> {
        &self.message
    }

    fn signature(&self) -> SignatureBytes {
        self.signature
    }
}

impl<P: Preset> SignedBeaconBlock<P> for CombinedSignedBeaconBlock<P> {
    fn message(&self) -> &dyn BeaconBlock<P> {
        match self {
            Self::Phase0(block) => &block.message,
            Self::Altair(block) => &block.message,
        }
    }

    fn signature(&self) -> SignatureBytes {
        match self {
            Self::Phase0(block) => block.signature,
            Self::Altair(block) => block.signature,
        }
    }
}

pub trait BeaconBlock<P: Preset>: Debug + Send + Sync {
    fn slot(&self) -> Slot;
    fn proposer_index(&self) -> ValidatorIndex;
    fn parent_root(&self) -> H256;
    fn state_root(&self) -> H256;
    fn body(&self) -> &dyn BeaconBlockBody<P>;
    fn body_root(&self) -> H256;

    fn to_header(&self) -> BeaconBlockHeader {
        BeaconBlockHeader {
            slot: self.slot(),
            proposer_index: self.proposer_index(),
            parent_root: self.parent_root(),
            state_root: self.state_root(),
            body_root: self.body_root(),
        }
    }
}

#[duplicate_item(
    implementor;
    [Phase0BeaconBlock<P>];
    [AltairBeaconBlock<P>];
)]
impl<P: Preset> BeaconBlock<P> for implementor {
    #[duplicate_item(
        field            return_type;
        [slot]           [Slot];
        [proposer_index] [ValidatorIndex];
        [parent_root]    [H256];
        [state_root]     [H256];
    )]
    fn field(&self) -> return_type {
        self.field
    }

    fn body(&self) -> &dyn BeaconBlockBody<P> {
        &self.body
    }

    fn body_root(&self) -> H256 {
        self.body.hash_tree_root()
    }
}

impl<P: Preset> BeaconBlock<P> for CombinedBeaconBlock<P> {
    #[duplicate_item(
        field            return_type;
        [slot]           [Slot];
        [proposer_index] [ValidatorIndex];
        [parent_root]    [H256];
        [state_root]     [H256];
    )]
    fn field(&self) -> return_type {
        match self {
            Self::Phase0(block) => block.field,
            Self::Altair(block) => block.field,
        }
    }

    fn body(&self) -> &dyn BeaconBlockBody<P> {
        match self {
            Self::Phase0(block) => &block.body,
            Self::Altair(block) => &block.body,
        }
    }

    fn body_root(&self) -> H256 {
        match self {
            Self::Phase0(block) => block.body.hash_tree_root(),
            Self::Altair(block) => block.body.hash_tree_root(),
        }
    }
}

pub trait BeaconBlockBody<P: Preset>: Debug + Send + Sync {
    fn randao_reveal(&self) -> SignatureBytes;
    fn eth1_data(&self) -> Eth1Data;
    fn graffiti(&self) -> H256;
    fn proposer_slashings(&self) -> &ContiguousList<ProposerSlashing, P::MaxProposerSlashings>;
    fn attester_slashings(&self)
        -> &ContiguousList<AttesterSlashing<P>, P::MaxAttesterSlashings>;
    fn attestations(&self) -> &ContiguousList<Attestation<P>, P::MaxAttestations>;
    fn deposits(&self) -> &ContiguousList<Deposit, P::MaxDeposits>;
    fn voluntary_exits(&self) -> &ContiguousList<SignedVoluntaryExit, P::MaxVoluntaryExits>;

    fn post_altair(&self) -> Option<&dyn PostAltairBeaconBlockBody<P>>;
}

#[duplicate_item(
    implementor                post_altair_body;
    [Phase0BeaconBlockBody<P>] [None];
    [AltairBeaconBlockBody<P>] [Some(self)];
)]
impl<P: Preset> BeaconBlockBody<P> for implementor {
    #[duplicate_item(
        field           return_type;
        [randao_reveal] [SignatureBytes];
        [eth1_data]     [Eth1Data];
        [graffiti]      [H256];
    )]
    fn field(&self) -> return_type {
        self.field
    }

    #[duplicate_item(
        field                return_type;
        [proposer_slashings] [ContiguousList<ProposerSlashing, P::MaxProposerSlashings>];
        [attester_slashings] [ContiguousList<AttesterSlashing<P>, P::MaxAttesterSlashings>];
        [attestations]       [ContiguousList<Attestation<P>, P::MaxAttestations>];
        [deposits]           [ContiguousList<Deposit, P::MaxDeposits>];
        [voluntary_exits]    [ContiguousList<SignedVoluntaryExit, P::MaxVoluntaryExits>];
    )]
    fn field(&self) -> &return_type {
        &self.field
    }

    fn post_altair(&self) -> Option<&dyn PostAltairBeaconBlockBody<P>> {
        post_altair_body
    }
}

pub trait PostAltairBeaconBlockBody<P: Preset>: BeaconBlockBody<P> {
    fn sync_aggregate(&self) -> &SyncAggregate<P>;
}

impl<P: Preset> PostAltairBeaconBlockBody<P> for AltairBeaconBlockBody<P> {
    fn sync_aggregate(&self) -> &SyncAggregate<P> {
        &self.sync_aggregate
    }
}
