//! Drives the fork choice store and keeps states available for it.
//!
//! This crate handles the following concerns:
//! - Running the state transition for incoming blocks and feeding the results to [`Store`].
//! - [Regenerating states](`Controller::block_slot_state`) from the nearest available ancestor.
//! - [Persistence](`Storage`) of blocks and a subset of states.
//! - Notifying other components of head changes, reorganizations and finalization through
//!   [`Event`]s.
//! - Classifying errors with [`ErrorKind`].
//!
//! [`Store`]: fork_choice_store::Store

pub use crate::{
    controller::Controller,
    error::{Error, ErrorKind, RegenUnavailableReason},
    events::{Event, FinalizedEvent, HeadEvent, ReorgEvent},
    storage::{
        contains, delete, get, save, BlockByRoot, InMemoryStorage, PrefixableKey,
        StateByBlockRoot, StateByCheckpoint, Storage,
    },
};

mod controller;
mod error;
mod events;
mod regen;
mod storage;

#[cfg(test)]
mod helpers;
