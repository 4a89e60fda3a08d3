use std::collections::BTreeMap;

use anyhow::Result;
use derive_more::Display;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use types::phase0::{containers::Checkpoint, primitives::H256};

/// Byte-oriented key-value store holding snapshots of blocks and states.
///
/// Values are encoded with `bincode`. Keys are the [`Display`] representations of the key types
/// in this module.
pub trait Storage: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<()>;

    fn delete(&self, key: &[u8]) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryStorage {
    entries: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: impl core::fmt::Display) -> bool {
        self.entries
            .lock()
            .contains_key(serialize_key(key).as_bytes())
    }
}

impl Storage for InMemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.entries.lock().insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

pub fn save<V: Serialize + ?Sized>(
    storage: &(impl Storage + ?Sized),
    key: impl core::fmt::Display,
    value: &V,
) -> Result<()> {
    storage.put(serialize_key(key).as_bytes(), bincode::serialize(value)?)
}

pub fn get<V: DeserializeOwned>(
    storage: &(impl Storage + ?Sized),
    key: impl core::fmt::Display,
) -> Result<Option<V>> {
    storage
        .get(serialize_key(key).as_bytes())?
        .map(|bytes| bincode::deserialize(&bytes))
        .transpose()
        .map_err(Into::into)
}

pub fn contains(storage: &(impl Storage + ?Sized), key: impl core::fmt::Display) -> Result<bool> {
    Ok(storage.get(serialize_key(key).as_bytes())?.is_some())
}

pub fn delete(storage: &(impl Storage + ?Sized), key: impl core::fmt::Display) -> Result<()> {
    storage.delete(serialize_key(key).as_bytes())
}

fn serialize_key(key: impl core::fmt::Display) -> String {
    key.to_string()
}

pub trait PrefixableKey {
    const PREFIX: &'static str;
}

#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
pub struct BlockByRoot(pub H256);

impl PrefixableKey for BlockByRoot {
    const PREFIX: &'static str = "b";
}

/// Post-state of the block with the given root.
#[derive(Display)]
#[display("{}{_0:x}", Self::PREFIX)]
pub struct StateByBlockRoot(pub H256);

impl PrefixableKey for StateByBlockRoot {
    const PREFIX: &'static str = "s";
}

/// Post-state of the checkpoint block advanced to the start of the checkpoint epoch.
#[derive(Display)]
#[display("{}{:020}_{:x}", Self::PREFIX, _0.epoch, _0.root)]
pub struct StateByCheckpoint(pub Checkpoint);

impl PrefixableKey for StateByCheckpoint {
    const PREFIX: &'static str = "c";
}

#[cfg(test)]
mod tests {
    use types::{
        combined::BeaconState, phase0::beacon_state::BeaconState as Phase0BeaconState,
        preset::Minimal, traits::BeaconState as _,
    };

    use super::*;

    #[test]
    fn keys_have_distinct_prefixes() {
        let root = H256::repeat_byte(0xab);
        let checkpoint = Checkpoint { epoch: 3, root };

        let block_key = BlockByRoot(root).to_string();
        let state_key = StateByBlockRoot(root).to_string();
        let checkpoint_key = StateByCheckpoint(checkpoint).to_string();

        assert!(block_key.starts_with("babab"));
        assert!(state_key.starts_with("sabab"));
        assert!(checkpoint_key.starts_with("c00000000000000000003_abab"));
    }

    #[test]
    fn states_are_saved_loaded_and_deleted() -> Result<()> {
        let storage = InMemoryStorage::default();
        let root = H256::repeat_byte(1);

        let state = BeaconState::<Minimal>::from(Phase0BeaconState {
            slot: 17,
            ..Phase0BeaconState::default()
        });

        assert_eq!(get::<BeaconState<Minimal>>(&storage, StateByBlockRoot(root))?, None);

        save(&storage, StateByBlockRoot(root), &state)?;

        assert!(storage.contains(StateByBlockRoot(root)));

        let loaded = get::<BeaconState<Minimal>>(&storage, StateByBlockRoot(root))?
            .expect("state was saved");

        assert_eq!(loaded.slot(), 17);
        assert_eq!(loaded, state);

        delete(&storage, StateByBlockRoot(root))?;

        assert!(storage.is_empty());

        Ok(())
    }
}
