use std::sync::Arc;

use bls::PublicKeyBytes;
use enum_map::EnumMap;
use im::HashMap;
use once_cell::sync::OnceCell;

use crate::{
    altair::primitives::NonZeroGwei, nonstandard::RelativeEpoch, phase0::primitives::ValidatorIndex,
};

/// Values derived from a `BeaconState` that are expensive to recompute.
///
/// None of them are part of the state root. Transition functions keep them valid by clearing the
/// proposer index at every slot and rotating the per-epoch entries at every epoch boundary.
///
/// The fields are ordered from short-lived to long-lived.
#[derive(Clone, Default, Debug)]
pub struct Cache {
    pub proposer_index: OnceCell<ValidatorIndex>,
    pub active_validator_indices_ordered: EnumMap<RelativeEpoch, OnceCell<Arc<[ValidatorIndex]>>>,
    pub active_validator_indices_shuffled:
        EnumMap<RelativeEpoch, OnceCell<Arc<[ValidatorIndex]>>>,
    pub total_active_balance: EnumMap<RelativeEpoch, OnceCell<NonZeroGwei>>,
    pub validator_indices: OnceCell<HashMap<PublicKeyBytes, ValidatorIndex>>,
}

impl Cache {
    pub fn advance_slot(&mut self) {
        self.proposer_index.take();
    }

    pub fn advance_epoch(&mut self) {
        let ordered = &mut self.active_validator_indices_ordered;
        let shuffled = &mut self.active_validator_indices_shuffled;
        let balance = &mut self.total_active_balance;

        ordered[RelativeEpoch::Previous] = core::mem::take(&mut ordered[RelativeEpoch::Current]);
        shuffled[RelativeEpoch::Previous] = core::mem::take(&mut shuffled[RelativeEpoch::Current]);
        balance[RelativeEpoch::Previous] = core::mem::take(&mut balance[RelativeEpoch::Current]);

        ordered[RelativeEpoch::Current] = core::mem::take(&mut ordered[RelativeEpoch::Next]);
        shuffled[RelativeEpoch::Current] = core::mem::take(&mut shuffled[RelativeEpoch::Next]);
        balance[RelativeEpoch::Current] = core::mem::take(&mut balance[RelativeEpoch::Next]);
    }

    /// Records a validator appended to the registry if the index map has been built already.
    pub fn push_validator(&mut self, public_key: PublicKeyBytes, validator_index: ValidatorIndex) {
        if let Some(validator_indices) = self.validator_indices.get_mut() {
            validator_indices.insert(public_key, validator_index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_epoch_rotates_entries() {
        let mut cache = Cache::default();

        cache.active_validator_indices_ordered[RelativeEpoch::Next]
            .set(Arc::from([1, 2, 3]))
            .expect("cell is empty");

        cache.advance_epoch();

        assert!(cache.active_validator_indices_ordered[RelativeEpoch::Next]
            .get()
            .is_none());

        assert_eq!(
            cache.active_validator_indices_ordered[RelativeEpoch::Current]
                .get()
                .map(|indices| indices.to_vec()),
            Some(vec![1, 2, 3]),
        );
    }

    #[test]
    fn push_validator_only_updates_initialized_map() {
        let mut cache = Cache::default();
        let public_key = PublicKeyBytes::default();

        cache.push_validator(public_key, 0);
        assert!(cache.validator_indices.get().is_none());

        cache
            .validator_indices
            .set(HashMap::new())
            .expect("cell is empty");

        cache.push_validator(public_key, 7);
        assert_eq!(
            cache
                .validator_indices
                .get()
                .and_then(|indices| indices.get(&public_key))
                .copied(),
            Some(7),
        );
    }
}
