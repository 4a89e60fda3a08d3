use core::time::Duration;

use derivative::Derivative;
use serde::{Deserialize, Serialize};
use typenum::Unsigned as _;
use types::preset::Preset;

pub const DEFAULT_CACHE_LOCK_TIMEOUT_MILLIS: u64 = 1500;

#[derive(Clone, Copy, Debug, Derivative, Deserialize, Serialize)]
#[derivative(Default)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Maximum number of slots to process without blocks when computing a state.
    #[derivative(Default(value = "32"))]
    pub max_empty_slots: u64,
    /// Maximum number of epochs worth of blocks to replay when computing a state.
    #[derivative(Default(value = "5"))]
    pub max_epochs_to_replay: u64,
    #[derivative(Default(value = "128"))]
    pub unfinalized_states_in_memory: u64,
    #[derivative(Default(
        value = "Duration::from_millis(DEFAULT_CACHE_LOCK_TIMEOUT_MILLIS)"
    ))]
    pub state_cache_lock_timeout: Duration,
}

impl StoreConfig {
    #[must_use]
    pub fn minimal<P: Preset>() -> Self {
        Self {
            unfinalized_states_in_memory: Self::min_unfinalized_states_in_memory::<P>(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn min_unfinalized_states_in_memory<P: Preset>() -> u64 {
        // Blocks older than 2 epochs should rarely be needed in well-behaved networks.
        P::SlotsPerEpoch::U64 * 2
    }

    #[must_use]
    pub fn max_blocks_to_replay<P: Preset>(&self) -> u64 {
        self.max_epochs_to_replay
            .saturating_mul(P::SlotsPerEpoch::U64)
    }
}

#[cfg(test)]
mod tests {
    use types::preset::{Mainnet, Minimal};

    use super::*;

    #[test]
    fn replay_bound_scales_with_preset() {
        let store_config = StoreConfig::default();

        assert_eq!(store_config.max_blocks_to_replay::<Minimal>(), 40);
        assert_eq!(store_config.max_blocks_to_replay::<Mainnet>(), 160);
    }

    #[test]
    fn missing_fields_are_filled_with_defaults() -> Result<(), serde_json::Error> {
        let store_config = serde_json::from_str::<StoreConfig>(r#"{"max_empty_slots": 8}"#)?;

        assert_eq!(store_config.max_empty_slots, 8);
        assert_eq!(store_config.max_epochs_to_replay, 5);

        Ok(())
    }
}
