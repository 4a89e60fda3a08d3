use core::num::NonZeroU64;
use std::borrow::Cow;

use enum_iterator::Sequence as _;
use hex_literal::hex;
use nonzero_ext::nonzero;
use serde::{Deserialize, Serialize};
use typenum::Unsigned as _;

use crate::{
    nonstandard::Phase,
    phase0::{
        consts::{FAR_FUTURE_EPOCH, GENESIS_EPOCH},
        primitives::{ChainId, Epoch, Gwei, Slot, UnixSeconds, Version, H32},
    },
    preset::{Preset, PresetName},
};

/// Configuration variables customizable at runtime.
///
/// See [configurations in `consensus-specs`](https://github.com/ethereum/consensus-specs/tree/v1.1.0/configs).
///
/// A `Config` is passed explicitly to every function that needs one.
/// There is no global instance.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    // Meta
    pub config_name: Cow<'static, str>,
    pub preset_base: PresetName,

    // Genesis
    pub genesis_delay: u64,
    pub genesis_fork_version: Version,
    pub min_genesis_active_validator_count: NonZeroU64,
    pub min_genesis_time: UnixSeconds,

    // Forking
    pub altair_fork_epoch: Epoch,
    pub altair_fork_version: Version,

    // Time parameters
    pub min_validator_withdrawability_delay: u64,
    pub seconds_per_slot: NonZeroU64,
    pub shard_committee_period: u64,

    // Validator cycle
    pub churn_limit_quotient: NonZeroU64,
    pub ejection_balance: Gwei,
    pub inactivity_score_bias: NonZeroU64,
    pub inactivity_score_recovery_rate: u64,
    pub min_per_epoch_churn_limit: u64,

    // Fork choice
    pub safe_slots_to_update_justified: u64,
    /// Percentage of committee weight given to a timely block proposed in the current slot.
    /// `None` disables proposer boost.
    pub proposer_score_boost: Option<u64>,

    // Deposit contract
    pub deposit_chain_id: ChainId,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Meta
            config_name: Cow::Borrowed("mainnet"),
            preset_base: PresetName::Mainnet,

            // Genesis
            genesis_delay: 604_800,
            genesis_fork_version: H32(hex!("00000000")),
            min_genesis_active_validator_count: nonzero!(1_u64 << 14),
            min_genesis_time: 0,

            // Forking
            altair_fork_epoch: FAR_FUTURE_EPOCH,
            altair_fork_version: H32(hex!("01000000")),

            // Time parameters
            min_validator_withdrawability_delay: 256,
            seconds_per_slot: nonzero!(12_u64),
            shard_committee_period: 256,

            // Validator cycle
            churn_limit_quotient: nonzero!(1_u64 << 16),
            ejection_balance: 16_000_000_000,
            inactivity_score_bias: nonzero!(4_u64),
            inactivity_score_recovery_rate: 16,
            min_per_epoch_churn_limit: 4,

            // Fork choice
            safe_slots_to_update_justified: 8,
            proposer_score_boost: Some(40),

            // Deposit contract
            deposit_chain_id: 0,
        }
    }
}

impl Config {
    /// [Mainnet configuration](https://github.com/ethereum/consensus-specs/blob/v1.1.0/configs/mainnet.yaml).
    #[must_use]
    pub fn mainnet() -> Self {
        Self {
            min_genesis_time: 1_606_824_000,
            altair_fork_epoch: 74240,
            deposit_chain_id: 1,
            ..Self::default()
        }
    }

    /// [Minimal configuration](https://github.com/ethereum/consensus-specs/blob/v1.1.0/configs/minimal.yaml).
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            // Meta
            config_name: Cow::Borrowed("minimal"),
            preset_base: PresetName::Minimal,

            // Genesis
            genesis_delay: 300,
            genesis_fork_version: H32(hex!("00000001")),
            min_genesis_active_validator_count: nonzero!(64_u64),
            min_genesis_time: 1_578_009_600,

            // Forking
            altair_fork_version: H32(hex!("01000001")),

            // Time parameters
            seconds_per_slot: nonzero!(6_u64),
            shard_committee_period: 64,

            // Validator cycle
            churn_limit_quotient: nonzero!(32_u64),
            min_per_epoch_churn_limit: 2,

            // Fork choice
            safe_slots_to_update_justified: 2,

            // Deposit contract
            deposit_chain_id: 5,

            ..Self::default()
        }
    }

    #[must_use]
    pub fn start_and_stay_in(mut self, phase: Phase) -> Self {
        for (later_phase, fork_epoch) in self.fork_epochs_mut() {
            *fork_epoch = if later_phase <= phase {
                GENESIS_EPOCH
            } else {
                FAR_FUTURE_EPOCH
            };
        }

        self
    }

    #[must_use]
    pub fn without_proposer_boost(self) -> Self {
        Self {
            proposer_score_boost: None,
            ..self
        }
    }

    #[must_use]
    pub const fn version(&self, phase: Phase) -> Version {
        match phase {
            Phase::Phase0 => self.genesis_fork_version,
            Phase::Altair => self.altair_fork_version,
        }
    }

    #[must_use]
    pub fn version_at_epoch(&self, epoch: Epoch) -> Version {
        self.version(self.phase_at_epoch(epoch))
    }

    #[must_use]
    pub const fn fork_epoch(&self, phase: Phase) -> Epoch {
        match phase {
            Phase::Phase0 => GENESIS_EPOCH,
            Phase::Altair => self.altair_fork_epoch,
        }
    }

    /// Returns the first slot of `phase` or `None` if the phase is not scheduled.
    #[must_use]
    pub fn fork_slot<P: Preset>(&self, phase: Phase) -> Option<Slot> {
        self.fork_epoch(phase).checked_mul(P::SlotsPerEpoch::U64)
    }

    #[must_use]
    pub fn phase_at_epoch(&self, epoch: Epoch) -> Phase {
        self.fork_epochs()
            .take_while(|(_, fork_epoch)| *fork_epoch <= epoch)
            .map(|(phase, _)| phase)
            .last()
            .unwrap_or(Phase::Phase0)
    }

    #[must_use]
    pub fn phase_at_slot<P: Preset>(&self, slot: Slot) -> Phase {
        self.phase_at_epoch(slot / P::SlotsPerEpoch::U64)
    }

    fn fork_epochs(&self) -> impl Iterator<Item = (Phase, Epoch)> {
        // Do not remove the type annotation.
        // It ensures that this method is up to date when new phases are added.
        let fields: [_; Phase::CARDINALITY - 1] = [self.altair_fork_epoch];

        enum_iterator::all().skip(1).zip(fields)
    }

    fn fork_epochs_mut(&mut self) -> impl Iterator<Item = (Phase, &mut Epoch)> {
        let fields: [_; Phase::CARDINALITY - 1] = [&mut self.altair_fork_epoch];

        enum_iterator::all().skip(1).zip(fields)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use crate::preset::Minimal;

    use super::*;

    #[test_case(0, Phase::Phase0)]
    #[test_case(74239, Phase::Phase0)]
    #[test_case(74240, Phase::Altair)]
    #[test_case(FAR_FUTURE_EPOCH, Phase::Altair)]
    fn mainnet_phase_at_epoch(epoch: Epoch, expected: Phase) {
        assert_eq!(Config::mainnet().phase_at_epoch(epoch), expected);
    }

    #[test]
    fn minimal_stays_in_phase0_unless_told_otherwise() {
        let config = Config::minimal();

        assert_eq!(config.phase_at_slot::<Minimal>(1_000_000), Phase::Phase0);
        assert_eq!(config.fork_slot::<Minimal>(Phase::Altair), None);
    }

    #[test]
    fn start_and_stay_in_altair_moves_fork_to_genesis() {
        let config = Config::minimal().start_and_stay_in(Phase::Altair);

        assert_eq!(config.phase_at_slot::<Minimal>(0), Phase::Altair);
        assert_eq!(config.fork_slot::<Minimal>(Phase::Altair), Some(0));
        assert_eq!(config.version_at_epoch(0), config.altair_fork_version);
    }

    #[test]
    fn config_deserializes_from_partial_json() {
        let config = serde_json::from_str::<Config>(
            r#"{"PRESET_BASE": "minimal", "PROPOSER_SCORE_BOOST": null, "SHARD_COMMITTEE_PERIOD": 4}"#,
        )
        .expect("JSON is a valid partial configuration");

        assert_eq!(config.preset_base, PresetName::Minimal);
        assert_eq!(config.proposer_score_boost, None);
        assert_eq!(config.shard_committee_period, 4);
        assert_eq!(config.churn_limit_quotient, Config::default().churn_limit_quotient);
    }
}
