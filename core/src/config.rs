use crate::validators::supermajority;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
	#[error("Active validator set cannot be empty")]
	ZeroValidators,
	#[error("Supermajority fraction {numerator}/{denominator} must be between 0 and 1")]
	InvalidThreshold { numerator: u64, denominator: u64 },
	#[error("Header window must span at least one round")]
	ZeroWindow,
	#[error("Processing threshold of {processing_threshold} headers exceeds window of {max_window} headers")]
	ProcessingThresholdExceedsWindow {
		processing_threshold: u64,
		max_window: u64,
	},
	#[error("Header window of {0} headers does not fit block heights")]
	WindowOverflow(u64),
}

/// Finality engine configuration, sized in rounds of the active validator set.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct BftConfig {
	/// Number of validators in the active set, one block each per round (default: 101).
	pub active_validators: u32,
	/// Numerator of the supermajority fraction (default: 2).
	pub threshold_numerator: u64,
	/// Denominator of the supermajority fraction (default: 3).
	pub threshold_denominator: u64,
	/// Number of rounds of headers kept in the ledger (default: 5).
	pub max_window_rounds: u32,
	/// Number of rounds of headers required before prevote claims are verified (default: 3).
	pub processing_threshold_rounds: u32,
	/// Finalized height to start from, e.g. restored from storage (default: 0).
	pub finalized_height: u32,
}

impl Default for BftConfig {
	fn default() -> Self {
		BftConfig {
			active_validators: 101,
			threshold_numerator: 2,
			threshold_denominator: 3,
			max_window_rounds: 5,
			processing_threshold_rounds: 3,
			finalized_height: 0,
		}
	}
}

impl BftConfig {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.active_validators == 0 {
			return Err(ConfigError::ZeroValidators);
		}

		if self.threshold_denominator == 0
			|| self.threshold_numerator == 0
			|| self.threshold_numerator >= self.threshold_denominator
		{
			return Err(ConfigError::InvalidThreshold {
				numerator: self.threshold_numerator,
				denominator: self.threshold_denominator,
			});
		}

		if self.max_window_rounds == 0 {
			return Err(ConfigError::ZeroWindow);
		}

		let max_window = self.headers_in(self.max_window_rounds);
		if max_window > u64::from(u32::MAX) {
			return Err(ConfigError::WindowOverflow(max_window));
		}

		let processing_threshold = self.headers_in(self.processing_threshold_rounds);
		if processing_threshold > max_window {
			return Err(ConfigError::ProcessingThresholdExceedsWindow {
				processing_threshold,
				max_window,
			});
		}

		Ok(())
	}

	/// Capacity of the header ledger.
	pub fn max_window(&self) -> u32 {
		self.active_validators
			.saturating_mul(self.max_window_rounds)
	}

	/// Ledger size from which prevote claims are verified.
	pub fn processing_threshold(&self) -> u32 {
		self.active_validators
			.saturating_mul(self.processing_threshold_rounds)
	}

	/// Weight needed for a supermajority of `total_weight`.
	pub fn threshold(&self, total_weight: u64) -> u64 {
		supermajority(
			total_weight,
			self.threshold_numerator,
			self.threshold_denominator,
		)
	}

	fn headers_in(&self, rounds: u32) -> u64 {
		u64::from(self.active_validators) * u64::from(rounds)
	}
}
