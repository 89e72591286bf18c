//! Validator-set provider seam.
//!
//! The finality engine does not elect or rotate validators. It only needs to know how much
//! weight a generator carries in a round, and how much weight the whole active set carries.
use crate::types::Address;
use mockall::automock;

#[automock]
pub trait ValidatorSet {
	/// Voting weight of `generator` in `round`.
	fn weight(&self, generator: &Address, round: u32) -> u64;

	/// Combined weight of the active validator set in `round`.
	fn total_weight(&self, round: u32) -> u64;
}

/// Active set in which every validator carries the same weight of `1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformValidatorSet {
	active_validators: u32,
}

impl UniformValidatorSet {
	pub fn new(active_validators: u32) -> Self {
		UniformValidatorSet { active_validators }
	}

	pub fn active_validators(&self) -> u32 {
		self.active_validators
	}
}

impl ValidatorSet for UniformValidatorSet {
	fn weight(&self, _generator: &Address, _round: u32) -> u64 {
		1
	}

	fn total_weight(&self, _round: u32) -> u64 {
		u64::from(self.active_validators)
	}
}

impl<V: ValidatorSet + ?Sized> ValidatorSet for Box<V> {
	fn weight(&self, generator: &Address, round: u32) -> u64 {
		(**self).weight(generator, round)
	}

	fn total_weight(&self, round: u32) -> u64 {
		(**self).total_weight(round)
	}
}

/// Smallest weight that forms a supermajority: strictly more than the given fraction of
/// `total_weight`.
pub fn supermajority(total_weight: u64, numerator: u64, denominator: u64) -> u64 {
	let share = u128::from(total_weight) * u128::from(numerator) / u128::from(denominator.max(1));
	u64::try_from(share).unwrap_or(u64::MAX).saturating_add(1)
}

#[cfg(test)]
mod tests {
	use super::*;
	use test_case::test_case;

	#[test_case(1, 1 => true)]
	#[test_case(1, 2 => false)]
	#[test_case(2, 2 => true)]
	#[test_case(2, 3 => false)]
	#[test_case(3, 3 => true)]
	#[test_case(3, 4 => true)]
	#[test_case(4, 5 => true)]
	#[test_case(66, 100 => false)]
	#[test_case(67, 100 => true)]
	#[test_case(67, 101 => false)]
	#[test_case(68, 101 => true)]
	fn check_supermajority_condition(weight: u64, total_weight: u64) -> bool {
		weight >= supermajority(total_weight, 2, 3)
	}

	#[test]
	fn uniform_set_weighs_every_validator_equally() {
		let validators = UniformValidatorSet::new(101);
		let generator = Address::from([1; 20]);

		assert_eq!(validators.weight(&generator, 1), 1);
		assert_eq!(validators.weight(&generator, 42), 1);
		assert_eq!(validators.total_weight(7), 101);
		assert_eq!(supermajority(validators.total_weight(1), 2, 3), 68);
	}

	#[test]
	fn boxed_provider_delegates() {
		let mut mock = MockValidatorSet::new();
		mock.expect_weight().returning(|_, round| u64::from(round) * 2);
		mock.expect_total_weight().returning(|_| 30);

		let boxed: Box<dyn ValidatorSet> = Box::new(mock);
		assert_eq!(boxed.weight(&Address::from([0; 20]), 3), 6);
		assert_eq!(boxed.total_weight(3), 30);
	}
}
