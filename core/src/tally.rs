//! Pre-vote and pre-commit weight tally over the header window.
//!
//! Every header implicitly pre-votes for its own height and for the heights below it back
//! to the last block its generator forged, and pre-commits every height below it which has
//! already gathered a pre-vote supermajority. Both contributions are limited to the
//! processing threshold and to the generator's active period. A pre-commit is only counted
//! for heights on which the generator provably stayed on one chain, see
//! [`VoteTally::min_valid_height_to_precommit`].
//!
//! The greatest height with a pre-vote supermajority is the `max_height_prevoted` new
//! headers must claim. The greatest height with a pre-commit supermajority is final.
use crate::{
	config::BftConfig,
	ledger::BoundedHeaderLedger,
	types::{round_of, HeaderRecord},
	validators::ValidatorSet,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub struct VoteTally {
	config: BftConfig,
	finalized_height: u32,
	max_height_prevoted: u32,
	pre_votes: BTreeMap<u32, u64>,
	pre_commits: BTreeMap<u32, u64>,
}

impl VoteTally {
	pub fn new(config: &BftConfig) -> Self {
		VoteTally {
			config: config.clone(),
			finalized_height: config.finalized_height,
			max_height_prevoted: 0,
			pre_votes: BTreeMap::new(),
			pre_commits: BTreeMap::new(),
		}
	}

	pub fn finalized_height(&self) -> u32 {
		self.finalized_height
	}

	pub fn max_height_prevoted(&self) -> u32 {
		self.max_height_prevoted
	}

	/// Accumulated pre-vote weight for `height`.
	pub fn pre_votes(&self, height: u32) -> u64 {
		self.pre_votes.get(&height).copied().unwrap_or_default()
	}

	/// Accumulated pre-commit weight for `height`.
	pub fn pre_commits(&self, height: u32) -> u64 {
		self.pre_commits.get(&height).copied().unwrap_or_default()
	}

	/// Weight needed for a supermajority on `height`.
	pub fn threshold<V: ValidatorSet + ?Sized>(&self, height: u32, validators: &V) -> u64 {
		let round = round_of(height, self.config.active_validators);
		self.config.threshold(validators.total_weight(round))
	}

	/// Counts the votes of `header`, which is about to be appended to `ledger`.
	///
	/// Returns the finalized height after the update.
	pub fn apply<V: ValidatorSet + ?Sized>(
		&mut self,
		ledger: &BoundedHeaderLedger,
		header: &HeaderRecord,
		validators: &V,
	) -> u32 {
		let round = round_of(header.height, self.config.active_validators);
		let weight = validators.weight(&header.generator_address, round);
		let min_active = header.min_height_active(self.config.active_validators);
		let window_start = header.height.saturating_sub(self.config.processing_threshold());

		if weight > 0 {
			// Pre-commits are counted against the pre-votes of previous headers only
			let min_precommit = min_active
				.max(self.min_valid_height_to_precommit(ledger, header, min_active))
				.max(window_start);
			for height in min_precommit..header.height {
				if self.pre_votes(height) >= self.threshold(height, validators) {
					let pre_commits = self.pre_commits.entry(height).or_default();
					*pre_commits = pre_commits.saturating_add(weight);
				}
			}

			let min_prevote = min_active
				.max(header.max_height_generated + 1)
				.max(window_start);
			for height in min_prevote..=header.height {
				let pre_votes = self.pre_votes.entry(height).or_default();
				*pre_votes = pre_votes.saturating_add(weight);
			}
		}

		self.update_heights(validators);
		self.prune(header.height);
		self.finalized_height
	}

	/// Rebuilds the counters by replaying every header of `ledger` in height order.
	///
	/// The finalized height is kept, finality is never revoked.
	pub fn recompute<V: ValidatorSet + ?Sized>(
		&mut self,
		ledger: &BoundedHeaderLedger,
		validators: &V,
	) {
		self.pre_votes.clear();
		self.pre_commits.clear();
		self.max_height_prevoted = 0;

		for header in ledger.iter() {
			self.apply(ledger, header, validators);
		}
		debug!(
			headers = ledger.len(),
			max_height_prevoted = self.max_height_prevoted,
			finalized_height = self.finalized_height,
			"Recomputed vote tally"
		);
	}

	/// Lowest height `header` may pre-commit without contradicting its generator's history.
	///
	/// Walks back from the generator's previous block along its own chain. The search stops
	/// above the first height at which the generator forged elsewhere, broke its chain,
	/// claimed a larger prevoted height than `header`, or which is no longer in `ledger`.
	fn min_valid_height_to_precommit(
		&self,
		ledger: &BoundedHeaderLedger,
		header: &HeaderRecord,
		min_active: u32,
	) -> u32 {
		let search_till = header
			.height
			.saturating_sub(self.config.processing_threshold())
			.max(min_active)
			.max(1);

		let mut previous_height = header.max_height_generated;
		let mut needle = header
			.max_height_generated
			.max(header.height.saturating_sub(self.config.processing_threshold()));

		while needle >= search_till {
			let Some(past) = ledger.get(needle) else {
				return needle + 1;
			};

			if needle == previous_height {
				if past.generator_address != header.generator_address
					|| past.max_height_generated >= needle
				{
					return needle + 1;
				}
				previous_height = past.max_height_generated;
				needle = past.max_height_generated;
			} else {
				if past.generator_address == header.generator_address
					&& past.max_height_prevoted > header.max_height_prevoted
				{
					return needle + 1;
				}
				needle -= 1;
			}
		}

		search_till.max(needle + 1)
	}

	fn update_heights<V: ValidatorSet + ?Sized>(&mut self, validators: &V) {
		let prevoted = self
			.pre_votes
			.iter()
			.rev()
			.find(|(height, weight)| **weight >= self.threshold(**height, validators))
			.map(|(height, _)| *height);

		if let Some(height) = prevoted {
			if height != self.max_height_prevoted {
				debug!(
					previous = self.max_height_prevoted,
					max_height_prevoted = height,
					"Max prevoted height changed"
				);
			}
			self.max_height_prevoted = height;
		}

		let precommitted = self
			.pre_commits
			.iter()
			.rev()
			.find(|(height, weight)| **weight >= self.threshold(**height, validators))
			.map(|(height, _)| *height);

		if let Some(height) = precommitted.filter(|height| *height > self.finalized_height) {
			info!(
				previous = self.finalized_height,
				finalized_height = height,
				"Finalized height advanced"
			);
			self.finalized_height = height;
		}
	}

	fn prune(&mut self, tip: u32) {
		let cutoff = tip.saturating_sub(self.config.max_window()).saturating_add(1);
		self.pre_votes = self.pre_votes.split_off(&cutoff);
		self.pre_commits = self.pre_commits.split_off(&cutoff);
	}
}
