//! Fork-choice verification of a candidate header against the ledger.
use crate::{
	ledger::BoundedHeaderLedger,
	tally::VoteTally,
	types::{Address, BlockId, HeaderRecord},
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForkChoiceError {
	#[error("Wrong maxHeightPrevoted in header {id}: claimed {claimed}, expected {expected}")]
	WrongPrevoteClaim {
		id: BlockId,
		claimed: u32,
		expected: u32,
	},
	#[error("Violation of fork choice rule, generator {generator} moved to a different chain: height {height} is not above its last height {last_height}")]
	ForkChoice {
		generator: Address,
		height: u32,
		last_height: u32,
	},
	#[error("Violates disjointness condition: generator {generator} claims maxHeightGenerated {claimed}, its last height is {last_height}")]
	Disjointness {
		generator: Address,
		claimed: u32,
		last_height: u32,
	},
	#[error("Violates that generator {generator} chooses the branch with the largest maxHeightPrevoted: {claimed} is below {last_prevoted}")]
	BranchRegression {
		generator: Address,
		claimed: u32,
		last_prevoted: u32,
	},
}

pub struct ForkChoiceVerifier {
	processing_threshold: usize,
}

impl ForkChoiceVerifier {
	/// Prevote claims are only checked once the ledger holds `processing_threshold` headers.
	pub fn new(processing_threshold: u32) -> Self {
		ForkChoiceVerifier {
			processing_threshold: processing_threshold as usize,
		}
	}

	/// Whether the ledger holds enough history to verify prevote claims.
	pub fn can_verify_prevote_claims(&self, ledger: &BoundedHeaderLedger) -> bool {
		ledger.len() >= self.processing_threshold
	}

	/// Verifies `candidate` against the ledger, checking its prevote claim against `tally`
	/// when `check_prevote_claims` is set.
	pub fn verify(
		&self,
		ledger: &BoundedHeaderLedger,
		tally: &VoteTally,
		candidate: &HeaderRecord,
		check_prevote_claims: bool,
	) -> Result<(), ForkChoiceError> {
		if check_prevote_claims && candidate.max_height_prevoted != tally.max_height_prevoted()
		{
			return Err(ForkChoiceError::WrongPrevoteClaim {
				id: candidate.id.clone(),
				claimed: candidate.max_height_prevoted,
				expected: tally.max_height_prevoted(),
			});
		}

		verify_generator_chain(ledger, candidate)
	}
}

/// Checks that `candidate` extends its generator's last header in the ledger.
pub fn verify_generator_chain(
	ledger: &BoundedHeaderLedger,
	candidate: &HeaderRecord,
) -> Result<(), ForkChoiceError> {
	let Some(last) = ledger.last_header_by(&candidate.generator_address) else {
		return Ok(());
	};

	if candidate.height <= last.height {
		return Err(ForkChoiceError::ForkChoice {
			generator: candidate.generator_address.clone(),
			height: candidate.height,
			last_height: last.height,
		});
	}

	if candidate.max_height_generated != last.height {
		return Err(ForkChoiceError::Disjointness {
			generator: candidate.generator_address.clone(),
			claimed: candidate.max_height_generated,
			last_height: last.height,
		});
	}

	if candidate.max_height_prevoted < last.max_height_prevoted {
		return Err(ForkChoiceError::BranchRegression {
			generator: candidate.generator_address.clone(),
			claimed: candidate.max_height_prevoted,
			last_prevoted: last.max_height_prevoted,
		});
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		config::BftConfig,
		types::{ADDRESS_LENGTH, BLOCK_ID_LENGTH},
	};
	use test_case::test_case;

	const GENERATOR: u8 = 7;

	fn header(height: u32, generator: u8, prevoted: u32, generated: u32) -> HeaderRecord {
		let mut id = [generator; BLOCK_ID_LENGTH];
		id[..4].copy_from_slice(&height.to_be_bytes());
		HeaderRecord {
			id: BlockId::from(id),
			height,
			generator_address: Address::from([generator; ADDRESS_LENGTH]),
			max_height_prevoted: prevoted,
			max_height_generated: generated,
			active_since_round: None,
		}
	}

	/// Ledger with heights 1..=14 where `GENERATOR` forged height 10 with prevoted height 6.
	fn ledger() -> BoundedHeaderLedger {
		let mut ledger = BoundedHeaderLedger::new(100);
		for height in 1..=14 {
			let header = if height == 10 {
				header(10, GENERATOR, 6, 9)
			} else {
				header(height, (height % 5) as u8, 0, 0)
			};
			ledger.push(header).unwrap();
		}
		ledger
	}

	#[test_case(header(15, GENERATOR, 6, 10) => Ok(()); "extends own chain")]
	#[test_case(header(15, 42, 0, 0) => Ok(()); "first header of generator")]
	#[test_case(header(10, GENERATOR, 6, 9) => matches Err(ForkChoiceError::ForkChoice { height: 10, last_height: 10, .. }); "same height")]
	#[test_case(header(8, GENERATOR, 6, 7) => matches Err(ForkChoiceError::ForkChoice { height: 8, last_height: 10, .. }); "older chain")]
	#[test_case(header(15, GENERATOR, 6, 9) => matches Err(ForkChoiceError::Disjointness { claimed: 9, last_height: 10, .. }); "skips last block")]
	#[test_case(header(15, GENERATOR, 6, 12) => matches Err(ForkChoiceError::Disjointness { claimed: 12, last_height: 10, .. }); "claims unknown block")]
	#[test_case(header(15, GENERATOR, 5, 10) => matches Err(ForkChoiceError::BranchRegression { claimed: 5, last_prevoted: 6, .. }); "prevoted regression")]
	fn generator_chain(candidate: HeaderRecord) -> Result<(), ForkChoiceError> {
		verify_generator_chain(&ledger(), &candidate)
	}

	#[test]
	fn prevote_claims_are_skipped_while_bootstrapping() {
		let config = BftConfig {
			active_validators: 5,
			..Default::default()
		};
		let tally = VoteTally::new(&config);
		let ledger = ledger();

		let verifier = ForkChoiceVerifier::new(config.processing_threshold());
		assert!(!verifier.can_verify_prevote_claims(&ledger));
		assert_eq!(
			verifier.verify(
				&ledger,
				&tally,
				&header(15, GENERATOR, 9, 10),
				verifier.can_verify_prevote_claims(&ledger),
			),
			Ok(())
		);

		let strict = ForkChoiceVerifier::new(14);
		assert!(strict.can_verify_prevote_claims(&ledger));
		assert_eq!(
			strict.verify(
				&ledger,
				&tally,
				&header(15, GENERATOR, 9, 10),
				strict.can_verify_prevote_claims(&ledger),
			),
			Err(ForkChoiceError::WrongPrevoteClaim {
				id: header(15, GENERATOR, 9, 10).id,
				claimed: 9,
				expected: 0,
			})
		);
	}

	#[test]
	fn chain_rules_apply_while_bootstrapping() {
		let config = BftConfig::default();
		let tally = VoteTally::new(&config);
		let verifier = ForkChoiceVerifier::new(config.processing_threshold());

		let result = verifier.verify(&ledger(), &tally, &header(15, GENERATOR, 6, 9), false);
		assert!(matches!(result, Err(ForkChoiceError::Disjointness { .. })));
	}
}
