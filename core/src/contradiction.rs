//! Detection of contradicting headers, the evidence of generator misbehavior.
//!
//! Detection works on header values alone, so evidence can still be produced for headers
//! which have already left the ledger window.
use crate::types::{Address, HeaderRecord};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Rule violated by two headers of the same generator.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contradiction {
	/// Two different headers at the same height
	Equivocation,
	/// The later header does not build on the earlier one
	Disjointness,
	/// The later header claims a lower prevoted height
	BranchRegression,
}

impl Display for Contradiction {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Contradiction::Equivocation => write!(f, "equivocation"),
			Contradiction::Disjointness => write!(f, "disjointness"),
			Contradiction::BranchRegression => write!(f, "branch regression"),
		}
	}
}

/// Returns the rule two headers violate together, if any.
pub fn contradiction(first: &HeaderRecord, second: &HeaderRecord) -> Option<Contradiction> {
	if first.generator_address != second.generator_address || first == second {
		return None;
	}

	if first.height == second.height {
		return Some(Contradiction::Equivocation);
	}

	let (earlier, later) = if first.height < second.height {
		(first, second)
	} else {
		(second, first)
	};

	if later.max_height_generated < earlier.height {
		return Some(Contradiction::Disjointness);
	}

	if later.max_height_prevoted < earlier.max_height_prevoted {
		return Some(Contradiction::BranchRegression);
	}

	None
}

pub fn are_contradicting(first: &HeaderRecord, second: &HeaderRecord) -> bool {
	contradiction(first, second).is_some()
}

/// Two contradicting headers of one generator, ready to be reported.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MisbehaviorEvidence {
	pub generator_address: Address,
	pub contradiction: Contradiction,
	pub earlier: HeaderRecord,
	pub later: HeaderRecord,
}

impl MisbehaviorEvidence {
	pub fn new(first: &HeaderRecord, second: &HeaderRecord) -> Option<Self> {
		let contradiction = contradiction(first, second)?;
		let (earlier, later) = if first.height <= second.height {
			(first, second)
		} else {
			(second, first)
		};

		Some(MisbehaviorEvidence {
			generator_address: first.generator_address.clone(),
			contradiction,
			earlier: earlier.clone(),
			later: later.clone(),
		})
	}
}
