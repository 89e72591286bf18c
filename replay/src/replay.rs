//! Replay of a JSON lines header stream through the finality engine.
use color_eyre::{eyre::WrapErr, Result};
use finality_core::{
	contradiction::MisbehaviorEvidence,
	engine::BftEngine,
	types::{Address, HeaderRecord},
	validators::ValidatorSet,
};
use std::{
	collections::HashMap,
	fmt::{self, Display, Formatter},
	io::BufRead,
};
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
	pub accepted: usize,
	pub rejected: usize,
	pub misbehaviors: Vec<MisbehaviorEvidence>,
	pub finalized_height: u32,
	pub max_height_prevoted: u32,
}

impl Display for ReplaySummary {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		writeln!(f, "Headers accepted: {}", self.accepted)?;
		writeln!(f, "Headers rejected: {}", self.rejected)?;
		writeln!(f, "Misbehaviors detected: {}", self.misbehaviors.len())?;
		writeln!(f, "Finalized height: {}", self.finalized_height)?;
		write!(f, "Max prevoted height: {}", self.max_height_prevoted)
	}
}

/// Adds every header of `input` to `engine`, one JSON object per line.
///
/// Rejected headers are checked against the last accepted header of their generator,
/// contradictions found this way are collected as misbehavior evidence.
pub fn replay<V: ValidatorSet>(
	engine: &mut BftEngine<V>,
	input: impl BufRead,
) -> Result<ReplaySummary> {
	let mut summary = ReplaySummary::default();
	let mut last_accepted: HashMap<Address, HeaderRecord> = HashMap::new();

	for (index, line) in input.lines().enumerate() {
		let line_number = index + 1;
		let line = line.wrap_err_with(|| format!("Failed to read line {line_number}"))?;
		if line.trim().is_empty() {
			continue;
		}

		let header: HeaderRecord = serde_json::from_str(&line)
			.wrap_err_with(|| format!("Invalid header on line {line_number}"))?;

		match engine.add_header(header.clone()) {
			Ok(finalized_height) => {
				debug!(height = header.height, finalized_height, "Header accepted");
				summary.accepted += 1;
				last_accepted.insert(header.generator_address.clone(), header);
			},
			Err(error) => {
				debug!(line_number, height = header.height, %error, "Header rejected");
				summary.rejected += 1;

				let evidence = last_accepted
					.get(&header.generator_address)
					.and_then(|last| MisbehaviorEvidence::new(last, &header));
				if let Some(evidence) = evidence {
					warn!(
						generator = %evidence.generator_address,
						contradiction = %evidence.contradiction,
						earlier = evidence.earlier.height,
						later = evidence.later.height,
						"Misbehavior detected"
					);
					summary.misbehaviors.push(evidence);
				}
			},
		}
	}

	summary.finalized_height = engine.finalized_height();
	summary.max_height_prevoted = engine.max_height_prevoted();
	Ok(summary)
}
