//! Structural validation of a single header, independent of any chain state.
use crate::types::{HeaderRecord, ADDRESS_LENGTH, BLOCK_ID_LENGTH};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
	#[error("Header height must be positive")]
	ZeroHeight,
	#[error("Block id must be {expected} bytes long, got {0}", expected = BLOCK_ID_LENGTH)]
	InvalidIdLength(usize),
	#[error("Generator address must be {expected} bytes long, got {0}", expected = ADDRESS_LENGTH)]
	InvalidAddressLength(usize),
	#[error("maxHeightPrevoted {max_height_prevoted} is above header height {height}")]
	PrevotedAboveHeight {
		height: u32,
		max_height_prevoted: u32,
	},
	#[error("maxHeightGenerated {max_height_generated} is not below header height {height}")]
	GeneratedNotBelowHeight {
		height: u32,
		max_height_generated: u32,
	},
	#[error("activeSinceRound must be positive")]
	ZeroActiveRound,
}

/// Checks field ranges and identifier formats of a header.
pub fn validate_header(header: &HeaderRecord) -> Result<(), HeaderError> {
	if header.height == 0 {
		return Err(HeaderError::ZeroHeight);
	}

	if header.id.len() != BLOCK_ID_LENGTH {
		return Err(HeaderError::InvalidIdLength(header.id.len()));
	}

	if header.generator_address.len() != ADDRESS_LENGTH {
		return Err(HeaderError::InvalidAddressLength(
			header.generator_address.len(),
		));
	}

	if header.max_height_prevoted > header.height {
		return Err(HeaderError::PrevotedAboveHeight {
			height: header.height,
			max_height_prevoted: header.max_height_prevoted,
		});
	}

	if header.max_height_generated >= header.height {
		return Err(HeaderError::GeneratedNotBelowHeight {
			height: header.height,
			max_height_generated: header.max_height_generated,
		});
	}

	if header.active_since_round == Some(0) {
		return Err(HeaderError::ZeroActiveRound);
	}

	Ok(())
}
