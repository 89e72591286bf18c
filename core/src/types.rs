//! Shared header structs and identifiers.
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};

/// Length in bytes of a well-formed block id.
pub const BLOCK_ID_LENGTH: usize = 32;
/// Length in bytes of a well-formed generator address.
pub const ADDRESS_LENGTH: usize = 20;

macro_rules! hex_identifier {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(Vec<u8>);

		impl $name {
			pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
				$name(bytes.into())
			}

			pub fn as_bytes(&self) -> &[u8] {
				&self.0
			}

			pub fn len(&self) -> usize {
				self.0.len()
			}

			pub fn is_empty(&self) -> bool {
				self.0.is_empty()
			}
		}

		impl<const N: usize> From<[u8; N]> for $name {
			fn from(bytes: [u8; N]) -> Self {
				$name(bytes.to_vec())
			}
		}

		impl TryFrom<String> for $name {
			type Error = hex::FromHexError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				let value = value.strip_prefix("0x").unwrap_or(&value);
				hex::decode(value).map($name)
			}
		}

		impl From<$name> for String {
			fn from(value: $name) -> Self {
				hex::encode(value.0)
			}
		}

		impl Display for $name {
			fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
				write!(f, "{}", hex::encode(&self.0))
			}
		}

		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
				write!(f, "{}({})", stringify!($name), hex::encode(&self.0))
			}
		}
	};
}

hex_identifier!(
	/// Content-derived block identifier
	BlockId
);

hex_identifier!(
	/// Identity of the validator that generated a block
	Address
);

/// Per-block facts the finality engine reasons about.
///
/// Older chain history names two of the fields differently: `prevotedConfirmedUptoHeight`
/// and `maxHeightPreviouslyForged` are accepted as aliases when deserializing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderRecord {
	pub id: BlockId,
	pub height: u32,
	pub generator_address: Address,
	/// Highest height the generator saw prevoted by a supermajority when forging
	#[serde(alias = "prevotedConfirmedUptoHeight")]
	pub max_height_prevoted: u32,
	/// Height of the previous block forged by the same generator, `0` if none
	#[serde(alias = "maxHeightPreviouslyForged")]
	pub max_height_generated: u32,
	/// Round from which the generator is part of the active set
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub active_since_round: Option<u32>,
}

impl HeaderRecord {
	/// Lowest height this header may vote for, derived from `active_since_round`.
	pub fn min_height_active(&self, active_validators: u32) -> u32 {
		match self.active_since_round {
			Some(round) => round
				.saturating_sub(1)
				.saturating_mul(active_validators)
				.saturating_add(1),
			None => 1,
		}
	}
}

/// Round in which the block at `height` is forged, counting from `1`.
pub fn round_of(height: u32, active_validators: u32) -> u32 {
	height.saturating_sub(1) / active_validators.max(1) + 1
}

pub mod tracing_level_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::str::FromStr;
	use tracing::Level;

	pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&level.to_string())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		Level::from_str(&value).map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json;
	use test_case::test_case;

	#[test]
	fn header_json_uses_hex_and_camel_case() {
		let header = HeaderRecord {
			id: BlockId::from([0xab; BLOCK_ID_LENGTH]),
			height: 10,
			generator_address: Address::from([0x01; ADDRESS_LENGTH]),
			max_height_prevoted: 4,
			max_height_generated: 9,
			active_since_round: None,
		};

		let json = serde_json::to_value(&header).unwrap();
		assert_eq!(json["id"], "ab".repeat(BLOCK_ID_LENGTH));
		assert_eq!(json["generatorAddress"], "01".repeat(ADDRESS_LENGTH));
		assert_eq!(json["maxHeightPrevoted"], 4);
		assert_eq!(json["maxHeightGenerated"], 9);
		assert!(json.get("activeSinceRound").is_none());

		let decoded: HeaderRecord = serde_json::from_value(json).unwrap();
		assert_eq!(decoded, header);
	}

	#[test]
	fn legacy_field_names_are_accepted() {
		let json = format!(
			r#"{{"id":"0x{}","height":7,"generatorAddress":"{}","prevotedConfirmedUptoHeight":3,"maxHeightPreviouslyForged":2,"activeSinceRound":2}}"#,
			"11".repeat(BLOCK_ID_LENGTH),
			"22".repeat(ADDRESS_LENGTH)
		);

		let header: HeaderRecord = serde_json::from_str(&json).unwrap();
		assert_eq!(header.max_height_prevoted, 3);
		assert_eq!(header.max_height_generated, 2);
		assert_eq!(header.active_since_round, Some(2));
		assert_eq!(header.id.len(), BLOCK_ID_LENGTH);
	}

	#[test]
	fn malformed_hex_is_rejected() {
		let result: Result<Address, _> = serde_json::from_str("\"not-hex\"");
		assert!(result.is_err());
	}

	#[test_case(1, 101 => 1)]
	#[test_case(101, 101 => 1)]
	#[test_case(102, 101 => 2)]
	#[test_case(303, 101 => 3)]
	#[test_case(0, 101 => 1)]
	#[test_case(5, 0 => 5)]
	fn round_of_height(height: u32, active_validators: u32) -> u32 {
		round_of(height, active_validators)
	}

	#[test_case(None, 101 => 1)]
	#[test_case(Some(1), 101 => 1)]
	#[test_case(Some(2), 101 => 102)]
	#[test_case(Some(4), 4 => 13)]
	fn min_height_active(round: Option<u32>, active_validators: u32) -> u32 {
		let header = HeaderRecord {
			id: BlockId::from([0; BLOCK_ID_LENGTH]),
			height: 200,
			generator_address: Address::from([0; ADDRESS_LENGTH]),
			max_height_prevoted: 0,
			max_height_generated: 0,
			active_since_round: round,
		};
		header.min_height_active(active_validators)
	}
}
