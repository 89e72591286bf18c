//! Size-bounded, height-ordered store of the most recent headers.
//!
//! Headers are kept in a ring buffer: once the ledger is full, every append evicts the
//! oldest header. Heights are contiguous, so a header is located by its offset from the
//! oldest entry. Two auxiliary indexes map block ids and generator addresses to heights,
//! which keeps fork-choice lookups independent of the window size.
use crate::types::{Address, BlockId, HeaderRecord};
use std::collections::{HashMap, VecDeque};
use std::ops::RangeInclusive;
use thiserror::Error;
use tracing::trace;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
	#[error("Header at height {height} does not extend ledger tip at height {tip}")]
	NonContiguousHeight { height: u32, tip: u32 },
	#[error("Cannot remove headers above height {height}, finalized height is {finalized}")]
	RollbackBelowFinalized { height: u32, finalized: u32 },
}

pub struct BoundedHeaderLedger {
	headers: VecDeque<HeaderRecord>,
	capacity: usize,
	heights_by_id: HashMap<BlockId, u32>,
	last_height_by_generator: HashMap<Address, u32>,
}

impl BoundedHeaderLedger {
	/// Creates an empty ledger holding at most `capacity` headers (at least one).
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		BoundedHeaderLedger {
			headers: VecDeque::with_capacity(capacity),
			capacity,
			heights_by_id: HashMap::with_capacity(capacity),
			last_height_by_generator: HashMap::new(),
		}
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn len(&self) -> usize {
		self.headers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.headers.is_empty()
	}

	pub fn is_full(&self) -> bool {
		self.headers.len() == self.capacity
	}

	/// Oldest header still in the window.
	pub fn first(&self) -> Option<&HeaderRecord> {
		self.headers.front()
	}

	/// Most recently appended header.
	pub fn last(&self) -> Option<&HeaderRecord> {
		self.headers.back()
	}

	pub fn get(&self, height: u32) -> Option<&HeaderRecord> {
		let first = self.headers.front()?.height;
		let offset = height.checked_sub(first)?;
		self.headers.get(offset as usize)
	}

	pub fn get_by_id(&self, id: &BlockId) -> Option<&HeaderRecord> {
		self.heights_by_id
			.get(id)
			.and_then(|height| self.get(*height))
	}

	/// Headers with heights in the given range, in ascending order.
	pub fn range(&self, heights: RangeInclusive<u32>) -> impl Iterator<Item = &HeaderRecord> {
		let (start, end) = heights.into_inner();
		self.headers
			.iter()
			.skip_while(move |header| header.height < start)
			.take_while(move |header| header.height <= end)
	}

	/// Up to `count` most recent headers, in ascending order.
	pub fn top(&self, count: usize) -> impl Iterator<Item = &HeaderRecord> {
		self.headers
			.iter()
			.skip(self.headers.len().saturating_sub(count))
	}

	pub fn iter(&self) -> impl Iterator<Item = &HeaderRecord> {
		self.headers.iter()
	}

	/// All headers of the given generator still in the window, in ascending order.
	pub fn headers_by<'a>(
		&'a self,
		generator: &'a Address,
	) -> impl Iterator<Item = &'a HeaderRecord> + 'a {
		self.headers
			.iter()
			.filter(move |header| &header.generator_address == generator)
	}

	pub fn last_header_by(&self, generator: &Address) -> Option<&HeaderRecord> {
		self.last_height_by_generator
			.get(generator)
			.and_then(|height| self.get(*height))
	}

	/// Checks that `header` can be appended at the tip.
	pub fn ensure_extends(&self, header: &HeaderRecord) -> Result<(), LedgerError> {
		match self.last() {
			Some(tip) if tip.height.checked_add(1) != Some(header.height) => {
				Err(LedgerError::NonContiguousHeight {
					height: header.height,
					tip: tip.height,
				})
			},
			_ => Ok(()),
		}
	}

	/// Appends a header at the tip, returning the evicted header if the ledger was full.
	pub fn push(&mut self, header: HeaderRecord) -> Result<Option<HeaderRecord>, LedgerError> {
		self.ensure_extends(&header)?;

		let evicted = if self.is_full() {
			self.evict_oldest()
		} else {
			None
		};

		self.heights_by_id.insert(header.id.clone(), header.height);
		self.last_height_by_generator
			.insert(header.generator_address.clone(), header.height);
		self.headers.push_back(header);

		Ok(evicted)
	}

	/// Removes and returns every header above `height`, in ascending order.
	pub fn remove_above(&mut self, height: u32) -> Vec<HeaderRecord> {
		let Some(first) = self.headers.front().map(|header| header.height) else {
			return vec![];
		};

		let keep = match height.checked_sub(first) {
			Some(offset) => (offset as usize + 1).min(self.headers.len()),
			None => 0,
		};

		let removed: Vec<HeaderRecord> = self.headers.split_off(keep).into();
		if !removed.is_empty() {
			self.reindex();
		}
		removed
	}

	pub fn clear(&mut self) {
		self.headers.clear();
		self.heights_by_id.clear();
		self.last_height_by_generator.clear();
	}

	fn evict_oldest(&mut self) -> Option<HeaderRecord> {
		let oldest = self.headers.pop_front()?;
		trace!(height = oldest.height, "Evicting header from ledger");

		if self.heights_by_id.get(&oldest.id) == Some(&oldest.height) {
			self.heights_by_id.remove(&oldest.id);
		}
		// Generator heights are increasing, so the index only points at the evicted
		// header when it was that generator's last one in the window.
		if self.last_height_by_generator.get(&oldest.generator_address) == Some(&oldest.height) {
			self.last_height_by_generator
				.remove(&oldest.generator_address);
		}
		Some(oldest)
	}

	fn reindex(&mut self) {
		self.heights_by_id.clear();
		self.last_height_by_generator.clear();
		for header in &self.headers {
			self.heights_by_id.insert(header.id.clone(), header.height);
			self.last_height_by_generator
				.insert(header.generator_address.clone(), header.height);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::{ADDRESS_LENGTH, BLOCK_ID_LENGTH};
	use proptest::prelude::*;

	fn header(height: u32, generator: u8) -> HeaderRecord {
		let mut id = [generator; BLOCK_ID_LENGTH];
		id[..4].copy_from_slice(&height.to_be_bytes());
		HeaderRecord {
			id: BlockId::from(id),
			height,
			generator_address: Address::from([generator; ADDRESS_LENGTH]),
			max_height_prevoted: 0,
			max_height_generated: 0,
			active_since_round: None,
		}
	}

	fn filled(capacity: usize, heights: RangeInclusive<u32>, generators: u32) -> BoundedHeaderLedger {
		let mut ledger = BoundedHeaderLedger::new(capacity);
		for height in heights {
			ledger
				.push(header(height, (height % generators) as u8))
				.unwrap();
		}
		ledger
	}

	#[test]
	fn lookups_by_height_id_and_generator() {
		let ledger = filled(10, 1..=6, 3);

		assert_eq!(ledger.len(), 6);
		assert_eq!(ledger.get(4).map(|h| h.height), Some(4));
		assert!(ledger.get(0).is_none());
		assert!(ledger.get(7).is_none());

		let id = header(5, 2).id;
		assert_eq!(ledger.get_by_id(&id).map(|h| h.height), Some(5));

		let generator = Address::from([0; ADDRESS_LENGTH]);
		let heights: Vec<u32> = ledger.headers_by(&generator).map(|h| h.height).collect();
		assert_eq!(heights, vec![3, 6]);
		assert_eq!(ledger.last_header_by(&generator).map(|h| h.height), Some(6));

		let range: Vec<u32> = ledger.range(2..=4).map(|h| h.height).collect();
		assert_eq!(range, vec![2, 3, 4]);
		let top: Vec<u32> = ledger.top(2).map(|h| h.height).collect();
		assert_eq!(top, vec![5, 6]);
	}

	#[test]
	fn rejects_non_contiguous_heights() {
		let mut ledger = filled(10, 5..=6, 2);

		assert_eq!(
			ledger.push(header(8, 0)),
			Err(LedgerError::NonContiguousHeight { height: 8, tip: 6 })
		);
		assert_eq!(
			ledger.push(header(6, 1)),
			Err(LedgerError::NonContiguousHeight { height: 6, tip: 6 })
		);
		assert_eq!(ledger.len(), 2);
	}

	#[test]
	fn eviction_drops_stale_indexes() {
		let mut ledger = filled(3, 1..=3, 3);
		let evicted = ledger.push(header(4, 9)).unwrap();

		assert_eq!(evicted.map(|h| h.height), Some(1));
		assert!(ledger.get_by_id(&header(1, 1).id).is_none());
		assert!(ledger
			.last_header_by(&Address::from([1; ADDRESS_LENGTH]))
			.is_none());
		assert_eq!(
			ledger
				.last_header_by(&Address::from([9; ADDRESS_LENGTH]))
				.map(|h| h.height),
			Some(4)
		);
	}

	#[test]
	fn remove_above_restores_generator_index() {
		let mut ledger = filled(10, 1..=8, 3);
		let removed = ledger.remove_above(5);

		assert_eq!(
			removed.iter().map(|h| h.height).collect::<Vec<_>>(),
			vec![6, 7, 8]
		);
		assert_eq!(ledger.last().map(|h| h.height), Some(5));
		// generator 0 forged heights 3 and 6
		assert_eq!(
			ledger
				.last_header_by(&Address::from([0; ADDRESS_LENGTH]))
				.map(|h| h.height),
			Some(3)
		);
		assert!(ledger.get_by_id(&header(7, 1).id).is_none());

		assert!(ledger.remove_above(10).is_empty());
		assert_eq!(ledger.remove_above(0).len(), 5);
		assert!(ledger.is_empty());
		ledger.push(header(42, 1)).unwrap();
		assert_eq!(ledger.first().map(|h| h.height), Some(42));
	}

	proptest! {
		#[test]
		fn ledger_stays_bounded(capacity in 1usize..64, count in 1u32..256) {
			let ledger = filled(capacity, 1..=count, 7);
			let expected_len = capacity.min(count as usize);

			prop_assert_eq!(ledger.len(), expected_len);
			prop_assert_eq!(ledger.last().map(|h| h.height), Some(count));
			prop_assert_eq!(
				ledger.first().map(|h| h.height),
				Some(count - expected_len as u32 + 1)
			);
			prop_assert!(ledger.iter().zip(ledger.iter().skip(1)).all(|(a, b)| a.height + 1 == b.height));
		}
	}
}
