//! Finality engine façade: owns the header ledger and the vote tally.
//!
//! [`BftEngine`] is a plain state machine mutated through `&mut self`. [`SharedBftEngine`]
//! wraps it for use from several tasks: writers are serialized behind a lock, the finalized
//! height is published atomically and finality changes are broadcast to subscribers.
use crate::{
	config::{BftConfig, ConfigError},
	contradiction::are_contradicting,
	fork_choice::{verify_generator_chain, ForkChoiceError, ForkChoiceVerifier},
	ledger::{BoundedHeaderLedger, LedgerError},
	tally::VoteTally,
	types::HeaderRecord,
	validation::{validate_header, HeaderError},
	validators::{UniformValidatorSet, ValidatorSet},
};
use std::sync::{
	atomic::{AtomicU32, Ordering},
	Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BftError {
	#[error("Invalid header: {0}")]
	Structural(#[from] HeaderError),
	#[error("Fork choice verification failed: {0}")]
	ForkChoice(#[from] ForkChoiceError),
	#[error(transparent)]
	Ledger(#[from] LedgerError),
	#[error("Invalid configuration: {0}")]
	Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
	/// Not enough history to verify prevote claims
	Bootstrapping,
	/// Every check applies
	Active,
}

pub struct BftEngine<V = UniformValidatorSet> {
	config: BftConfig,
	validators: V,
	ledger: BoundedHeaderLedger,
	tally: VoteTally,
	verifier: ForkChoiceVerifier,
	state: EngineState,
}

impl BftEngine<UniformValidatorSet> {
	/// Creates an engine where every active validator carries the same weight.
	pub fn new(config: BftConfig) -> Result<Self, BftError> {
		let validators = UniformValidatorSet::new(config.active_validators);
		Self::with_validators(config, validators)
	}
}

impl<V: ValidatorSet> BftEngine<V> {
	pub fn with_validators(config: BftConfig, validators: V) -> Result<Self, BftError> {
		config.validate()?;

		let mut engine = BftEngine {
			ledger: BoundedHeaderLedger::new(config.max_window() as usize),
			tally: VoteTally::new(&config),
			verifier: ForkChoiceVerifier::new(config.processing_threshold()),
			state: EngineState::Bootstrapping,
			validators,
			config,
		};
		engine.update_state();
		Ok(engine)
	}

	pub fn config(&self) -> &BftConfig {
		&self.config
	}

	pub fn ledger(&self) -> &BoundedHeaderLedger {
		&self.ledger
	}

	pub fn tally(&self) -> &VoteTally {
		&self.tally
	}

	pub fn state(&self) -> EngineState {
		self.state
	}

	pub fn finalized_height(&self) -> u32 {
		self.tally.finalized_height()
	}

	/// Prevoted height a newly forged header has to claim.
	pub fn max_height_prevoted(&self) -> u32 {
		self.tally.max_height_prevoted()
	}

	/// Validates, verifies and appends a header, returning the finalized height.
	pub fn add_header(&mut self, header: HeaderRecord) -> Result<u32, BftError> {
		let height = header.height;
		self.try_add_header(header).map_err(|error| {
			warn!(height, %error, "Header rejected");
			error
		})
	}

	fn try_add_header(&mut self, header: HeaderRecord) -> Result<u32, BftError> {
		validate_header(&header)?;
		let check_prevote_claims = self.state == EngineState::Active;
		self.verifier
			.verify(&self.ledger, &self.tally, &header, check_prevote_claims)?;
		self.insert(header)
	}

	/// Replays already accepted chain history, oldest header first.
	///
	/// Prevote claims are not verified, the tally is being rebuilt from this history.
	/// Stops at the first header that fails validation or fork choice.
	pub fn load(
		&mut self,
		headers: impl IntoIterator<Item = HeaderRecord>,
	) -> Result<u32, BftError> {
		let mut loaded = 0usize;
		for header in headers {
			validate_header(&header)?;
			verify_generator_chain(&self.ledger, &header)?;
			self.insert(header)?;
			loaded += 1;
		}

		info!(
			loaded,
			finalized_height = self.finalized_height(),
			max_height_prevoted = self.max_height_prevoted(),
			"Loaded chain history"
		);
		Ok(self.finalized_height())
	}

	/// Drops headers above `height` and recomputes the tally from the remaining ones.
	pub fn remove_above(&mut self, height: u32) -> Result<Vec<HeaderRecord>, BftError> {
		let finalized = self.finalized_height();
		if height < finalized {
			return Err(LedgerError::RollbackBelowFinalized { height, finalized }.into());
		}

		let removed = self.ledger.remove_above(height);
		if !removed.is_empty() {
			warn!(
				height,
				removed = removed.len(),
				"Removed headers above height"
			);
			self.tally.recompute(&self.ledger, &self.validators);
		}
		Ok(removed)
	}

	/// Whether two headers are evidence of misbehavior of their generator.
	pub fn is_contradicting(&self, first: &HeaderRecord, second: &HeaderRecord) -> bool {
		are_contradicting(first, second)
	}

	/// Whether `header` follows the BFT protocol with respect to the generator's history
	/// still present in the window.
	pub fn is_protocol_compliant(&self, header: &HeaderRecord) -> bool {
		if header.max_height_generated >= header.height {
			return false;
		}

		if header.max_height_generated == 0
			|| header.height - header.max_height_generated > self.config.processing_threshold()
		{
			return true;
		}

		self.ledger
			.get(header.max_height_generated)
			.map_or(true, |previous| {
				previous.generator_address == header.generator_address
			})
	}

	fn insert(&mut self, header: HeaderRecord) -> Result<u32, BftError> {
		self.ledger.ensure_extends(&header)?;

		let finalized = self
			.tally
			.apply(&self.ledger, &header, &self.validators);
		debug!(
			height = header.height,
			generator = %header.generator_address,
			finalized,
			"Header added"
		);
		self.ledger.push(header)?;
		self.update_state();
		Ok(finalized)
	}

	/// Activation is one-way, a rollback below the processing threshold keeps prevote
	/// claims verified.
	fn update_state(&mut self) {
		if self.state == EngineState::Bootstrapping
			&& self.verifier.can_verify_prevote_claims(&self.ledger)
		{
			info!(
				headers = self.ledger.len(),
				"Enough header history, verifying prevote claims"
			);
			self.state = EngineState::Active;
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BftEvent {
	FinalizedHeightChanged { previous: u32, finalized: u32 },
	HeadersRemoved { above: u32, count: usize },
}

/// Thread-safe handle to a [`BftEngine`] with a single writer at a time.
pub struct SharedBftEngine<V = UniformValidatorSet> {
	engine: Arc<RwLock<BftEngine<V>>>,
	finalized_height: Arc<AtomicU32>,
	events: broadcast::Sender<BftEvent>,
}

impl<V> Clone for SharedBftEngine<V> {
	fn clone(&self) -> Self {
		SharedBftEngine {
			engine: self.engine.clone(),
			finalized_height: self.finalized_height.clone(),
			events: self.events.clone(),
		}
	}
}

impl<V: ValidatorSet> SharedBftEngine<V> {
	pub fn new(engine: BftEngine<V>) -> Self {
		let (events, _) = broadcast::channel(1 << 7);
		SharedBftEngine {
			finalized_height: Arc::new(AtomicU32::new(engine.finalized_height())),
			engine: Arc::new(RwLock::new(engine)),
			events,
		}
	}

	pub fn subscribe(&self) -> broadcast::Receiver<BftEvent> {
		self.events.subscribe()
	}

	/// Latest published finalized height, readable without taking the lock.
	pub fn finalized_height(&self) -> u32 {
		self.finalized_height.load(Ordering::Acquire)
	}

	pub fn max_height_prevoted(&self) -> u32 {
		self.read().max_height_prevoted()
	}

	pub fn state(&self) -> EngineState {
		self.read().state()
	}

	pub fn is_contradicting(&self, first: &HeaderRecord, second: &HeaderRecord) -> bool {
		are_contradicting(first, second)
	}

	pub fn is_protocol_compliant(&self, header: &HeaderRecord) -> bool {
		self.read().is_protocol_compliant(header)
	}

	/// Runs `f` on a consistent snapshot of the engine.
	pub fn with_engine<R>(&self, f: impl FnOnce(&BftEngine<V>) -> R) -> R {
		f(&self.read())
	}

	pub fn add_header(&self, header: HeaderRecord) -> Result<u32, BftError> {
		let mut engine = self.write();
		let previous = engine.finalized_height();
		let finalized = engine.add_header(header)?;
		self.publish(previous, finalized);
		Ok(finalized)
	}

	pub fn load(&self, headers: impl IntoIterator<Item = HeaderRecord>) -> Result<u32, BftError> {
		let mut engine = self.write();
		let previous = engine.finalized_height();
		let result = engine.load(headers);
		self.publish(previous, engine.finalized_height());
		result
	}

	pub fn remove_above(&self, height: u32) -> Result<Vec<HeaderRecord>, BftError> {
		let removed = self.write().remove_above(height)?;
		if !removed.is_empty() {
			let _ = self.events.send(BftEvent::HeadersRemoved {
				above: height,
				count: removed.len(),
			});
		}
		Ok(removed)
	}

	fn publish(&self, previous: u32, finalized: u32) {
		if finalized <= previous {
			return;
		}
		self.finalized_height.store(finalized, Ordering::Release);
		// No subscribers is not an error
		let _ = self.events.send(BftEvent::FinalizedHeightChanged {
			previous,
			finalized,
		});
	}

	// Engine methods do not panic while holding the lock, a poisoned lock still guards
	// consistent state.
	fn read(&self) -> RwLockReadGuard<'_, BftEngine<V>> {
		self.engine.read().unwrap_or_else(PoisonError::into_inner)
	}

	fn write(&self) -> RwLockWriteGuard<'_, BftEngine<V>> {
		self.engine.write().unwrap_or_else(PoisonError::into_inner)
	}
}
