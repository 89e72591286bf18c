//! BFT finality and fork choice over a bounded window of block headers.
pub mod config;
pub mod contradiction;
pub mod engine;
pub mod fork_choice;
pub mod ledger;
pub mod tally;
pub mod types;
pub mod utils;
pub mod validation;
pub mod validators;

pub use config::BftConfig;
pub use engine::{BftEngine, BftError, BftEvent, EngineState, SharedBftEngine};
pub use types::{Address, BlockId, HeaderRecord};
