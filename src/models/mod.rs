//! Core data models for civ-ledger.

mod game;
mod ids;
mod stats;

pub use game::*;
pub use ids::*;
pub use stats::*;
