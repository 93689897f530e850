//! # civ-ledger
//!
//! Incremental match-history cache and win/loss statistics for aoe4world
//! profiles.
//!
//! ## Architecture
//!
//! - **models**: Core data structures (games, players, identifiers, stats)
//! - **fetch**: Paginated upstream client that stops at the cached high-water mark
//! - **storage**: Cache persistence on the local filesystem or in S3
//! - **sync**: Load, fetch, merge and save pipeline
//! - **calculate**: Match, civilization, ally, opponent and trend statistics
//! - **api**: Serverless event handler and REST API endpoints
//! - **config**: Configuration loading and validation

pub mod api;
pub mod calculate;
pub mod config;
pub mod fetch;
pub mod models;
pub mod storage;
pub mod sync;

pub use models::*;
