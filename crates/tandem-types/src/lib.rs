//! Shared domain types for the tandem coupling core.
//!
//! Partitioned coupling lets two (or more) independent solvers advance in
//! time together and trade boundary data at synchronised points. This crate
//! holds the vocabulary every other tandem crate speaks:
//!
//! - **Identifiers**: stable numeric handles for exchanged data and meshes.
//! - **Action**: the closed set of bookkeeping actions a solver adapter must
//!   perform between coupling phases (checkpoints, initial data).
//! - **Sample**: a flat value buffer with optional gradients, the unit of
//!   every exchange.
//! - **Sentinels and tolerant comparisons**: the "undefined" configuration
//!   markers and the mixed absolute/relative float predicates that all time
//!   bookkeeping is required to use.

#![deny(unsafe_code)]

mod action;
mod constants;
mod ids;
mod kinds;
mod sample;

pub mod math;

pub use action::Action;
pub use constants::*;
pub use ids::{DataId, MeshId};
pub use kinds::{CouplingMode, Direction, Rank, TimesteppingMethod};
pub use sample::Sample;
