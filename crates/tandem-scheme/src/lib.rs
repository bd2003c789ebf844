//! Coupling-scheme state machine.
//!
//! The scheme is the heart of a partitioned coupling run. It decides *when*
//! boundary data is exchanged, drives implicit iterations to convergence,
//! and advances simulation time with compensated accumulation so that
//! thousands of windows stay bit-stable.
//!
//! # Key Concepts
//!
//! - **SchemeCore**: the concrete state machine — time window bookkeeping,
//!   the required-action handshake, iteration counters, convergence and
//!   acceleration plumbing.
//! - **ExchangeSchedule**: the capability set a concrete scheme implements;
//!   it owns the channel(s) and decides who sends and receives in each
//!   phase. Ships with [`SerialSchedule`], [`ParallelSchedule`] and
//!   [`MultiSchedule`].
//! - **CouplingScheme**: the facade an adapter drives — `initialize`,
//!   `add_computed_time`, then the four phases of `advance`.
//! - **CouplingDatum**: a shared per-exchange data handle with time-stamped
//!   sample storage ("stamples").
//!
//! # Design Principles
//!
//! 1. The scheme is the single mutator of all coupling data; measures and
//!    acceleration observe shared handles.
//! 2. Every transition between adapter and scheme is action-gated: required
//!    checkpoints must be fulfilled before the next exchange.
//! 3. Time is never derived by subtraction; both clocks are compensated
//!    accumulators.
//! 4. Failure is explicit and fatal. Non-convergence inside the iteration
//!    limit is a normal rollback, never an error.

#![deny(unsafe_code)]

mod actions;
mod clock;
mod convergence;
mod data;
mod error;
mod multi;
mod parallel;
mod scheme;
mod serial;
mod state_machine;
mod table;

pub mod acceleration;

pub use actions::ActionLedger;
pub use clock::CompensatedClock;
pub use convergence::{ConvergenceMeasure, ConvergenceSet, MeasureContext};
pub use state_machine::{SchemeConfig, SchemeCore};
pub use data::{CouplingDatum, DataSpec, SharedDatum, Stample};
pub use error::{SchemeError, SchemeResult};
pub use multi::{MultiSchedule, PeerLink};
pub use parallel::ParallelSchedule;
pub use scheme::{CouplingScheme, ExchangeSchedule};
pub use serial::SerialSchedule;
pub use table::{ColumnKind, TableWriter};
