//! Transport boundary of the tandem coupling core.
//!
//! Coupling schemes never talk to sockets or MPI directly. They speak to a
//! [`Channel`]: a reliable, typed, FIFO point-to-point pipe carrying scalar
//! integers, scalar doubles, booleans, and double vectors. Each logical
//! message is one channel call; the scheme performs no framing of its own.
//!
//! The crate ships a deterministic in-memory channel pair used by tests and
//! single-process demos, and the [`SerializedStamples`] codec that packs a
//! time-ordered run of samples into the flat vectors the channel carries.

#![deny(unsafe_code)]

mod channel;
mod memory;
mod stamples;

pub use channel::{Channel, TransportError, TransportResult};
pub use memory::InMemoryChannel;
pub use stamples::SerializedStamples;
