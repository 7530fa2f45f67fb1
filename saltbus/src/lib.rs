//! Client library for the salt master: async job submission over the HTTP
//! API, the queue runner functions, and the event-bus subscription used to
//! observe job lifecycles.

pub mod client;
pub mod error;
pub mod events;

pub use client::{BusClient, Submission};
pub use error::{BusError, BusResult};
pub use events::{EventStream, TaggedEvent};
