// src/patterns/mod.rs

//! Execution patterns.
//!
//! Each pattern is a generic [`Task`](crate::task::Task) adapter around a
//! small user trait, so choosing a pattern and a scheduling strategy is a
//! matter of picking the adapter:
//!
//! | pattern | thread-owned | loop-hosted |
//! |---|---|---|
//! | one-shot | [`OneShot`] | [`HostedOneShot`] |
//! | periodic | [`Periodic`] | [`AsyncPeriodic`] |
//! | queue consumer | | [`QueueConsumer`] |
//! | polling value cache | [`Poller`] | |

pub mod cadence;
pub mod oneshot;
pub mod periodic;
pub mod poller;
pub mod queue;

pub use cadence::Cadence;
pub use oneshot::{HostedOneShot, OneShot};
pub use periodic::{AsyncPeriodic, AsyncPeriodicJob, Periodic, PeriodicJob};
pub use poller::{Codec, Fetch, JsonCodec, Poller, PollerHandle};
pub use queue::{QueueConsumer, QueueHandle, SubmitError, WorkHandler};
