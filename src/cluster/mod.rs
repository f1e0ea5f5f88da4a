//! Leader election.
//!
//! A fleet of equivalent processes agrees on one leader through a shared
//! [`Record`](crate::record::Record) kept in an optimistic-concurrency
//! store.  Each process runs an [`Elector`] whose control loop periodically
//! renews its own membership, expires members it has not seen renew,
//! claims leadership when nobody holds it, and runs the leader-only
//! callback exactly while it is leader.

pub mod callback;
pub mod elector;
mod observation;
mod renewal;

pub use callback::{leader_callback, CallbackFuture, LeaderCallback};
pub use elector::Elector;
