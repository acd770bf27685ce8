//! `genpress-core` — pipeline foundation building blocks.
//!
//! This crate contains **pure** primitives shared by the provider and
//! scheduler layers (no storage or provider concerns).

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult};
pub use id::{BatchId, JobId, SeedId};
