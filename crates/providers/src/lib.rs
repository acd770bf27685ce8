//! `genpress-providers`
//!
//! **Responsibility:** the generation layer of the pipeline.
//!
//! - Tagged-variant [`GenerationError`] taxonomy (no message sniffing).
//! - [`TextProvider`] adapter trait for external generation APIs.
//! - [`FallbackClient`]: ordered sweep over the provider list.
//! - [`BackoffOrchestrator`]: exponential whole-sweep retry when every
//!   provider is busy.
//!
//! This crate knows nothing about jobs or schedules; the scheduler crate
//! drives it once per job execution.

pub mod backoff;
pub mod error;
pub mod fallback;
pub mod provider;
pub mod testing;

pub use backoff::{BackoffOrchestrator, BackoffPolicy};
pub use error::{AttemptClass, GenerationError};
pub use fallback::FallbackClient;
pub use provider::{Generation, GenerationAttempt, TextProvider};
