//! # Call Queue
//!
//! Request deduplication, throttling and deferred settlement for asynchronous
//! operations, built on top of Tokio.
//!
//! Pending calls are grouped into named collections and triggers are
//! coalesced behind named timers. When a trigger fires again before its timer
//! elapses, the previous callback is cancelled and every stale call in the
//! paired collection is settled as superseded, so only the latest request
//! survives.
//!
//! ## Features
//!
//! - **Named Resources**: Timers and call collections addressed by canonical or abbreviated names
//! - **Throttle With Cancel**: Re-triggering cancels the previous timer and supersedes stale calls
//! - **One-Shot Settlement**: Every call is resolved, rejected or superseded exactly once
//! - **Deferred Cleanup**: Settled calls are swept out of their collection after a delay
//! - **Pluggable Clock**: Tokio-backed scheduler for production, virtual clock for tests
//! - **Comprehensive Logging**: Built-in logging for debugging and monitoring
//!
//! ## Quick Start
//!
//! ```rust
//! use call_queue::{CancellationToken, Outcome, QueueConfig, RequestQueue, Target};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cancel_token = CancellationToken::new();
//!
//!     // One timer named "searchTimeout" paired with a "currentSearchCalls" collection
//!     let queue = RequestQueue::<String>::with_tokio(
//!         QueueConfig::new("my_queue", ["search"]),
//!         cancel_token.clone(),
//!     )?;
//!
//!     let call = queue.enqueue("search").expect("registered collection");
//!
//!     // Run the lookup 150ms after the last keystroke
//!     let worker = queue.clone();
//!     queue.throttled_invoke(Some(150), "search", "search", move || {
//!         worker.resolve("search", Target::Newest, "results".to_string());
//!     }, Some(call.id));
//!
//!     assert_eq!(call.settlement.await?, Outcome::Resolved("results".to_string()));
//!
//!     cancel_token.cancel();
//!     Ok(())
//! }
//! ```

mod calls;
mod config;
mod error;
mod names;
mod queue;
mod scheduler;
mod timers;

pub use calls::{
    CallId, CallSnapshot, Outcome, OutcomeKind, Settlement, Superseded, Target, Transport,
    SUPERSEDED_CODE, SUPERSEDED_STATUS,
};
pub use config::{delay_or, QueueConfig, DEFAULT_DELAY, DEFAULT_SWEEP_DELAY};
pub use error::{QueueError, SettlementError};
pub use names::{CollectionName, NameKind, NameRegistry, TimerName};
pub use queue::{Enqueued, RequestQueue};
pub use scheduler::{ScheduledTask, Scheduler, Task, TokioScheduler, VirtualScheduler};

// Re-export commonly used types for convenience
pub use std::time::Duration;
pub use tokio_util::sync::CancellationToken;
