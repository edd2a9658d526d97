//! Write-behind synchronization.
//!
//! Edits are applied to local state immediately, recorded in a
//! `MutationQueue` keyed by entity id (last write wins), and flushed to the
//! server by a `FlushScheduler` as a single batch once edits go quiet for the
//! debounce delay, or right away on a forced trigger (tab hidden, unload,
//! unmount).
//!
//! Delivery is best effort: a failed batch is reported and held aside, and
//! only the next forced flush sends it again. A forced flush during teardown
//! is fire-and-forget.

pub mod queue;
pub mod scheduler;

pub use queue::{MutationQueue, PendingChange};
pub use scheduler::{
    BatchSink, FlushOutcome, FlushScheduler, FlushState, FlushTrigger, SyncNotice,
    DEFAULT_DEBOUNCE,
};
