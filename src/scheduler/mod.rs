//! Lease-based job dispatch.
//!
//! - [`JobQueue`]: job records plus the ordered pending list
//! - [`WorkerRegistry`]: registered workers and their capability tags
//! - [`TagSet`]: normalized capability tags and the subset matcher
//! - [`Dispatcher`]: one lease queue, generic over a [`DispatchPolicy`]
//! - [`LeaseReaper`]: background sweep returning expired leases to the queue

pub mod dispatcher;
pub mod job;
pub mod policy;
pub mod queue;
pub mod reaper;
pub mod registry;
pub mod tags;

pub use dispatcher::{Dispatcher, QueueStats, RegisterAck, WorkerView};
pub use job::{Completion, Job, JobStatus, NewJob, Priority};
pub use policy::{Caller, DispatchPolicy, TagPolicy, TokenPolicy};
pub use queue::JobQueue;
pub use reaper::LeaseReaper;
pub use registry::{HeartbeatUpdate, WorkerMetadata, WorkerRegistry, WorkerState};
pub use tags::TagSet;

/// The bearer-token queue for trusted workers.
pub type TrustedDispatcher = Dispatcher<TokenPolicy>;

/// The feature-flagged, tag-matched queue for edge workers.
pub type EdgeDispatcher = Dispatcher<TagPolicy>;
