//! Reference worker runtime for pulling jobs over HTTP.
//!
//! # Components
//!
//! - [`DispatchClient`]: reqwest client for every dispatcher endpoint
//! - [`HeartbeatLoop`]: keeps an edge worker's registration fresh
//! - [`JobExecutor`]: runs `shell` jobs through `sh -c` with a timeout
//! - [`EdgeWorker`]: the register / heartbeat / lease / run / report loop
//!
//! # Execution Flow
//!
//! 1. [`EdgeWorker::run`] registers and starts the heartbeat loop
//! 2. Each poll leases at most one job; an empty queue means a sleep
//! 3. The [`JobHandler`] produces a completion report
//! 4. A `job_not_in_progress` answer means the lease was reaped; the result is dropped
//!
//! Commands run directly on the host without sandboxing.

pub mod client;
pub mod executor;
pub mod heartbeat;
pub mod runner;

pub use client::{DispatchClient, QueueKind};
pub use executor::{JobExecutor, JobHandler, SHELL_KIND};
pub use heartbeat::HeartbeatLoop;
pub use runner::{EdgeWorker, PollOutcome};
