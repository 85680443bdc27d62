//! # MD/MMPBSA Queue Driver
//!
//! A resumable driver for batches of free-energy calculations. Each calculation
//! (a [`Job`](core::models::job::Job)) walks every trajectory snapshot through the
//! complex, receptor and ligand partitions, running an optional molecular-dynamics
//! stage followed by energy extraction for each of them.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Plain data models (`Job`, `EnergyMap`) and I/O for the
//!   checkpoint document, the per-job results file and AMBER topology/trajectory headers.
//!
//! - **[`engine`]: The Logic Core.** The stage state machine, the MD subprocess supervisor,
//!   the host control channel, progress aggregation and the queue manager. Nothing in this
//!   layer lives in a global; every piece of state is owned by a value passed down explicitly.
//!
//! - **[`workflows`]: The Public API.** [`workflows::run::run_queue`] drives a whole queue to
//!   completion (or to a clean, checkpointed stop) and returns a summary.
//!
//! Every unit of work is persisted before the next one starts, so a process that is killed,
//! suspended or migrated resumes exactly at the last completed transition.

pub mod core;
pub mod engine;
pub mod workflows;
