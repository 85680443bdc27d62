//! # Workflows Module
//!
//! High-level entry points that drive a whole queue of jobs.
//!
//! ## Architecture
//!
//! - **Queue Workflow** ([`run`]) - Restores checkpoints, resolves snapshot lists, runs every
//!   pending job unit by unit with checkpointing, MD retries and host control, and returns a
//!   [`QueueSummary`](crate::engine::queue::QueueSummary).

pub mod run;
