//! # Engine Module
//!
//! The stateful layer that moves jobs through their snapshot pipeline.
//!
//! ## Overview
//!
//! A job is a walk over (snapshot, molecule, stage). The engine decides the next unit of
//! work, runs it (an MD child process or an energy-extraction call), records the
//! transition and persists it before moving on. Control messages from a host scheduler
//! are checked on every tick so a run can be suspended, resumed or stopped cleanly.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Checkpoint cadence, retry bound and polling intervals
//! - **State Machine** ([`state`]) - The single transition function over a job's cursor
//! - **Subprocess Supervision** ([`supervisor`]) - Launching and non-blocking polling of MD runs
//! - **Host Control** ([`control`]) - Suspend/resume/quit messages from the host environment
//! - **Energy Extraction** ([`energy`]) - The seam to the energy solver and its command adapter
//! - **Queue Management** ([`queue`]) - Ordered jobs, their checkpoint targets and summaries
//! - **Progress Monitoring** ([`progress`]) - Weighted fraction-done and the optional progress sink
//! - **Error Handling** ([`error`]) - The pipeline error taxonomy

pub mod config;
pub mod control;
pub mod energy;
pub mod error;
pub mod progress;
pub mod queue;
pub mod state;
pub mod supervisor;
pub(crate) mod utils;
