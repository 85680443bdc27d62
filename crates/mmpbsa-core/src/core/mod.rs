//! # Core Module
//!
//! Stateless building blocks for the pipeline.
//!
//! - **Data Models** ([`models`]) - Jobs, their cursors and stage plans, and energy maps
//! - **File I/O** ([`io`]) - Checkpoint documents, results files and trajectory frame counting

pub mod io;
pub mod models;
