pub mod energy;
pub mod job;
