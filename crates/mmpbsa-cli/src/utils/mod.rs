pub mod control;
pub mod progress;
pub mod progress_file;
