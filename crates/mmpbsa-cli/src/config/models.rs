use mmpbsa::core::io::checkpoint::CheckpointStore;
use mmpbsa::core::models::job::{EnergySettings, Job};
use mmpbsa::engine::config::PipelineConfig;

/// Everything `run` needs, after merging defaults, the queue file and the command line.
#[derive(Debug)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub jobs: Vec<(Job, CheckpointStore)>,
    /// Energy program used by jobs that do not name their own.
    pub energy_defaults: Option<EnergySettings>,
}
