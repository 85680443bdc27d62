use std::path::PathBuf;
use thiserror::Error;

use super::config::ConfigError;
use super::energy::EnergyError;
use super::supervisor::SupervisorError;
use crate::core::io::checkpoint::CheckpointError;
use crate::core::io::results::ResultsError;
use crate::core::io::trajectory::TrajectoryError;
use crate::core::models::job::{Molecule, Stage};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to launch MD for job '{job}': {source}")]
    ProcessLaunch {
        job: String,
        #[source]
        source: SupervisorError,
    },

    #[error(
        "Job '{job}' failed in the {stage} stage for {molecule} at snapshot {snapshot} after {attempts} attempt(s): {reason}"
    )]
    StageFailed {
        job: String,
        stage: Stage,
        molecule: Molecule,
        snapshot: usize,
        attempts: usize,
        reason: String,
    },

    #[error("Checkpoint for job '{job}' cannot be restored: {source}")]
    CorruptCheckpoint {
        job: String,
        #[source]
        source: CheckpointError,
    },

    #[error("Failed to write checkpoint for job '{job}': {source}")]
    CheckpointWrite {
        job: String,
        #[source]
        source: CheckpointError,
    },

    #[error("Energy extraction failed for job '{job}': {source}")]
    Energy {
        job: String,
        #[source]
        source: EnergyError,
    },

    #[error("Results output failed for job '{job}': {source}")]
    Results {
        job: String,
        #[source]
        source: ResultsError,
    },

    #[error("Could not resolve snapshots for job '{job}': {source}")]
    Trajectory {
        job: String,
        #[source]
        source: TrajectoryError,
    },

    #[error("Jobs {first} and {second} share the checkpoint target '{path}'", path = path.display())]
    DuplicateCheckpointTarget {
        path: PathBuf,
        first: usize,
        second: usize,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Errors after which no further job may run. Everything else fails only the
    /// job that raised it.
    pub fn is_process_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::CheckpointWrite { .. }
                | EngineError::DuplicateCheckpointTarget { .. }
                | EngineError::Config(_)
                | EngineError::Internal(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn checkpoint_write_failures_are_process_fatal() {
        let err = EngineError::CheckpointWrite {
            job: "a".to_string(),
            source: CheckpointError::Io {
                path: PathBuf::from("a.ckpt"),
                source: io::Error::other("disk full"),
            },
        };
        assert!(err.is_process_fatal());
    }

    #[test]
    fn stage_failures_only_fail_their_job() {
        let err = EngineError::StageFailed {
            job: "a".to_string(),
            stage: Stage::Md,
            molecule: Molecule::Receptor,
            snapshot: 4,
            attempts: 3,
            reason: "exit code 1".to_string(),
        };
        assert!(!err.is_process_fatal());
        assert_eq!(
            err.to_string(),
            "Job 'a' failed in the md stage for receptor at snapshot 4 after 3 attempt(s): exit code 1"
        );
    }
}
