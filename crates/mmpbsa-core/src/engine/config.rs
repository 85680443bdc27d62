use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_MD_ATTEMPTS: usize = 3;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// When job state is written to its checkpoint.
///
/// Quitting and finishing a job always write a checkpoint regardless of policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointPolicy {
    EveryTransition,
    Interval(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub checkpoint_policy: CheckpointPolicy,
    /// Total MD launches allowed per unit before the job fails.
    pub max_md_attempts: usize,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Start a job from scratch when its checkpoint cannot be read instead of failing it.
    pub restart_on_corrupt_checkpoint: bool,
}

#[derive(Default)]
pub struct PipelineConfigBuilder {
    checkpoint_policy: Option<CheckpointPolicy>,
    max_md_attempts: Option<usize>,
    poll_interval: Option<Duration>,
    heartbeat_interval: Option<Duration>,
    restart_on_corrupt_checkpoint: Option<bool>,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoint_policy(mut self, policy: CheckpointPolicy) -> Self {
        self.checkpoint_policy = Some(policy);
        self
    }
    pub fn max_md_attempts(mut self, attempts: usize) -> Self {
        self.max_md_attempts = Some(attempts);
        self
    }
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }
    pub fn restart_on_corrupt_checkpoint(mut self, restart: bool) -> Self {
        self.restart_on_corrupt_checkpoint = Some(restart);
        self
    }

    pub fn build(self) -> Result<PipelineConfig, ConfigError> {
        let checkpoint_policy = self
            .checkpoint_policy
            .ok_or(ConfigError::MissingParameter("checkpoint_policy"))?;
        if let CheckpointPolicy::Interval(interval) = checkpoint_policy {
            if interval.is_zero() {
                return Err(ConfigError::InvalidParameter {
                    name: "checkpoint_policy",
                    reason: "checkpoint interval must be positive".to_string(),
                });
            }
        }

        let max_md_attempts = self.max_md_attempts.unwrap_or(DEFAULT_MAX_MD_ATTEMPTS);
        if max_md_attempts == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_md_attempts",
                reason: "at least one attempt is required".to_string(),
            });
        }

        Ok(PipelineConfig {
            checkpoint_policy,
            max_md_attempts,
            poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            heartbeat_interval: self.heartbeat_interval.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL),
            restart_on_corrupt_checkpoint: self.restart_on_corrupt_checkpoint.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_fills_defaults_for_optional_values() {
        let config = PipelineConfigBuilder::new()
            .checkpoint_policy(CheckpointPolicy::EveryTransition)
            .build()
            .unwrap();
        assert_eq!(config.max_md_attempts, DEFAULT_MAX_MD_ATTEMPTS);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);
        assert!(!config.restart_on_corrupt_checkpoint);
    }

    #[test]
    fn build_fails_without_checkpoint_policy() {
        let result = PipelineConfigBuilder::new().max_md_attempts(5).build();
        assert_eq!(
            result,
            Err(ConfigError::MissingParameter("checkpoint_policy"))
        );
    }

    #[test]
    fn build_rejects_zero_attempts() {
        let result = PipelineConfigBuilder::new()
            .checkpoint_policy(CheckpointPolicy::EveryTransition)
            .max_md_attempts(0)
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter {
                name: "max_md_attempts",
                ..
            })
        ));
    }

    #[test]
    fn build_rejects_zero_checkpoint_interval() {
        let result = PipelineConfigBuilder::new()
            .checkpoint_policy(CheckpointPolicy::Interval(Duration::ZERO))
            .build();
        assert!(result.is_err());
    }
}
