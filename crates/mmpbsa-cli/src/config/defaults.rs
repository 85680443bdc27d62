use std::path::PathBuf;

pub struct DefaultsConfig {
    pub checkpoint_dir: PathBuf,
    pub checkpoint_extension: &'static str,
    pub max_md_attempts: usize,
    pub poll_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub weight: f64,
    pub restart_corrupt: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("checkpoints"),
            checkpoint_extension: "ckpt",
            max_md_attempts: 3,
            poll_interval_ms: 250,
            heartbeat_interval_ms: 1000,
            weight: 1.0,
            restart_corrupt: false,
        }
    }
}
