use crate::error::{CliError, Result};
use mmpbsa::core::models::job::{EnergySettings, MdSettings, StagePlan};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSettings {
    pub checkpoint_dir: Option<PathBuf>,
    /// Seconds between checkpoints; absent means after every transition.
    pub checkpoint_interval: Option<f64>,
    pub max_md_attempts: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub heartbeat_interval_ms: Option<u64>,
    pub restart_corrupt: Option<bool>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileMdSettings {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub output: String,
    pub convergence_marker: Option<String>,
}

impl From<FileMdSettings> for MdSettings {
    fn from(f: FileMdSettings) -> Self {
        Self {
            program: f.program,
            args: f.args,
            inputs: f.inputs,
            output: f.output,
            convergence_marker: f.convergence_marker,
            working_dir: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileEnergySettings {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl From<FileEnergySettings> for EnergySettings {
    fn from(f: FileEnergySettings) -> Self {
        Self {
            program: f.program,
            args: f.args,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileStagePlan {
    MdThenEnergy,
    EnergyOnly,
    MdOnly,
}

impl From<FileStagePlan> for StagePlan {
    fn from(f: FileStagePlan) -> Self {
        match f {
            FileStagePlan::MdThenEnergy => StagePlan::MdThenEnergy,
            FileStagePlan::EnergyOnly => StagePlan::EnergyOnly,
            FileStagePlan::MdOnly => StagePlan::MdOnly,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileJob {
    pub name: String,
    pub prmtop: PathBuf,
    pub trajectory: PathBuf,
    pub radii: Option<PathBuf>,
    /// Results file; defaults to `<name>.results.toml` next to the queue file.
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub receptor_start: Vec<usize>,
    #[serde(default)]
    pub ligand_start: Vec<usize>,
    /// Trajectory frames to process; absent means every frame.
    pub snapshots: Option<Vec<usize>>,
    pub plan: Option<FileStagePlan>,
    pub weight: Option<f64>,
    #[serde(default)]
    pub trust_prmtop: bool,
    pub checkpoint: Option<PathBuf>,
    pub md: Option<FileMdSettings>,
    pub energy: Option<FileEnergySettings>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub settings: Option<FileSettings>,
    pub md: Option<FileMdSettings>,
    pub energy: Option<FileEnergySettings>,
    #[serde(default, rename = "job")]
    pub jobs: Vec<FileJob>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading queue file from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const QUEUE: &str = r#"
        [settings]
        checkpoint-dir = "ckpt"
        max-md-attempts = 4

        [md]
        program = "sander"
        args = ["-O", "-i", "{molecule}.mdin", "-o", "{job}.{molecule}.{snapshot}.mdout"]
        output = "{job}.{molecule}.{snapshot}.mdout"
        convergence-marker = "FINAL RESULTS"

        [energy]
        program = "mmpbsa-energy"
        args = ["{prmtop}", "{md_output}"]

        [[job]]
        name = "lig1"
        prmtop = "complex.prmtop"
        trajectory = "complex.mdcrd"
        receptor-start = [1]
        ligand-start = [3201]
        snapshots = [0, 5, 10]
        weight = 2.0

        [[job]]
        name = "lig2"
        prmtop = "complex2.prmtop"
        trajectory = "complex2.mdcrd"
        plan = "energy-only"
    "#;

    #[test]
    fn from_toml_str_reads_settings_defaults_and_jobs() {
        let config = FileConfig::from_toml_str(QUEUE).unwrap();
        let settings = config.settings.unwrap();
        assert_eq!(settings.checkpoint_dir, Some(PathBuf::from("ckpt")));
        assert_eq!(settings.max_md_attempts, Some(4));
        assert_eq!(
            config.md.unwrap().convergence_marker.as_deref(),
            Some("FINAL RESULTS")
        );
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs[0].snapshots, Some(vec![0, 5, 10]));
        assert_eq!(config.jobs[1].plan, Some(FileStagePlan::EnergyOnly));
        assert!(config.jobs[1].snapshots.is_none());
    }

    #[test]
    fn from_toml_str_rejects_unknown_fields() {
        let result = FileConfig::from_toml_str("[settings]\nmax-attempts = 3\n");
        assert!(result.is_err());
        let result = FileConfig::from_toml_str("[[job]]\nname = \"a\"\nprmtop = \"p\"\ntrajectory = \"t\"\ncolour = \"red\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn from_file_reports_the_failing_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.toml");
        fs::write(&path, "[[job]]\nname = 3\n").unwrap();

        match FileConfig::from_file(&path) {
            Err(CliError::FileParsing { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn from_file_reports_missing_file_as_io_error() {
        let dir = tempdir().unwrap();
        let result = FileConfig::from_file(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(CliError::Io(_))));
    }
}
