use crate::core::models::energy::{EnergyMap, SnapshotEnergies};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ResultsError {
    #[error("I/O error for results file '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to serialize snapshot results: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Results file '{path}' holds {actual} bytes but {expected} were committed", path = path.display())]
    Truncated {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
    #[error("Snapshot {snapshot} is missing energies for at least one molecule")]
    Incomplete { snapshot: usize },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct SnapshotRecord {
    index: usize,
    complex_total: f64,
    receptor_total: f64,
    ligand_total: f64,
    binding_total: f64,
    solver_failed: bool,
    complex: EnergyMap,
    receptor: EnergyMap,
    ligand: EnergyMap,
    binding: EnergyMap,
}

#[derive(Debug, Serialize)]
struct SnapshotBlock {
    snapshot: Vec<SnapshotRecord>,
}

/// Append-only per-job results document made of `[[snapshot]]` blocks.
///
/// The job stores the file length after each committed block; on resume the file is
/// cut back to that length so a block written just before a crash is not duplicated.
#[derive(Debug, Clone)]
pub struct ResultsFile {
    path: PathBuf,
}

impl ResultsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: io::Error) -> ResultsError {
        ResultsError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Drops anything written after the last committed block.
    pub fn rewind_to(&self, committed_len: u64) -> Result<(), ResultsError> {
        let actual = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(self.io_err(e)),
        };

        if actual < committed_len {
            return Err(ResultsError::Truncated {
                path: self.path.clone(),
                expected: committed_len,
                actual,
            });
        }
        if actual > committed_len {
            info!(
                path = %self.path.display(),
                "Discarding {} uncommitted bytes from results file.",
                actual - committed_len
            );
            let file = OpenOptions::new()
                .write(true)
                .open(&self.path)
                .map_err(|e| self.io_err(e))?;
            file.set_len(committed_len).map_err(|e| self.io_err(e))?;
            file.sync_all().map_err(|e| self.io_err(e))?;
        }
        Ok(())
    }

    /// Appends the block for `snapshot` and returns the new committed length.
    pub fn append_snapshot(
        &self,
        snapshot: usize,
        energies: &SnapshotEnergies,
    ) -> Result<u64, ResultsError> {
        let (Some(complex), Some(receptor), Some(ligand), Some(binding)) = (
            energies.complex,
            energies.receptor,
            energies.ligand,
            energies.binding(),
        ) else {
            return Err(ResultsError::Incomplete { snapshot });
        };

        let block = SnapshotBlock {
            snapshot: vec![SnapshotRecord {
                index: snapshot,
                complex_total: complex.total(),
                receptor_total: receptor.total(),
                ligand_total: ligand.total(),
                binding_total: binding.total(),
                solver_failed: energies.any_solver_failed(),
                complex,
                receptor,
                ligand,
                binding,
            }],
        };
        let mut text = toml::to_string(&block)?;
        text.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let mut file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        file.write_all(text.as_bytes()).map_err(|e| self.io_err(e))?;
        file.sync_data().map_err(|e| self.io_err(e))?;

        let len = file.metadata().map_err(|e| self.io_err(e))?.len();
        debug!(snapshot, len, path = %self.path.display(), "Snapshot results committed.");
        Ok(len)
    }
}
