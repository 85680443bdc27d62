use crate::core::models::job::{Job, Molecule};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

pub const CHECKPOINT_FORMAT: &str = "mmpbsa-checkpoint";
pub const CHECKPOINT_VERSION: u32 = 1;

/// The durable form of one job: a format tag, a version and the complete job state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub format: String,
    pub version: u32,
    pub job: Job,
}

impl CheckpointRecord {
    pub fn new(job: &Job) -> Self {
        Self {
            format: CHECKPOINT_FORMAT.to_string(),
            version: CHECKPOINT_VERSION,
            job: job.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("I/O error for checkpoint '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to serialize checkpoint: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Checkpoint '{path}' is corrupt: {reason}", path = path.display())]
    Corrupt { path: PathBuf, reason: String },
}

/// Mirrors one job to a single checkpoint file.
///
/// Each save writes a sibling temporary file, syncs it and renames it over the
/// previous record, so a reader never observes a partially written document.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, job: &Job) -> Result<CheckpointRecord, CheckpointError> {
        let record = CheckpointRecord::new(job);
        let document = toml::to_string(&record)?;
        self.write_atomically(document.as_bytes())?;
        debug!(
            path = %self.path.display(),
            counter = job.checkpoint_counter,
            "Checkpoint written."
        );
        Ok(record)
    }

    /// Restores the saved job, or `None` when no checkpoint has been written yet.
    pub fn load(&self) -> Result<Option<Job>, CheckpointError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };
        parse_document(&text, &self.path).map(Some)
    }

    fn write_atomically(&self, bytes: &[u8]) -> Result<(), CheckpointError> {
        let io_err = |source: io::Error| CheckpointError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_err)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(bytes).map_err(io_err)?;
        tmp.flush().map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

/// Parses a checkpoint document. Keys the current schema does not know are
/// reported and skipped; missing or inconsistent state is rejected.
pub fn parse_document(text: &str, origin: &Path) -> Result<Job, CheckpointError> {
    let corrupt = |reason: String| CheckpointError::Corrupt {
        path: origin.to_path_buf(),
        reason,
    };

    let record: CheckpointRecord = toml::from_str(text).map_err(|e| corrupt(e.to_string()))?;

    if record.format != CHECKPOINT_FORMAT {
        return Err(corrupt(format!(
            "unexpected format identifier '{}'",
            record.format
        )));
    }
    if record.version > CHECKPOINT_VERSION {
        return Err(corrupt(format!(
            "version {} is newer than supported version {}",
            record.version, CHECKPOINT_VERSION
        )));
    }

    for key in unknown_keys(text, &record, origin)? {
        warn!(path = %origin.display(), "Ignoring unknown checkpoint field '{}'.", key);
    }

    validate(&record.job).map_err(corrupt)?;
    Ok(record.job)
}

fn unknown_keys(
    text: &str,
    record: &CheckpointRecord,
    origin: &Path,
) -> Result<Vec<String>, CheckpointError> {
    let corrupt = |e: toml::de::Error| CheckpointError::Corrupt {
        path: origin.to_path_buf(),
        reason: e.to_string(),
    };
    let raw: toml::Table = toml::from_str(text).map_err(corrupt)?;
    let canonical: toml::Table = toml::from_str(&toml::to_string(record)?).map_err(corrupt)?;

    let mut found = Vec::new();
    collect_unknown(&raw, &canonical, "", &mut found);
    Ok(found)
}

fn collect_unknown(raw: &toml::Table, known: &toml::Table, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in raw {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match (value, known.get(key)) {
            (_, None) => out.push(path),
            (toml::Value::Table(inner), Some(toml::Value::Table(known_inner))) => {
                collect_unknown(inner, known_inner, &path, out)
            }
            _ => {}
        }
    }
}

fn validate(job: &Job) -> Result<(), String> {
    if !job.fraction_done.is_finite() || !(0.0..=1.0).contains(&job.fraction_done) {
        return Err(format!("fraction-done {} is outside [0, 1]", job.fraction_done));
    }
    if !job.weight.is_finite() || job.weight < 0.0 {
        return Err(format!("weight {} must be a non-negative number", job.weight));
    }
    if job.cursor.snapshot_index > job.snapshots.len() {
        return Err(format!(
            "snapshot cursor {} exceeds the {} listed snapshots",
            job.cursor.snapshot_index,
            job.snapshots.len()
        ));
    }
    if job.cursor.snapshot_index == job.snapshots.len()
        && !job.snapshots.is_empty()
        && job.cursor.molecule != Molecule::EndOfMolecules
    {
        return Err("cursor is past the last snapshot but not at end-of-molecules".to_string());
    }
    if !job.plan.includes(job.cursor.stage) {
        return Err(format!(
            "stage '{}' is not part of the job's {:?} plan",
            job.cursor.stage, job.plan
        ));
    }
    Ok(())
}
