use super::error::EngineError;
use super::progress;
use crate::core::io::checkpoint::{CheckpointError, CheckpointStore};
use crate::core::models::job::{Job, Molecule};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Pending,
    Completed,
    Failed { reason: String },
}

/// A job together with the checkpoint it mirrors to.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub job: Job,
    pub store: CheckpointStore,
    pub status: JobStatus,
}

/// Ordered collection of jobs. Order is submission order and is reflected in
/// each job's `place_in_queue`.
#[derive(Debug, Clone, Default)]
pub struct QueueManager {
    entries: Vec<QueueEntry>,
}

impl QueueManager {
    /// Builds a queue, assigning `place_in_queue` from position. Two jobs may not
    /// share a checkpoint target.
    pub fn new(jobs: Vec<(Job, CheckpointStore)>) -> Result<Self, EngineError> {
        let mut seen: HashMap<PathBuf, usize> = HashMap::new();
        let mut entries = Vec::with_capacity(jobs.len());

        for (place, (mut job, store)) in jobs.into_iter().enumerate() {
            let key = normalize(store.path());
            if let Some(&first) = seen.get(&key) {
                return Err(EngineError::DuplicateCheckpointTarget {
                    path: store.path().to_path_buf(),
                    first,
                    second: place,
                });
            }
            seen.insert(key, place);

            job.place_in_queue = place;
            entries.push(QueueEntry {
                job,
                store,
                status: JobStatus::Pending,
            });
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn entry(&self, place: usize) -> Option<&QueueEntry> {
        self.entries.get(place)
    }

    pub fn entry_mut(&mut self, place: usize) -> Option<&mut QueueEntry> {
        self.entries.get_mut(place)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.entries.iter().map(|e| &e.job)
    }

    /// Loads every job's checkpoint. Jobs without one start fresh. An unreadable
    /// checkpoint fails its job unless `restart_on_corrupt` is set, in which case
    /// the job starts over. Returns how many jobs were restored.
    pub fn restore_checkpoints(&mut self, restart_on_corrupt: bool) -> usize {
        let mut restored = 0;
        for entry in &mut self.entries {
            let loaded = entry.store.load().and_then(|saved| match saved {
                Some(saved) if !stage_fits_plan(&entry.job, &saved) => Err(CheckpointError::Corrupt {
                    path: entry.store.path().to_path_buf(),
                    reason: format!(
                        "saved position is in the {} stage, which the job's current plan does not run",
                        saved.cursor.stage
                    ),
                }),
                other => Ok(other),
            });
            match loaded {
                Ok(Some(saved)) => {
                    if saved.place_in_queue != entry.job.place_in_queue {
                        warn!(
                            job = entry.job.name(),
                            saved = saved.place_in_queue,
                            current = entry.job.place_in_queue,
                            "Checkpoint was written at a different queue position."
                        );
                    }
                    entry.job.resume_from(saved);
                    if entry.job.is_complete() {
                        entry.status = JobStatus::Completed;
                    }
                    info!(
                        job = entry.job.name(),
                        snapshot_index = entry.job.cursor.snapshot_index,
                        molecule = %entry.job.cursor.molecule,
                        stage = %entry.job.cursor.stage,
                        fraction_done = entry.job.fraction_done,
                        "Restored job from checkpoint."
                    );
                    restored += 1;
                }
                Ok(None) => {}
                Err(source @ CheckpointError::Corrupt { .. }) if restart_on_corrupt => {
                    warn!(
                        job = entry.job.name(),
                        "Starting over after unreadable checkpoint: {}", source
                    );
                }
                Err(source) => {
                    let err = EngineError::CorruptCheckpoint {
                        job: entry.job.name().to_string(),
                        source,
                    };
                    warn!("{}", err);
                    entry.status = JobStatus::Failed {
                        reason: err.to_string(),
                    };
                }
            }
        }
        restored
    }

    pub fn overall_fraction_done(&self) -> f64 {
        progress::overall_fraction_done(self.jobs())
    }

    pub fn total_cpu_time(&self) -> f64 {
        self.jobs().map(|j| j.cpu_time).sum()
    }

    pub fn summary(&self, interrupted: bool) -> QueueSummary {
        QueueSummary {
            reports: self
                .entries
                .iter()
                .map(|e| JobReport {
                    place_in_queue: e.job.place_in_queue,
                    name: e.job.name().to_string(),
                    status: e.status.clone(),
                    fraction_done: e.job.fraction_done,
                    degraded_snapshots: e.job.degraded_snapshots,
                })
                .collect(),
            overall_fraction_done: self.overall_fraction_done(),
            interrupted,
        }
    }
}

/// A parked cursor takes the plan's first stage on commit, so only a live
/// position has to match the plan.
fn stage_fits_plan(job: &Job, saved: &Job) -> bool {
    saved.cursor.molecule == Molecule::EndOfMolecules || job.plan.includes(saved.cursor.stage)
}

fn normalize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobReport {
    pub place_in_queue: usize,
    pub name: String,
    pub status: JobStatus,
    pub fraction_done: f64,
    /// Committed snapshots with at least one solver failure.
    pub degraded_snapshots: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueSummary {
    pub reports: Vec<JobReport>,
    pub overall_fraction_done: f64,
    /// The host asked the run to stop before the queue was finished.
    pub interrupted: bool,
}

impl QueueSummary {
    pub fn any_failed(&self) -> bool {
        self.reports
            .iter()
            .any(|r| matches!(r.status, JobStatus::Failed { .. }))
    }

    pub fn completed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.status == JobStatus::Completed)
            .count()
    }
}
