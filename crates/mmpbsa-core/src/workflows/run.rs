use crate::core::io::results::ResultsFile;
use crate::core::io::trajectory::count_snapshots;
use crate::core::models::job::{Job, Stage};
use crate::engine::config::{CheckpointPolicy, PipelineConfig};
use crate::engine::control::{ControlChannel, ControlMessage};
use crate::engine::energy::{EnergyCalculator, EnergyRequest};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::queue::{JobStatus, QueueEntry, QueueManager, QueueSummary};
use crate::engine::state::{self, PipelineState, Transition, WorkUnit};
use crate::engine::supervisor::{MdSupervisor, ProcessStatus};
use crate::engine::utils::template::md_output_path;
use std::thread;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

enum Flow {
    Continue,
    Quit,
}

enum JobOutcome {
    Completed,
    Quit,
}

/// Runs every pending job of the queue in order.
///
/// Checkpoints are restored first. A job that fails is recorded in the summary and
/// the queue moves on; only checkpoint write failures and internal errors abort the
/// whole run. A QUIT from the host checkpoints the current job and returns a summary
/// with `interrupted` set.
#[instrument(skip_all, name = "queue_workflow")]
pub fn run_queue(
    queue: &mut QueueManager,
    config: &PipelineConfig,
    energy: &dyn EnergyCalculator,
    control: &mut dyn ControlChannel,
    reporter: &ProgressReporter,
) -> Result<QueueSummary, EngineError> {
    let restored = queue.restore_checkpoints(config.restart_on_corrupt_checkpoint);
    info!(
        jobs = queue.len(),
        restored, "Starting queue of {} job(s).", queue.len()
    );

    let mut driver = Driver {
        config,
        energy,
        control,
        reporter,
        supervisor: MdSupervisor::new(),
        suspended: false,
        last_checkpoint: Instant::now(),
    };
    driver.report_fraction(queue, None);

    for place in 0..queue.len() {
        if entry(queue, place)?.status != JobStatus::Pending {
            continue;
        }

        match driver.run_job(queue, place) {
            Ok(JobOutcome::Completed) => {
                entry_mut(queue, place)?.status = JobStatus::Completed;
                reporter.report(Progress::JobFinish {
                    place_in_queue: place,
                    completed: true,
                });
            }
            Ok(JobOutcome::Quit) => {
                info!("Host requested quit; stopping after checkpoint.");
                return Ok(queue.summary(true));
            }
            Err(e) if e.is_process_fatal() => return Err(e),
            Err(e) => {
                error!("{}", e);
                entry_mut(queue, place)?.status = JobStatus::Failed {
                    reason: e.to_string(),
                };
                reporter.report(Progress::JobFinish {
                    place_in_queue: place,
                    completed: false,
                });
            }
        }
        driver.report_fraction(queue, Some(place));
    }

    let summary = queue.summary(false);
    info!(
        completed = summary.completed(),
        overall = summary.overall_fraction_done,
        "Queue finished."
    );
    Ok(summary)
}

fn entry(queue: &QueueManager, place: usize) -> Result<&QueueEntry, EngineError> {
    queue
        .entry(place)
        .ok_or_else(|| EngineError::Internal(format!("no job at queue position {place}")))
}

fn entry_mut(queue: &mut QueueManager, place: usize) -> Result<&mut QueueEntry, EngineError> {
    queue
        .entry_mut(place)
        .ok_or_else(|| EngineError::Internal(format!("no job at queue position {place}")))
}

fn job_mut(queue: &mut QueueManager, place: usize) -> Result<&mut Job, EngineError> {
    entry_mut(queue, place).map(|e| &mut e.job)
}

struct Driver<'a, 'r> {
    config: &'a PipelineConfig,
    energy: &'a dyn EnergyCalculator,
    control: &'a mut dyn ControlChannel,
    reporter: &'a ProgressReporter<'r>,
    supervisor: MdSupervisor,
    suspended: bool,
    last_checkpoint: Instant,
}

impl Driver<'_, '_> {
    #[instrument(skip(self, queue))]
    fn run_job(&mut self, queue: &mut QueueManager, place: usize) -> Result<JobOutcome, EngineError> {
        // === Preparation ===
        let job = &entry(queue, place)?.job;
        info!(job = job.name(), fraction_done = job.fraction_done, "Starting job.");
        self.reporter.report(Progress::JobStart {
            place_in_queue: place,
            name: job.name().to_string(),
            fraction_done: job.fraction_done,
        });

        if state::state_of(job) == PipelineState::Unresolved {
            let count = count_snapshots(&job.inputs.prmtop, &job.inputs.trajectory).map_err(
                |source| EngineError::Trajectory {
                    job: job.name().to_string(),
                    source,
                },
            )?;
            info!(job = job.name(), count, "Resolved snapshot list from trajectory.");
            state::advance(
                job_mut(queue, place)?,
                Transition::SnapshotsResolved((0..count).collect()),
            )?;
            self.persist(queue, place, true)?;
        }

        let job = &entry(queue, place)?.job;
        let results = ResultsFile::new(job.inputs.output.clone());
        if job.plan.includes(Stage::Energy) {
            results
                .rewind_to(job.output_committed_len)
                .map_err(|source| EngineError::Results {
                    job: job.name().to_string(),
                    source,
                })?;
        }

        // === Unit loop ===
        loop {
            if let Flow::Quit = self.check_control(queue, place) {
                self.persist(queue, place, true)?;
                return Ok(JobOutcome::Quit);
            }

            match state::state_of(&entry(queue, place)?.job) {
                PipelineState::Complete => {
                    self.persist(queue, place, true)?;
                    info!(job = entry(queue, place)?.job.name(), "Job complete.");
                    return Ok(JobOutcome::Completed);
                }
                PipelineState::Unresolved => {
                    return Err(EngineError::Internal(format!(
                        "job at position {place} has no snapshot list after resolution"
                    )));
                }
                PipelineState::SnapshotDone { snapshot, .. } => {
                    self.commit_snapshot(queue, place, &results, snapshot)?;
                }
                PipelineState::Ready(unit) => {
                    self.reporter.report(Progress::UnitStart {
                        molecule: unit.molecule,
                        stage: unit.stage,
                        snapshot: unit.snapshot,
                    });
                    match unit.stage {
                        Stage::Md => {
                            if let Flow::Quit = self.run_md(queue, place, unit)? {
                                return Ok(JobOutcome::Quit);
                            }
                        }
                        Stage::Energy => self.run_energy(queue, place, unit)?,
                    }
                }
            }
            self.report_fraction(queue, Some(place));
        }
    }

    fn run_md(
        &mut self,
        queue: &mut QueueManager,
        place: usize,
        unit: WorkUnit,
    ) -> Result<Flow, EngineError> {
        let max_attempts = self.config.max_md_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let job = &entry(queue, place)?.job;
            let mut handle = self
                .supervisor
                .launch(job, unit.molecule, unit.snapshot)
                .map_err(|source| EngineError::ProcessLaunch {
                    job: job.name().to_string(),
                    source,
                })?;

            let outcome = loop {
                if let Flow::Quit = self.check_control(queue, place) {
                    // The unit has not advanced, so it is re-run on restart.
                    self.persist(queue, place, true)?;
                    if let Err(e) = handle.kill() {
                        warn!("Failed to stop MD process {}: {}", handle.id(), e);
                    }
                    return Ok(Flow::Quit);
                }
                match handle.poll() {
                    Ok(ProcessStatus::Running) => {
                        self.heartbeat(queue, place);
                        thread::sleep(self.config.poll_interval);
                    }
                    Ok(status) => break Ok(status),
                    Err(e) => break Err(e.to_string()),
                }
            };

            let job = job_mut(queue, place)?;
            job.cpu_time += handle.elapsed().as_secs_f64();

            let reason = match outcome {
                Ok(ProcessStatus::ExitedOk) => {
                    if let Err(e) = handle.check_convergence() {
                        warn!("Could not inspect MD output: {}", e);
                    }
                    state::advance(job, Transition::UnitCompleted(unit))?;
                    self.persist(queue, place, false)?;
                    return Ok(Flow::Continue);
                }
                Ok(status) => status.to_string(),
                Err(reason) => reason,
            };

            if attempt >= max_attempts {
                return Err(EngineError::StageFailed {
                    job: job.name().to_string(),
                    stage: unit.stage,
                    molecule: unit.molecule,
                    snapshot: unit.snapshot,
                    attempts: attempt,
                    reason,
                });
            }
            warn!(
                job = job.name(),
                molecule = %unit.molecule,
                snapshot = unit.snapshot,
                "MD attempt {}/{} failed ({}); retrying.",
                attempt,
                max_attempts,
                reason
            );
        }
    }

    fn run_energy(
        &mut self,
        queue: &mut QueueManager,
        place: usize,
        unit: WorkUnit,
    ) -> Result<(), EngineError> {
        let started = Instant::now();
        let job = &entry(queue, place)?.job;
        let md_output = if job.plan.includes(Stage::Md) {
            md_output_path(job, unit.molecule, unit.snapshot)
        } else {
            None
        };
        let request = EnergyRequest {
            job,
            molecule: unit.molecule,
            snapshot: unit.snapshot,
            md_output: md_output.as_deref(),
        };
        let energies = self
            .energy
            .compute(&request)
            .map_err(|source| EngineError::Energy {
                job: job.name().to_string(),
                source,
            })?;

        if energies.solver_failed {
            warn!(
                job = job.name(),
                molecule = %unit.molecule,
                snapshot = unit.snapshot,
                "Surface solver failed; energies are recorded as degraded."
            );
        }

        let job = job_mut(queue, place)?;
        job.pending.insert(unit.molecule, energies);
        job.cpu_time += started.elapsed().as_secs_f64();
        state::advance(job, Transition::UnitCompleted(unit))?;
        self.persist(queue, place, false)
    }

    fn commit_snapshot(
        &mut self,
        queue: &mut QueueManager,
        place: usize,
        results: &ResultsFile,
        snapshot: usize,
    ) -> Result<(), EngineError> {
        let job = job_mut(queue, place)?;
        if job.plan.includes(Stage::Energy) {
            let len = results
                .append_snapshot(snapshot, &job.pending)
                .map_err(|source| EngineError::Results {
                    job: job.name().to_string(),
                    source,
                })?;
            job.output_committed_len = len;
            if job.pending.any_solver_failed() {
                job.degraded_snapshots += 1;
            }
        }
        state::advance(job, Transition::SnapshotCommitted)?;
        info!(
            job = job.name(),
            snapshot,
            fraction_done = job.fraction_done,
            "Snapshot committed."
        );
        self.persist(queue, place, false)
    }

    /// Writes the job's checkpoint when the policy calls for it, or always when forced.
    fn persist(&mut self, queue: &mut QueueManager, place: usize, force: bool) -> Result<(), EngineError> {
        let due = force
            || match self.config.checkpoint_policy {
                CheckpointPolicy::EveryTransition => true,
                CheckpointPolicy::Interval(interval) => self.last_checkpoint.elapsed() >= interval,
            };
        if !due {
            return Ok(());
        }

        let entry = entry_mut(queue, place)?;
        entry.job.checkpoint_counter += 1;
        entry
            .store
            .save(&entry.job)
            .map_err(|source| EngineError::CheckpointWrite {
                job: entry.job.name().to_string(),
                source,
            })?;
        self.last_checkpoint = Instant::now();
        Ok(())
    }

    /// Reads host messages for this tick. While suspended, keeps reading (and sending
    /// heartbeats) until the host resumes or quits.
    fn check_control(&mut self, queue: &QueueManager, place: usize) -> Flow {
        loop {
            match self.control.poll() {
                ControlMessage::Quit => return Flow::Quit,
                ControlMessage::Suspend if !self.suspended => {
                    info!("Suspended by host.");
                    self.suspended = true;
                    self.report_fraction(queue, Some(place));
                }
                ControlMessage::Resume if self.suspended => {
                    info!("Resumed by host.");
                    self.suspended = false;
                    self.report_fraction(queue, Some(place));
                }
                _ => {}
            }
            if !self.suspended {
                return Flow::Continue;
            }
            if self.control.is_closed() {
                warn!("Control channel closed while suspended; stopping as if asked to quit.");
                return Flow::Quit;
            }
            self.heartbeat(queue, place);
            thread::sleep(self.config.poll_interval);
        }
    }

    fn heartbeat(&self, queue: &QueueManager, place: usize) {
        if self.reporter.heartbeat_due(self.config.heartbeat_interval) {
            self.report_fraction(queue, Some(place));
        }
    }

    fn report_fraction(&self, queue: &QueueManager, place: Option<usize>) {
        let job_fraction = place
            .and_then(|p| queue.entry(p))
            .map_or(0.0, |e| e.job.fraction_done);
        self.reporter.report_fraction(
            queue.overall_fraction_done(),
            job_fraction,
            queue.total_cpu_time(),
            self.suspended,
        );
    }
}
