//! Launching and non-blocking supervision of MD child processes.

use super::utils::template::TemplateVars;
use crate::core::models::job::{Job, Molecule};
use std::fmt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Job has no MD settings")]
    NotConfigured,
    #[error("MD program '{path}' was not found", path = path.display())]
    ProgramNotFound { path: PathBuf },
    #[error("MD input '{path}' does not exist", path = path.display())]
    MissingInput { path: PathBuf },
    #[error("I/O error for '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Observed state of a supervised child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    ExitedOk,
    ExitedError(i32),
    Signaled,
}

impl ProcessStatus {
    pub fn is_finished(self) -> bool {
        self != ProcessStatus::Running
    }

    fn from_exit(status: ExitStatus) -> Self {
        match status.code() {
            Some(0) => ProcessStatus::ExitedOk,
            Some(code) => ProcessStatus::ExitedError(code),
            None => ProcessStatus::Signaled,
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Running => f.write_str("running"),
            ProcessStatus::ExitedOk => f.write_str("exited successfully"),
            ProcessStatus::ExitedError(code) => write!(f, "exited with code {code}"),
            ProcessStatus::Signaled => f.write_str("terminated by a signal"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MdSupervisor;

impl MdSupervisor {
    pub fn new() -> Self {
        Self
    }

    /// Starts the MD program for one partition of one snapshot.
    ///
    /// The program and every expanded input must exist. The child's output streams
    /// are redirected to the expanded output path.
    pub fn launch(
        &self,
        job: &Job,
        molecule: Molecule,
        snapshot: usize,
    ) -> Result<MdHandle, SupervisorError> {
        let md = job.inputs.md.as_ref().ok_or(SupervisorError::NotConfigured)?;
        let vars = TemplateVars::for_unit(job, molecule, snapshot);

        let program = md.program_path();
        if is_explicit_path(&program) && !program.is_file() {
            return Err(SupervisorError::ProgramNotFound { path: program });
        }
        for input in &md.inputs {
            let path = md.resolve(vars.expand_path(input));
            if !path.exists() {
                return Err(SupervisorError::MissingInput { path });
            }
        }

        let output = md.resolve(vars.expand_path(&md.output));
        let io_err = |source: io::Error| SupervisorError::Io {
            path: output.clone(),
            source,
        };
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let stdout = File::create(&output).map_err(io_err)?;
        let stderr = stdout.try_clone().map_err(io_err)?;

        let args: Vec<String> = md.args.iter().map(|arg| vars.expand(arg)).collect();
        let mut command = Command::new(&program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        if let Some(dir) = &md.working_dir {
            command.current_dir(dir);
        }
        let child = command.spawn().map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => SupervisorError::ProgramNotFound {
                path: program.clone(),
            },
            _ => SupervisorError::Io {
                path: program.clone(),
                source,
            },
        })?;

        info!(
            job = job.name(),
            %molecule,
            snapshot,
            pid = child.id(),
            "Launched MD process."
        );
        Ok(MdHandle {
            child,
            output,
            convergence_marker: md.convergence_marker.clone(),
            finished: None,
            started: Instant::now(),
        })
    }
}

fn is_explicit_path(program: &Path) -> bool {
    program.is_absolute() || program.components().count() > 1
}

/// A running (or finished) MD child.
///
/// Dropping a handle whose child has not been observed to exit kills and reaps it.
#[derive(Debug)]
pub struct MdHandle {
    child: Child,
    output: PathBuf,
    convergence_marker: Option<String>,
    finished: Option<ProcessStatus>,
    started: Instant,
}

impl MdHandle {
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Non-blocking status check. Once an exit has been observed the same status is
    /// returned on every later call.
    pub fn poll(&mut self) -> Result<ProcessStatus, SupervisorError> {
        if let Some(status) = self.finished {
            return Ok(status);
        }
        match self.child.try_wait() {
            Ok(None) => Ok(ProcessStatus::Running),
            Ok(Some(exit)) => {
                let status = ProcessStatus::from_exit(exit);
                debug!(pid = self.child.id(), %status, "MD process finished.");
                self.finished = Some(status);
                Ok(status)
            }
            Err(source) => Err(SupervisorError::Io {
                path: self.output.clone(),
                source,
            }),
        }
    }

    /// Terminates the child if it is still running and waits for it to be reaped.
    pub fn kill(&mut self) -> Result<ProcessStatus, SupervisorError> {
        if let Some(status) = self.finished {
            return Ok(status);
        }
        let io_err = |source: io::Error| SupervisorError::Io {
            path: self.output.clone(),
            source,
        };
        match self.child.kill() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(io_err(e)),
        }
        let exit = self.child.wait().map_err(io_err)?;
        let status = ProcessStatus::from_exit(exit);
        self.finished = Some(status);
        Ok(status)
    }

    /// Whether the configured convergence marker appears in the MD output.
    /// `None` when no marker is configured.
    pub fn check_convergence(&self) -> Result<Option<bool>, SupervisorError> {
        let Some(marker) = &self.convergence_marker else {
            return Ok(None);
        };
        let bytes = fs::read(&self.output).map_err(|source| SupervisorError::Io {
            path: self.output.clone(),
            source,
        })?;
        let converged = String::from_utf8_lossy(&bytes).contains(marker.as_str());
        if !converged {
            warn!(
                output = %self.output.display(),
                "MD output does not contain the convergence marker '{}'.", marker
            );
        }
        Ok(Some(converged))
    }
}

impl Drop for MdHandle {
    fn drop(&mut self) {
        if self.finished.is_none() {
            debug!(pid = self.child.id(), "Killing unfinished MD process.");
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
