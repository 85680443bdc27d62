use mmpbsa::engine::progress::{Progress, ProgressCallback};
use serde::Serialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tracing::warn;

#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
struct Status {
    fraction_done: f64,
    job_fraction_done: f64,
    cpu_time: f64,
    suspended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_job: Option<String>,
}

/// Mirrors fraction-done reports into a small TOML document that external
/// tools can poll. The file is replaced atomically on every report.
#[derive(Clone)]
pub struct ProgressFile {
    path: PathBuf,
    status: Arc<Mutex<Status>>,
}

impl ProgressFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            status: Arc::new(Mutex::new(Status::default())),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let sink = self.clone();
        Box::new(move |progress: Progress| sink.handle(progress))
    }

    fn handle(&self, progress: Progress) {
        let Ok(mut status) = self.status.lock() else {
            warn!("Progress file state was poisoned. Cannot update progress.");
            return;
        };
        match progress {
            Progress::JobStart { name, .. } => status.current_job = Some(name),
            Progress::FractionDone {
                overall,
                job,
                cpu_time,
                suspended,
            } => {
                status.fraction_done = overall;
                status.job_fraction_done = job;
                status.cpu_time = cpu_time;
                status.suspended = suspended;
                if let Err(e) = write_status(&self.path, &status) {
                    warn!(path = %self.path.display(), "Failed to write progress file: {}", e);
                }
            }
            _ => {}
        }
    }
}

fn write_status(path: &Path, status: &Status) -> io::Result<()> {
    let text = toml::to_string(status).map_err(io::Error::other)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(text.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
