use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use mmpbsa::engine::progress::{Progress, ProgressCallback};
use std::sync::{Arc, Mutex};
use tracing::warn;

const BAR_RESOLUTION: u64 = 1000;

#[derive(Clone)]
pub struct CliProgressHandler {
    pb: Arc<Mutex<ProgressBar>>,
}

impl CliProgressHandler {
    pub fn new() -> Self {
        let pb = ProgressBar::new(BAR_RESOLUTION)
            .with_style(Self::bar_style())
            .with_message("Starting...");
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());

        Self {
            pb: Arc::new(Mutex::new(pb)),
        }
    }

    pub fn get_callback(&self) -> ProgressCallback<'static> {
        let pb_clone = self.pb.clone();

        Box::new(move |progress: Progress| {
            let Ok(pb_guard) = pb_clone.lock() else {
                warn!("Progress bar mutex was poisoned. Cannot update progress.");
                return;
            };

            match progress {
                Progress::JobStart {
                    place_in_queue,
                    name,
                    ..
                } => {
                    pb_guard.set_prefix(format!("#{place_in_queue} {name}"));
                    pb_guard.set_message("resuming");
                }
                Progress::UnitStart {
                    molecule,
                    stage,
                    snapshot,
                } => {
                    pb_guard.set_message(format!("{stage} {molecule} @ {snapshot}"));
                }
                Progress::JobFinish {
                    place_in_queue,
                    completed,
                } => {
                    let outcome = if completed { "done" } else { "stopped" };
                    pb_guard.println(format!("  job #{place_in_queue} {outcome}"));
                }
                Progress::FractionDone {
                    overall, suspended, ..
                } => {
                    pb_guard.set_position((overall * BAR_RESOLUTION as f64).round() as u64);
                    if suspended {
                        pb_guard.set_message("suspended");
                    }
                }
                Progress::Message(msg) => {
                    pb_guard.println(format!("  {}", msg));
                }
            }
        })
    }

    /// Leaves the bar at its last position.
    pub fn finish(&self) {
        if let Ok(pb_guard) = self.pb.lock() {
            pb_guard.abandon();
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{prefix:<20} [{bar:40.cyan/blue}] {percent_done:>6} {msg} ({elapsed_precise})",
        )
        .expect("Failed to create bar style template")
        .with_key(
            "percent_done",
            |state: &ProgressState, w: &mut dyn std::fmt::Write| {
                write!(w, "{:.1}%", state.fraction() * 100.0).unwrap()
            },
        )
        .progress_chars("##-")
    }
}

impl Default for CliProgressHandler {
    fn default() -> Self {
        Self::new()
    }
}
