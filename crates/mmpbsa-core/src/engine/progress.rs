use crate::core::models::job::{Job, Molecule, Stage};
use std::cell::Cell;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    JobStart {
        place_in_queue: usize,
        name: String,
        fraction_done: f64,
    },
    UnitStart {
        molecule: Molecule,
        stage: Stage,
        snapshot: usize,
    },
    JobFinish {
        place_in_queue: usize,
        completed: bool,
    },

    /// Outbound host report. `overall` never decreases within one reporter.
    FractionDone {
        overall: f64,
        job: f64,
        cpu_time: f64,
        suspended: bool,
    },

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
    high_water: Cell<f64>,
    last_fraction_report: Cell<Option<Instant>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
            ..Self::default()
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    /// Emits a fraction-done report, holding `overall` at the highest value seen so far.
    pub fn report_fraction(&self, overall: f64, job: f64, cpu_time: f64, suspended: bool) {
        let overall = overall.clamp(0.0, 1.0).max(self.high_water.get());
        self.high_water.set(overall);
        self.last_fraction_report.set(Some(Instant::now()));
        self.report(Progress::FractionDone {
            overall,
            job: job.clamp(0.0, 1.0),
            cpu_time,
            suspended,
        });
    }

    /// True when no fraction report has gone out for a full `interval`.
    pub fn heartbeat_due(&self, interval: Duration) -> bool {
        self.last_fraction_report
            .get()
            .is_none_or(|last| last.elapsed() >= interval)
    }

    pub fn last_overall(&self) -> f64 {
        self.high_water.get()
    }
}

/// Largest value reported while any job is unfinished.
const BELOW_DONE: f64 = 1.0 - f64::EPSILON;

/// Weighted mean of every job's fraction done.
///
/// An empty queue counts as finished. When all weights are zero each job counts
/// equally. The result is 1.0 only when every job is done and 0.0 only when no
/// job has started, so a zero-weight job still holds the ends of the range.
pub fn overall_fraction_done<'j>(jobs: impl IntoIterator<Item = &'j Job>) -> f64 {
    let mut weighted = 0.0;
    let mut weights = 0.0;
    let mut unweighted = 0.0;
    let mut count = 0usize;
    let mut all_done = true;
    let mut any_started = false;

    for job in jobs {
        let fraction = job.fraction_done.clamp(0.0, 1.0);
        weighted += job.weight * fraction;
        weights += job.weight;
        unweighted += fraction;
        count += 1;
        all_done &= fraction >= 1.0;
        any_started |= fraction > 0.0;
    }

    if count == 0 {
        return 1.0;
    }
    let overall = if weights > 0.0 {
        weighted / weights
    } else {
        unweighted / count as f64
    };
    if all_done {
        1.0
    } else if !any_started {
        0.0
    } else {
        overall.clamp(f64::MIN_POSITIVE, BELOW_DONE)
    }
}
