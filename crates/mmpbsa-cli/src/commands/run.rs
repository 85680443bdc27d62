use crate::cli::{ControlSource, RunArgs};
use crate::config::builder::build_config;
use crate::error::{CliError, Result};
use crate::utils::control::spawn_stdin_control;
use crate::utils::progress::CliProgressHandler;
use crate::utils::progress_file::ProgressFile;
use mmpbsa::engine::control::{ControlChannel, NoControl};
use mmpbsa::engine::energy::CommandEnergyCalculator;
use mmpbsa::engine::progress::{Progress, ProgressCallback, ProgressReporter};
use mmpbsa::engine::queue::{JobStatus, QueueManager, QueueSummary};
use mmpbsa::workflows;
use tracing::{info, warn};

pub fn run(args: RunArgs) -> Result<()> {
    info!("Building queue configuration from {:?}", &args.queue);
    let config = build_config(&args)?;
    let mut queue = QueueManager::new(config.jobs)?;

    let energy = match config.energy_defaults {
        Some(settings) => CommandEnergyCalculator::with_default_settings(settings),
        None => CommandEnergyCalculator::new(),
    };

    let mut control: Box<dyn ControlChannel> = match args.control {
        ControlSource::None => Box::new(NoControl),
        ControlSource::Stdin => {
            info!("Reading suspend/resume/quit messages from standard input.");
            Box::new(spawn_stdin_control())
        }
    };

    let progress_handler = (!args.no_progress).then(CliProgressHandler::new);
    let mut sinks: Vec<ProgressCallback<'static>> = Vec::new();
    if let Some(handler) = &progress_handler {
        sinks.push(handler.get_callback());
    }
    if let Some(path) = &args.progress_file {
        info!("Mirroring progress to {:?}", path);
        sinks.push(ProgressFile::new(path).get_callback());
    }
    let reporter = if sinks.is_empty() {
        ProgressReporter::new()
    } else {
        ProgressReporter::with_callback(Box::new(move |event: Progress| {
            for sink in &sinks {
                sink(event.clone());
            }
        }))
    };

    println!("Running {} job(s)...", queue.len());
    let result = workflows::run::run_queue(
        &mut queue,
        &config.pipeline,
        &energy,
        control.as_mut(),
        &reporter,
    );
    if let Some(handler) = &progress_handler {
        handler.finish();
    }
    let summary = result?;

    print_summary(&summary);

    if summary.any_failed() {
        let failed = summary
            .reports
            .iter()
            .filter(|r| matches!(r.status, JobStatus::Failed { .. }))
            .count();
        return Err(CliError::JobsFailed {
            failed,
            total: summary.reports.len(),
        });
    }
    if summary.interrupted {
        warn!("Queue stopped on request; rerun the same command to resume.");
    }
    Ok(())
}

fn print_summary(summary: &QueueSummary) {
    println!();
    for report in &summary.reports {
        let status = match &report.status {
            JobStatus::Completed => "completed".to_string(),
            JobStatus::Pending => format!("pending ({:.1}%)", report.fraction_done * 100.0),
            JobStatus::Failed { reason } => format!("FAILED: {reason}"),
        };
        println!("  #{:<3} {:<20} {}", report.place_in_queue, report.name, status);
        if report.degraded_snapshots > 0 {
            println!(
                "       {} snapshot(s) recorded with a failed surface-area solve",
                report.degraded_snapshots
            );
        }
    }
    println!(
        "Overall: {:.1}% done, {} of {} job(s) completed{}",
        summary.overall_fraction_done * 100.0,
        summary.completed(),
        summary.reports.len(),
        if summary.interrupted { " (interrupted)" } else { "" }
    );
}
