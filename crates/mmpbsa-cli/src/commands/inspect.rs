use crate::cli::InspectArgs;
use crate::error::{CliError, Result};
use mmpbsa::core::io::checkpoint::CheckpointStore;
use mmpbsa::core::models::job::Job;
use tracing::info;

pub fn run(args: InspectArgs) -> Result<()> {
    for path in &args.checkpoints {
        info!("Reading checkpoint {:?}", path);
        let job = CheckpointStore::new(path)
            .load()
            .map_err(|e| CliError::FileParsing {
                path: path.clone(),
                source: e.into(),
            })?
            .ok_or_else(|| {
                CliError::Argument(format!("Checkpoint '{}' does not exist", path.display()))
            })?;
        println!("{}", describe(&job));
    }
    Ok(())
}

fn describe(job: &Job) -> String {
    let position = if job.is_complete() {
        "complete".to_string()
    } else if job.snapshots.is_empty() {
        "snapshots not yet resolved".to_string()
    } else {
        match job.current_snapshot() {
            Some(snapshot) => format!(
                "snapshot {} ({} of {}), {} {}",
                snapshot,
                job.cursor.snapshot_index + 1,
                job.snapshots.len(),
                job.cursor.molecule,
                job.cursor.stage
            ),
            None => "past the last snapshot".to_string(),
        }
    };
    format!(
        "{name}: {position}\n  fraction done: {fraction:.1}%  time spent: {cpu:.1}s  checkpoints written: {counter}  degraded snapshots: {degraded}",
        name = job.name(),
        fraction = job.fraction_done * 100.0,
        cpu = job.cpu_time,
        counter = job.checkpoint_counter,
        degraded = job.degraded_snapshots,
    )
}
