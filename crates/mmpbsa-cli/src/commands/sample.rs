use crate::cli::SampleQueueArgs;
use crate::error::{CliError, Result};
use std::fs;
use tracing::info;

pub const SAMPLE_QUEUE: &str = r#"# MMPBSA queue file.
#
# Relative paths are resolved against the directory holding this file, and
# MD programs run in that directory.
# Template arguments may use {job}, {molecule}, {snapshot}, {prmtop},
# {trajectory}, {radii} and {atoms}; energy arguments may also use
# {md_output} and {trust_prmtop}.

[settings]
# Checkpoint files default to <checkpoint-dir>/<job name>.ckpt.
checkpoint-dir = "checkpoints"
# Seconds between checkpoints. Remove to checkpoint after every step.
# checkpoint-interval = 60.0
# Total MD launches allowed per unit before the job is failed.
max-md-attempts = 3
poll-interval-ms = 250
heartbeat-interval-ms = 1000
# Start over instead of failing a job whose checkpoint cannot be read.
restart-corrupt = false

# Default MD program for jobs that run MD.
[md]
program = "sander"
args = ["-O", "-i", "{molecule}.mdin", "-p", "{prmtop}", "-c", "{job}.{snapshot}.rst", "-o", "{job}.{molecule}.{snapshot}.mdout"]
inputs = ["{molecule}.mdin"]
output = "{job}.{molecule}.{snapshot}.mdout"
convergence-marker = "FINAL RESULTS"

# Default energy program. It must print one "TAG value" pair per line.
[energy]
program = "mmpbsa-energy"
args = ["--prmtop", "{prmtop}", "--frame", "{snapshot}", "--atoms", "{atoms}", "--mdout", "{md_output}"]

[[job]]
name = "ligand-a"
prmtop = "complex.prmtop"
trajectory = "complex.mdcrd"
radii = "radii.siz"
receptor-start = [1]
ligand-start = [3201]
# Omit to process every frame of the trajectory.
snapshots = [0, 10, 20, 30]
weight = 2.0

[[job]]
name = "ligand-b"
prmtop = "complex-b.prmtop"
trajectory = "complex-b.mdcrd"
receptor-start = [1]
ligand-start = [3187]
plan = "energy-only"
trust-prmtop = true
"#;

pub fn run(args: SampleQueueArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        return Err(CliError::Argument(format!(
            "'{}' already exists; pass --force to overwrite it",
            args.output.display()
        )));
    }
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&args.output, SAMPLE_QUEUE)?;
    info!("Sample queue written to {:?}", &args.output);
    println!("Sample queue written to: {}", args.output.display());
    Ok(())
}
