use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "MMPBSA queue driver - runs batches of MD and MM/PBSA free-energy calculations with checkpoint/restart.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run (or resume) every job in a queue file.
    Run(RunArgs),
    /// Write an annotated example queue file.
    SampleQueue(SampleQueueArgs),
    /// Print the saved position and progress of checkpoint files.
    Inspect(InspectArgs),
}

/// Where host control messages are read from.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlSource {
    /// No host; the queue runs until it is finished.
    #[default]
    None,
    /// One message per line on standard input: suspend, resume or quit.
    Stdin,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the queue file in TOML format.
    #[arg(value_name = "QUEUE")]
    pub queue: PathBuf,

    // --- Checkpoint Overrides ---
    /// Directory for per-job checkpoint files, overriding the queue file.
    #[arg(long, value_name = "DIR")]
    pub checkpoint_dir: Option<PathBuf>,

    /// Write checkpoints at most every SECONDS instead of after every transition.
    #[arg(long, value_name = "SECONDS")]
    pub checkpoint_interval: Option<f64>,

    /// Start a job over when its checkpoint cannot be read, instead of failing it.
    #[arg(long)]
    pub restart_corrupt: bool,

    // --- Execution Overrides ---
    /// Total MD launches allowed per unit before the job fails.
    #[arg(long, value_name = "INT")]
    pub max_md_attempts: Option<usize>,

    /// Source of suspend/resume/quit messages.
    #[arg(long, value_enum, default_value_t = ControlSource::None)]
    pub control: ControlSource,

    // --- Reporting ---
    /// Mirror progress into a small TOML status file, rewritten on every report.
    #[arg(long, value_name = "PATH")]
    pub progress_file: Option<PathBuf>,

    /// Do not draw a progress bar.
    #[arg(long)]
    pub no_progress: bool,

    /// Set a specific configuration value, overriding the queue file.
    /// Can be used multiple times. Example: -S settings.max-md-attempts=5
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `sample-queue` subcommand.
#[derive(Args, Debug)]
pub struct SampleQueueArgs {
    /// Where to write the example queue file.
    #[arg(value_name = "PATH")]
    pub output: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `inspect` subcommand.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Checkpoint files to read.
    #[arg(value_name = "CHECKPOINT", required = true, num_args(1..))]
    pub checkpoints: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_parses_overrides_and_repeated_set_values() {
        let cli = Cli::try_parse_from([
            "mmpbsa",
            "-vv",
            "run",
            "queue.toml",
            "--max-md-attempts",
            "5",
            "--control",
            "stdin",
            "-S",
            "settings.poll-interval-ms=100",
            "-S",
            "settings.restart-corrupt=true",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.queue, PathBuf::from("queue.toml"));
        assert_eq!(args.max_md_attempts, Some(5));
        assert_eq!(args.control, ControlSource::Stdin);
        assert_eq!(args.set_values.len(), 2);
    }

    #[test]
    fn inspect_requires_at_least_one_checkpoint() {
        assert!(Cli::try_parse_from(["mmpbsa", "inspect"]).is_err());
        let cli = Cli::try_parse_from(["mmpbsa", "inspect", "a.ckpt", "b.ckpt"]).unwrap();
        let Commands::Inspect(args) = cli.command else {
            panic!("expected inspect command");
        };
        assert_eq!(args.checkpoints.len(), 2);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["mmpbsa", "-q", "-v", "sample-queue", "q.toml"]).is_err());
    }
}
