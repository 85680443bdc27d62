use super::defaults::DefaultsConfig;
use super::file::{FileConfig, FileJob, FileSettings};
use super::models::AppConfig;
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use mmpbsa::core::io::checkpoint::CheckpointStore;
use mmpbsa::core::models::job::{EnergySettings, Job, JobInputs, MdSettings, Stage, StagePlan};
use mmpbsa::engine::config::{CheckpointPolicy, PipelineConfig, PipelineConfigBuilder};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub fn build_config(args: &RunArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();
    let file_config = FileConfig::from_file(&args.queue)?;
    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let base_dir = match args.queue.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let settings = file_config.settings.take().unwrap_or_default();
    let pipeline = build_pipeline(args, &settings, &defaults)?;

    let checkpoint_dir = match &args.checkpoint_dir {
        Some(dir) => dir.clone(),
        None => resolve(
            &base_dir,
            settings
                .checkpoint_dir
                .unwrap_or_else(|| defaults.checkpoint_dir.clone()),
        ),
    };

    let md_default: Option<MdSettings> = file_config.md.map(|md| md_settings(md.into(), &base_dir));
    let energy_defaults: Option<EnergySettings> =
        file_config.energy.map(|e| energy_settings(e.into(), &base_dir));

    if file_config.jobs.is_empty() {
        warn!("Queue file {:?} defines no jobs.", args.queue);
    }
    let jobs = file_config
        .jobs
        .into_iter()
        .map(|file_job| {
            build_job(
                file_job,
                &base_dir,
                &checkpoint_dir,
                md_default.as_ref(),
                energy_defaults.is_some(),
                &defaults,
            )
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(jobs = jobs.len(), ?pipeline, "Configuration merged.");
    Ok(AppConfig {
        pipeline,
        jobs,
        energy_defaults,
    })
}

fn build_pipeline(
    args: &RunArgs,
    settings: &FileSettings,
    defaults: &DefaultsConfig,
) -> Result<PipelineConfig> {
    let checkpoint_policy = match args.checkpoint_interval.or(settings.checkpoint_interval) {
        None => CheckpointPolicy::EveryTransition,
        Some(secs) if secs.is_finite() && secs > 0.0 => {
            let interval = Duration::try_from_secs_f64(secs).map_err(|e| {
                CliError::Config(format!("Checkpoint interval of {secs} seconds is invalid: {e}"))
            })?;
            CheckpointPolicy::Interval(interval)
        }
        Some(secs) => {
            return Err(CliError::Config(format!(
                "Checkpoint interval must be a positive number of seconds, got {secs}"
            )));
        }
    };

    PipelineConfigBuilder::new()
        .checkpoint_policy(checkpoint_policy)
        .max_md_attempts(
            args.max_md_attempts
                .or(settings.max_md_attempts)
                .unwrap_or(defaults.max_md_attempts),
        )
        .poll_interval(Duration::from_millis(
            settings.poll_interval_ms.unwrap_or(defaults.poll_interval_ms),
        ))
        .heartbeat_interval(Duration::from_millis(
            settings
                .heartbeat_interval_ms
                .unwrap_or(defaults.heartbeat_interval_ms),
        ))
        .restart_on_corrupt_checkpoint(
            args.restart_corrupt || settings.restart_corrupt.unwrap_or(defaults.restart_corrupt),
        )
        .build()
        .map_err(|e| CliError::Config(e.to_string()))
}

fn build_job(
    file_job: FileJob,
    base_dir: &Path,
    checkpoint_dir: &Path,
    md_default: Option<&MdSettings>,
    has_energy_default: bool,
    defaults: &DefaultsConfig,
) -> Result<(Job, CheckpointStore)> {
    let name = file_job.name;
    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(CliError::Config(format!(
            "Job name '{name}' must be non-empty and contain no path separators"
        )));
    }

    let md: Option<MdSettings> = file_job
        .md
        .map(|md| md_settings(md.into(), base_dir))
        .or_else(|| md_default.cloned());
    let energy: Option<EnergySettings> =
        file_job.energy.map(|e| energy_settings(e.into(), base_dir));
    let plan = match file_job.plan {
        Some(plan) => plan.into(),
        None if md.is_some() => StagePlan::MdThenEnergy,
        None => StagePlan::EnergyOnly,
    };
    if plan.includes(Stage::Md) && md.is_none() {
        return Err(CliError::Config(format!(
            "Job '{name}' runs MD but no [md] settings are given"
        )));
    }
    if plan.includes(Stage::Energy) && energy.is_none() && !has_energy_default {
        return Err(CliError::Config(format!(
            "Job '{name}' computes energies but no [energy] settings are given"
        )));
    }

    let weight = file_job.weight.unwrap_or(defaults.weight);
    if !weight.is_finite() || weight < 0.0 {
        return Err(CliError::Config(format!(
            "Job '{name}' has invalid weight {weight}; weights must be non-negative"
        )));
    }

    let output = file_job
        .output
        .map(|p| resolve(base_dir, p))
        .unwrap_or_else(|| base_dir.join(format!("{name}.results.toml")));
    let checkpoint = file_job
        .checkpoint
        .map(|p| resolve(base_dir, p))
        .unwrap_or_else(|| checkpoint_dir.join(format!("{name}.{}", defaults.checkpoint_extension)));

    let inputs = JobInputs {
        name,
        prmtop: resolve(base_dir, file_job.prmtop),
        trajectory: resolve(base_dir, file_job.trajectory),
        radii: file_job.radii.map(|p| resolve(base_dir, p)),
        output,
        receptor_start: file_job.receptor_start,
        ligand_start: file_job.ligand_start,
        md,
        energy,
    };
    let job = Job::new(inputs, plan, 0, weight)
        .with_snapshots(file_job.snapshots.unwrap_or_default())
        .with_trust_prmtop(file_job.trust_prmtop);

    Ok((job, CheckpointStore::new(checkpoint)))
}

/// Relative paths in the queue file are relative to the file itself.
fn resolve(base_dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        base_dir.join(path)
    }
}

/// MD children run in the queue file's directory so relative templates and
/// arguments mean the same thing wherever `mmpbsa` is started from.
fn md_settings(mut md: MdSettings, base_dir: &Path) -> MdSettings {
    md.working_dir = Some(std::path::absolute(base_dir).unwrap_or_else(|_| base_dir.to_path_buf()));
    md
}

fn energy_settings(mut energy: EnergySettings, base_dir: &Path) -> EnergySettings {
    if energy.program.components().count() > 1 {
        energy.program = resolve(base_dir, energy.program);
    }
    energy
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid {kind} value for {key}: {value}")))
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let Some((key, value)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{kv_pair}'. Expected KEY=VALUE."
            )));
        };
        let settings = config.settings.get_or_insert_with(Default::default);

        match key {
            "settings.checkpoint-dir" => settings.checkpoint_dir = Some(PathBuf::from(value)),
            "settings.checkpoint-interval" => {
                settings.checkpoint_interval = Some(parse_value(key, value, "float")?)
            }
            "settings.max-md-attempts" => {
                settings.max_md_attempts = Some(parse_value(key, value, "integer")?)
            }
            "settings.poll-interval-ms" => {
                settings.poll_interval_ms = Some(parse_value(key, value, "integer")?)
            }
            "settings.heartbeat-interval-ms" => {
                settings.heartbeat_interval_ms = Some(parse_value(key, value, "integer")?)
            }
            "settings.restart-corrupt" => {
                settings.restart_corrupt = Some(parse_value(key, value, "boolean")?)
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{key}'"
                )));
            }
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ControlSource;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    const QUEUE: &str = r#"
        [settings]
        max-md-attempts = 4
        poll-interval-ms = 50

        [md]
        program = "sander"
        output = "{job}.{molecule}.{snapshot}.mdout"

        [energy]
        program = "mmpbsa-energy"

        [[job]]
        name = "lig1"
        prmtop = "complex.prmtop"
        trajectory = "/data/complex.mdcrd"
        snapshots = [0, 5]
        weight = 2.0

        [[job]]
        name = "lig2"
        prmtop = "complex2.prmtop"
        trajectory = "complex2.mdcrd"
        plan = "energy-only"
        checkpoint = "special/lig2.state"
    "#;

    fn args(queue: PathBuf) -> RunArgs {
        RunArgs {
            queue,
            checkpoint_dir: None,
            checkpoint_interval: None,
            restart_corrupt: false,
            max_md_attempts: None,
            control: ControlSource::None,
            progress_file: None,
            no_progress: true,
            set_values: Vec::new(),
        }
    }

    fn write_queue(text: &str) -> (TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.toml");
        fs::write(&path, text).unwrap();
        (dir, path)
    }

    #[test]
    fn build_config_merges_file_defaults_into_jobs() {
        let (dir, path) = write_queue(QUEUE);
        let config = build_config(&args(path)).unwrap();

        assert_eq!(config.pipeline.max_md_attempts, 4);
        assert_eq!(config.pipeline.poll_interval, Duration::from_millis(50));
        assert_eq!(config.pipeline.checkpoint_policy, CheckpointPolicy::EveryTransition);
        assert_eq!(config.jobs.len(), 2);
        assert!(config.energy_defaults.is_some());

        let (lig1, store1) = &config.jobs[0];
        assert_eq!(lig1.plan, StagePlan::MdThenEnergy);
        assert_eq!(lig1.weight, 2.0);
        assert_eq!(lig1.snapshots, vec![0, 5]);
        assert_eq!(lig1.inputs.prmtop, dir.path().join("complex.prmtop"));
        assert_eq!(lig1.inputs.trajectory, PathBuf::from("/data/complex.mdcrd"));
        assert_eq!(lig1.inputs.output, dir.path().join("lig1.results.toml"));
        assert!(lig1.inputs.md.is_some());
        assert_eq!(store1.path(), dir.path().join("checkpoints/lig1.ckpt"));

        let (lig2, store2) = &config.jobs[1];
        assert_eq!(lig2.plan, StagePlan::EnergyOnly);
        assert!(lig2.snapshots.is_empty());
        assert_eq!(store2.path(), dir.path().join("special/lig2.state"));
    }

    #[test]
    fn command_line_overrides_win_over_file_and_set_values_win_over_file() {
        let (_dir, path) = write_queue(QUEUE);
        let mut run_args = args(path);
        run_args.max_md_attempts = Some(9);
        run_args.checkpoint_interval = Some(30.0);
        run_args.checkpoint_dir = Some(PathBuf::from("/tmp/ckpts"));
        run_args.set_values = vec![
            "settings.poll-interval-ms=10".to_string(),
            "settings.restart-corrupt=true".to_string(),
        ];

        let config = build_config(&run_args).unwrap();

        assert_eq!(config.pipeline.max_md_attempts, 9);
        assert_eq!(config.pipeline.poll_interval, Duration::from_millis(10));
        assert!(config.pipeline.restart_on_corrupt_checkpoint);
        assert_eq!(
            config.pipeline.checkpoint_policy,
            CheckpointPolicy::Interval(Duration::from_secs(30))
        );
        assert_eq!(config.jobs[0].1.path(), Path::new("/tmp/ckpts/lig1.ckpt"));
    }

    #[test]
    fn md_and_energy_programs_are_anchored_to_the_queue_directory() {
        let (dir, path) = write_queue(
            "[md]\nprogram = \"./bin/sander\"\ninputs = [\"{molecule}.mdin\"]\noutput = \"{job}.mdout\"\n\
             [energy]\nprogram = \"tools/energy\"\n\
             [[job]]\nname = \"a\"\nprmtop = \"p\"\ntrajectory = \"t\"\n\
             [[job]]\nname = \"b\"\nprmtop = \"p\"\ntrajectory = \"t\"\n\
             [job.md]\nprogram = \"pmemd\"\noutput = \"{job}.out\"\n\
             [job.energy]\nprogram = \"mmpbsa-energy\"\n",
        );
        let config = build_config(&args(path)).unwrap();
        let base = std::path::absolute(dir.path()).unwrap();

        let md_a = config.jobs[0].0.inputs.md.as_ref().unwrap();
        assert_eq!(md_a.working_dir.as_deref(), Some(base.as_path()));
        assert_eq!(md_a.program_path(), base.join("./bin/sander"));
        assert_eq!(md_a.resolve(PathBuf::from("complex.mdin")), base.join("complex.mdin"));
        assert_eq!(
            config.energy_defaults.as_ref().unwrap().program,
            dir.path().join("tools/energy")
        );

        let job_b = &config.jobs[1].0;
        let md_b = job_b.inputs.md.as_ref().unwrap();
        assert_eq!(md_b.working_dir.as_deref(), Some(base.as_path()));
        assert_eq!(md_b.program_path(), PathBuf::from("pmemd"));
        assert_eq!(
            job_b.inputs.energy.as_ref().unwrap().program,
            PathBuf::from("mmpbsa-energy")
        );
    }

    #[test]
    fn huge_checkpoint_interval_is_a_config_error() {
        let (_dir, path) = write_queue(QUEUE);
        let mut run_args = args(path.clone());
        run_args.checkpoint_interval = Some(1e30);
        assert!(matches!(build_config(&run_args), Err(CliError::Config(_))));

        let mut run_args = args(path);
        run_args.set_values = vec!["settings.checkpoint-interval=1e30".to_string()];
        assert!(matches!(build_config(&run_args), Err(CliError::Config(_))));
    }

    #[test]
    fn md_plan_without_md_settings_is_rejected() {
        let (_dir, path) = write_queue(
            "[energy]\nprogram = \"e\"\n[[job]]\nname = \"a\"\nprmtop = \"p\"\ntrajectory = \"t\"\nplan = \"md-only\"\n",
        );
        let result = build_config(&args(path));
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("no [md] settings")));
    }

    #[test]
    fn energy_plan_without_energy_settings_is_rejected() {
        let (_dir, path) =
            write_queue("[[job]]\nname = \"a\"\nprmtop = \"p\"\ntrajectory = \"t\"\n");
        let result = build_config(&args(path));
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("no [energy] settings")));
    }

    #[test]
    fn negative_weight_is_rejected() {
        let (_dir, path) = write_queue(
            "[energy]\nprogram = \"e\"\n[[job]]\nname = \"a\"\nprmtop = \"p\"\ntrajectory = \"t\"\nweight = -1.0\n",
        );
        assert!(matches!(build_config(&args(path)), Err(CliError::Config(_))));
    }

    #[test]
    fn job_names_with_separators_are_rejected() {
        let (_dir, path) = write_queue(
            "[energy]\nprogram = \"e\"\n[[job]]\nname = \"a/b\"\nprmtop = \"p\"\ntrajectory = \"t\"\n",
        );
        assert!(matches!(build_config(&args(path)), Err(CliError::Config(_))));
    }

    #[test]
    fn non_positive_checkpoint_interval_is_rejected() {
        let (_dir, path) = write_queue(QUEUE);
        let mut run_args = args(path);
        run_args.checkpoint_interval = Some(0.0);
        assert!(matches!(build_config(&run_args), Err(CliError::Config(_))));
    }

    #[test]
    fn apply_set_values_rejects_malformed_and_unknown_keys() {
        let result = apply_set_values(FileConfig::default(), &["settings.max-md-attempts".to_string()]);
        assert!(matches!(result, Err(CliError::Config(_))));

        let result = apply_set_values(FileConfig::default(), &["job.weight=2".to_string()]);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("Unsupported")));

        let result =
            apply_set_values(FileConfig::default(), &["settings.max-md-attempts=many".to_string()]);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("integer")));
    }
}
