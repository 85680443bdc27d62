use super::energy::SnapshotEnergies;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// The molecule partition under the cursor.
///
/// Partitions are always processed in declaration order. `EndOfMolecules` marks a
/// snapshot whose three partitions are all done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Molecule {
    Complex,
    Receptor,
    Ligand,
    EndOfMolecules,
}

impl Molecule {
    pub const PARTITIONS: [Molecule; 3] = [Molecule::Complex, Molecule::Receptor, Molecule::Ligand];

    /// The partition that follows this one. The sentinel is absorbing.
    pub fn next(self) -> Self {
        match self {
            Molecule::Complex => Molecule::Receptor,
            Molecule::Receptor => Molecule::Ligand,
            Molecule::Ligand | Molecule::EndOfMolecules => Molecule::EndOfMolecules,
        }
    }

    /// Zero-based position among the partitions; the sentinel sits after the last one.
    pub fn ordinal(self) -> usize {
        match self {
            Molecule::Complex => 0,
            Molecule::Receptor => 1,
            Molecule::Ligand => 2,
            Molecule::EndOfMolecules => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Molecule::Complex => "complex",
            Molecule::Receptor => "receptor",
            Molecule::Ligand => "ligand",
            Molecule::EndOfMolecules => "end-of-molecules",
        }
    }
}

impl fmt::Display for Molecule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing phase for the partition under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Md,
    Energy,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Md => f.write_str("md"),
            Stage::Energy => f.write_str("energy"),
        }
    }
}

/// Which stages exist for every partition of a job. This is fixed when the job is
/// defined; the state machine never decides at run time to skip a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StagePlan {
    #[default]
    MdThenEnergy,
    EnergyOnly,
    MdOnly,
}

impl StagePlan {
    pub fn first_stage(self) -> Stage {
        match self {
            StagePlan::MdThenEnergy | StagePlan::MdOnly => Stage::Md,
            StagePlan::EnergyOnly => Stage::Energy,
        }
    }

    /// The stage after `stage` for the same partition, if the plan has one.
    pub fn next_stage(self, stage: Stage) -> Option<Stage> {
        match (self, stage) {
            (StagePlan::MdThenEnergy, Stage::Md) => Some(Stage::Energy),
            _ => None,
        }
    }

    pub fn includes(self, stage: Stage) -> bool {
        match self {
            StagePlan::MdThenEnergy => true,
            StagePlan::EnergyOnly => stage == Stage::Energy,
            StagePlan::MdOnly => stage == Stage::Md,
        }
    }

    pub fn stages_per_molecule(self) -> usize {
        match self {
            StagePlan::MdThenEnergy => 2,
            StagePlan::EnergyOnly | StagePlan::MdOnly => 1,
        }
    }

    /// Zero-based position of `stage` within one partition's stages.
    pub fn stage_offset(self, stage: Stage) -> usize {
        match (self, stage) {
            (StagePlan::MdThenEnergy, Stage::Energy) => 1,
            _ => 0,
        }
    }
}

/// External MD program invocation. `args`, `inputs` and `output` are templates
/// expanded with `{job}`, `{molecule}` and `{snapshot}`.
///
/// When `working_dir` is set the child runs there, and a relative program path,
/// input or output is taken relative to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MdSettings {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub output: String,
    #[serde(default)]
    pub convergence_marker: Option<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl MdSettings {
    pub fn resolve(&self, path: PathBuf) -> PathBuf {
        match &self.working_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        }
    }

    /// The program to spawn. Bare names are left for the OS search path.
    pub fn program_path(&self) -> PathBuf {
        if self.program.is_absolute() || self.program.components().count() > 1 {
            self.resolve(self.program.clone())
        } else {
            self.program.clone()
        }
    }
}

/// External energy-extraction program invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EnergySettings {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Static description of what a job computes and where its files live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobInputs {
    pub name: String,
    pub prmtop: PathBuf,
    pub trajectory: PathBuf,
    #[serde(default)]
    pub radii: Option<PathBuf>,
    pub output: PathBuf,
    #[serde(default)]
    pub receptor_start: Vec<usize>,
    #[serde(default)]
    pub ligand_start: Vec<usize>,
    #[serde(default)]
    pub md: Option<MdSettings>,
    #[serde(default)]
    pub energy: Option<EnergySettings>,
}

/// Position of a job in its (snapshot, molecule, stage) space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Cursor {
    pub snapshot_index: usize,
    pub molecule: Molecule,
    pub stage: Stage,
}

/// One free-energy calculation together with everything needed to resume it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Job {
    pub place_in_queue: usize,
    pub weight: f64,
    pub plan: StagePlan,
    pub trust_prmtop: bool,
    /// Snapshot indices to process. Empty until resolved means "every frame".
    pub snapshots: Vec<usize>,
    pub fraction_done: f64,
    pub checkpoint_counter: u64,
    /// Seconds of wall-clock time spent on this job's MD children and energy calls.
    /// Reported to the host as CPU time; idle time while suspended is not counted.
    pub cpu_time: f64,
    /// Length of the results file after the last committed snapshot.
    pub output_committed_len: u64,
    pub degraded_snapshots: usize,
    pub cursor: Cursor,
    pub inputs: JobInputs,
    pub pending: SnapshotEnergies,
}

impl Job {
    pub fn new(inputs: JobInputs, plan: StagePlan, place_in_queue: usize, weight: f64) -> Self {
        Self {
            place_in_queue,
            weight,
            plan,
            trust_prmtop: false,
            snapshots: Vec::new(),
            fraction_done: 0.0,
            checkpoint_counter: 0,
            cpu_time: 0.0,
            output_committed_len: 0,
            degraded_snapshots: 0,
            cursor: Cursor {
                snapshot_index: 0,
                molecule: Molecule::Complex,
                stage: plan.first_stage(),
            },
            inputs,
            pending: SnapshotEnergies::default(),
        }
    }

    pub fn with_snapshots(mut self, snapshots: Vec<usize>) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn with_trust_prmtop(mut self, trust: bool) -> Self {
        self.trust_prmtop = trust;
        self
    }

    pub fn name(&self) -> &str {
        &self.inputs.name
    }

    /// Trajectory frame index under the cursor, if the cursor is inside the list.
    pub fn current_snapshot(&self) -> Option<usize> {
        self.snapshots.get(self.cursor.snapshot_index).copied()
    }

    pub fn is_complete(&self) -> bool {
        self.cursor.molecule == Molecule::EndOfMolecules
            && self.cursor.snapshot_index >= self.snapshots.len()
    }

    /// Adopts the progress recorded in `saved` while keeping this job's definition.
    pub fn resume_from(&mut self, saved: Job) {
        self.snapshots = saved.snapshots;
        self.cursor = saved.cursor;
        self.fraction_done = saved.fraction_done;
        self.checkpoint_counter = saved.checkpoint_counter;
        self.cpu_time = saved.cpu_time;
        self.output_committed_len = saved.output_committed_len;
        self.degraded_snapshots = saved.degraded_snapshots;
        self.pending = saved.pending;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_inputs(name: &str) -> JobInputs {
        JobInputs {
            name: name.to_string(),
            prmtop: PathBuf::from("complex.prmtop"),
            trajectory: PathBuf::from("complex.mdcrd"),
            radii: None,
            output: PathBuf::from(format!("{name}.out")),
            receptor_start: vec![0],
            ligand_start: vec![3200],
            md: None,
            energy: None,
        }
    }

    #[test]
    fn molecule_next_follows_fixed_partition_order() {
        assert_eq!(Molecule::Complex.next(), Molecule::Receptor);
        assert_eq!(Molecule::Receptor.next(), Molecule::Ligand);
        assert_eq!(Molecule::Ligand.next(), Molecule::EndOfMolecules);
        assert_eq!(Molecule::EndOfMolecules.next(), Molecule::EndOfMolecules);
    }

    #[test]
    fn stage_plan_first_stage_matches_configuration() {
        assert_eq!(StagePlan::MdThenEnergy.first_stage(), Stage::Md);
        assert_eq!(StagePlan::MdOnly.first_stage(), Stage::Md);
        assert_eq!(StagePlan::EnergyOnly.first_stage(), Stage::Energy);
    }

    #[test]
    fn stage_plan_next_stage_only_chains_md_into_energy() {
        assert_eq!(StagePlan::MdThenEnergy.next_stage(Stage::Md), Some(Stage::Energy));
        assert_eq!(StagePlan::MdThenEnergy.next_stage(Stage::Energy), None);
        assert_eq!(StagePlan::MdOnly.next_stage(Stage::Md), None);
        assert_eq!(StagePlan::EnergyOnly.next_stage(Stage::Energy), None);
    }

    #[test]
    fn new_job_starts_at_complex_with_plan_first_stage() {
        let job = Job::new(sample_inputs("a"), StagePlan::EnergyOnly, 2, 1.5);
        assert_eq!(job.cursor.molecule, Molecule::Complex);
        assert_eq!(job.cursor.stage, Stage::Energy);
        assert_eq!(job.cursor.snapshot_index, 0);
        assert_eq!(job.place_in_queue, 2);
        assert_eq!(job.fraction_done, 0.0);
        assert!(!job.is_complete());
    }

    #[test]
    fn resume_from_keeps_definition_but_takes_progress() {
        let mut fresh = Job::new(sample_inputs("a"), StagePlan::MdThenEnergy, 0, 1.0);
        let mut saved = fresh.clone().with_snapshots(vec![0, 1, 2]);
        saved.cursor.snapshot_index = 2;
        saved.cursor.molecule = Molecule::Receptor;
        saved.fraction_done = 0.75;
        saved.checkpoint_counter = 9;
        saved.inputs.name = "renamed".to_string();

        fresh.resume_from(saved);

        assert_eq!(fresh.name(), "a");
        assert_eq!(fresh.snapshots, vec![0, 1, 2]);
        assert_eq!(fresh.cursor.snapshot_index, 2);
        assert_eq!(fresh.cursor.molecule, Molecule::Receptor);
        assert_eq!(fresh.fraction_done, 0.75);
        assert_eq!(fresh.checkpoint_counter, 9);
    }

    #[test]
    fn md_settings_resolve_relative_paths_against_working_dir() {
        let mut md = MdSettings {
            program: PathBuf::from("bin/pmemd"),
            args: Vec::new(),
            inputs: Vec::new(),
            output: "{job}.mdout".to_string(),
            convergence_marker: None,
            working_dir: None,
        };
        assert_eq!(md.program_path(), PathBuf::from("bin/pmemd"));
        assert_eq!(md.resolve(PathBuf::from("a.mdin")), PathBuf::from("a.mdin"));

        md.working_dir = Some(PathBuf::from("/runs/q1"));
        assert_eq!(md.program_path(), PathBuf::from("/runs/q1/bin/pmemd"));
        assert_eq!(md.resolve(PathBuf::from("a.mdin")), PathBuf::from("/runs/q1/a.mdin"));
        assert_eq!(md.resolve(PathBuf::from("/abs/a.mdin")), PathBuf::from("/abs/a.mdin"));

        md.program = PathBuf::from("sander");
        assert_eq!(md.program_path(), PathBuf::from("sander"));
    }

    #[test]
    fn current_snapshot_is_none_past_the_end() {
        let mut job =
            Job::new(sample_inputs("a"), StagePlan::EnergyOnly, 0, 1.0).with_snapshots(vec![4, 8]);
        assert_eq!(job.current_snapshot(), Some(4));
        job.cursor.snapshot_index = 2;
        assert_eq!(job.current_snapshot(), None);
    }
}
