//! The stage state machine.
//!
//! A job's cursor walks snapshots in list order; within a snapshot the partitions
//! complex, receptor and ligand in that order; within a partition the stages its
//! plan defines. After the ligand's last stage the cursor parks on
//! `EndOfMolecules` until the snapshot is committed, then moves to the next
//! snapshot. Every change goes through [`advance`].

use super::error::EngineError;
use crate::core::models::job::{Job, Molecule, Stage, StagePlan};

/// One stage for one partition of one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkUnit {
    pub snapshot_index: usize,
    /// Trajectory frame index.
    pub snapshot: usize,
    pub molecule: Molecule,
    pub stage: Stage,
}

/// What the cursor says should happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// The snapshot list is empty and has not been resolved from the trajectory.
    Unresolved,
    Ready(WorkUnit),
    /// All partitions of the snapshot are done and it awaits commit.
    SnapshotDone { snapshot_index: usize, snapshot: usize },
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    SnapshotsResolved(Vec<usize>),
    UnitCompleted(WorkUnit),
    SnapshotCommitted,
}

/// The position that follows finishing `stage` of `molecule`.
pub fn next_position(plan: StagePlan, molecule: Molecule, stage: Stage) -> (Molecule, Stage) {
    match plan.next_stage(stage) {
        Some(next) if molecule != Molecule::EndOfMolecules => (molecule, next),
        _ => (molecule.next(), plan.first_stage()),
    }
}

pub fn state_of(job: &Job) -> PipelineState {
    let cursor = job.cursor;
    if job.is_complete() {
        return PipelineState::Complete;
    }
    let Some(snapshot) = job.current_snapshot() else {
        return PipelineState::Unresolved;
    };
    match cursor.molecule {
        Molecule::EndOfMolecules => PipelineState::SnapshotDone {
            snapshot_index: cursor.snapshot_index,
            snapshot,
        },
        molecule => PipelineState::Ready(WorkUnit {
            snapshot_index: cursor.snapshot_index,
            snapshot,
            molecule,
            stage: cursor.stage,
        }),
    }
}

/// Applies `transition` to the job's cursor and refreshes its fraction done.
///
/// A transition that does not match the current state is an internal error and
/// leaves the job untouched.
pub fn advance(job: &mut Job, transition: Transition) -> Result<PipelineState, EngineError> {
    let state = state_of(job);
    match (state, transition) {
        (PipelineState::Unresolved, Transition::SnapshotsResolved(snapshots)) => {
            job.snapshots = snapshots;
            job.cursor.snapshot_index = 0;
            job.cursor.stage = job.plan.first_stage();
            job.cursor.molecule = if job.snapshots.is_empty() {
                Molecule::EndOfMolecules
            } else {
                Molecule::Complex
            };
        }
        (PipelineState::Ready(current), Transition::UnitCompleted(unit)) if current == unit => {
            let (molecule, stage) = next_position(job.plan, unit.molecule, unit.stage);
            job.cursor.molecule = molecule;
            job.cursor.stage = stage;
        }
        (PipelineState::SnapshotDone { .. }, Transition::SnapshotCommitted) => {
            job.cursor.snapshot_index += 1;
            job.cursor.stage = job.plan.first_stage();
            if job.cursor.snapshot_index < job.snapshots.len() {
                job.cursor.molecule = Molecule::Complex;
            }
            job.pending.clear();
        }
        (state, transition) => {
            return Err(EngineError::Internal(format!(
                "job '{}': cannot apply {:?} in state {:?}",
                job.name(),
                transition,
                state
            )));
        }
    }

    refresh_fraction_done(job);
    Ok(state_of(job))
}

pub fn units_per_snapshot(plan: StagePlan) -> usize {
    Molecule::PARTITIONS.len() * plan.stages_per_molecule()
}

/// Units finished so far according to the cursor.
pub fn units_done(job: &Job) -> usize {
    let per_snapshot = units_per_snapshot(job.plan);
    let cursor = job.cursor;
    let completed_snapshots = cursor.snapshot_index.min(job.snapshots.len());
    let within = match cursor.molecule {
        Molecule::EndOfMolecules if cursor.snapshot_index < job.snapshots.len() => per_snapshot,
        Molecule::EndOfMolecules => 0,
        molecule => {
            molecule.ordinal() * job.plan.stages_per_molecule()
                + job.plan.stage_offset(cursor.stage)
        }
    };
    completed_snapshots * per_snapshot + within
}

pub fn units_total(job: &Job) -> usize {
    job.snapshots.len() * units_per_snapshot(job.plan)
}

/// Fraction done implied by the cursor alone.
pub fn cursor_fraction(job: &Job) -> f64 {
    let total = units_total(job);
    if total == 0 {
        return if job.is_complete() { 1.0 } else { 0.0 };
    }
    (units_done(job) as f64 / total as f64).clamp(0.0, 1.0)
}

/// Never lowers the stored value, so a restored job keeps the fraction it saved.
fn refresh_fraction_done(job: &mut Job) {
    job.fraction_done = job.fraction_done.max(cursor_fraction(job)).clamp(0.0, 1.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::energy::EnergyMap;
    use crate::core::models::job::tests::sample_inputs;

    fn job(plan: StagePlan, snapshots: Vec<usize>) -> Job {
        Job::new(sample_inputs("a"), plan, 0, 1.0).with_snapshots(snapshots)
    }

    /// Drives a job to completion, returning every unit in the order it ran.
    fn drive(job: &mut Job) -> Vec<WorkUnit> {
        let mut visited = Vec::new();
        let mut last_fraction = job.fraction_done;
        loop {
            let transition = match state_of(job) {
                PipelineState::Ready(unit) => {
                    visited.push(unit);
                    Transition::UnitCompleted(unit)
                }
                PipelineState::SnapshotDone { .. } => Transition::SnapshotCommitted,
                PipelineState::Complete => break,
                PipelineState::Unresolved => panic!("test jobs have explicit snapshots"),
            };
            advance(job, transition).unwrap();
            assert!(job.fraction_done >= last_fraction);
            last_fraction = job.fraction_done;
        }
        visited
    }

    fn expected_order(plan: StagePlan, snapshots: &[usize]) -> Vec<WorkUnit> {
        let stages: Vec<Stage> = [Stage::Md, Stage::Energy]
            .into_iter()
            .filter(|s| plan.includes(*s))
            .collect();
        let mut out = Vec::new();
        for (snapshot_index, &snapshot) in snapshots.iter().enumerate() {
            for molecule in Molecule::PARTITIONS {
                for &stage in &stages {
                    out.push(WorkUnit {
                        snapshot_index,
                        snapshot,
                        molecule,
                        stage,
                    });
                }
            }
        }
        out
    }

    #[test]
    fn every_plan_visits_units_in_nested_order_exactly_once() {
        for plan in [StagePlan::MdThenEnergy, StagePlan::EnergyOnly, StagePlan::MdOnly] {
            for snapshots in [vec![0], vec![3, 7, 11], vec![0, 1, 2, 3, 4]] {
                let mut job = job(plan, snapshots.clone());
                let visited = drive(&mut job);
                assert_eq!(visited, expected_order(plan, &snapshots), "plan {plan:?}");
                assert!(job.is_complete());
                assert_eq!(job.fraction_done, 1.0);
            }
        }
    }

    #[test]
    fn next_position_chains_stages_then_partitions() {
        let plan = StagePlan::MdThenEnergy;
        assert_eq!(
            next_position(plan, Molecule::Complex, Stage::Md),
            (Molecule::Complex, Stage::Energy)
        );
        assert_eq!(
            next_position(plan, Molecule::Complex, Stage::Energy),
            (Molecule::Receptor, Stage::Md)
        );
        assert_eq!(
            next_position(plan, Molecule::Ligand, Stage::Energy),
            (Molecule::EndOfMolecules, Stage::Md)
        );
        assert_eq!(
            next_position(StagePlan::EnergyOnly, Molecule::Receptor, Stage::Energy),
            (Molecule::Ligand, Stage::Energy)
        );
    }

    #[test]
    fn ligand_completion_parks_on_end_of_molecules_until_commit() {
        let mut job = job(StagePlan::EnergyOnly, vec![5, 6]);
        job.cursor.molecule = Molecule::Ligand;
        let unit = WorkUnit {
            snapshot_index: 0,
            snapshot: 5,
            molecule: Molecule::Ligand,
            stage: Stage::Energy,
        };

        let state = advance(&mut job, Transition::UnitCompleted(unit)).unwrap();
        assert_eq!(
            state,
            PipelineState::SnapshotDone {
                snapshot_index: 0,
                snapshot: 5
            }
        );
        assert_eq!(job.cursor.snapshot_index, 0);
        assert_eq!(job.fraction_done, 0.5);
    }

    #[test]
    fn commit_moves_to_next_snapshot_and_clears_pending() {
        let mut job = job(StagePlan::EnergyOnly, vec![5, 6]);
        job.cursor.molecule = Molecule::EndOfMolecules;
        job.pending.insert(Molecule::Complex, EnergyMap::default());

        advance(&mut job, Transition::SnapshotCommitted).unwrap();

        assert_eq!(job.cursor.snapshot_index, 1);
        assert_eq!(job.cursor.molecule, Molecule::Complex);
        assert_eq!(job.cursor.stage, Stage::Energy);
        assert!(job.pending.complex.is_none());
    }

    #[test]
    fn committing_the_last_snapshot_reaches_the_terminal_state() {
        let mut job = job(StagePlan::MdOnly, vec![9]);
        job.cursor.molecule = Molecule::EndOfMolecules;

        let state = advance(&mut job, Transition::SnapshotCommitted).unwrap();

        assert_eq!(state, PipelineState::Complete);
        assert_eq!(job.cursor.snapshot_index, 1);
        assert_eq!(job.cursor.molecule, Molecule::EndOfMolecules);
        assert_eq!(job.fraction_done, 1.0);
    }

    #[test]
    fn resolving_snapshots_starts_at_first_complex_unit() {
        let mut job = job(StagePlan::MdThenEnergy, Vec::new());
        assert_eq!(state_of(&job), PipelineState::Unresolved);

        let state = advance(&mut job, Transition::SnapshotsResolved(vec![0, 1, 2])).unwrap();
        assert_eq!(
            state,
            PipelineState::Ready(WorkUnit {
                snapshot_index: 0,
                snapshot: 0,
                molecule: Molecule::Complex,
                stage: Stage::Md,
            })
        );
    }

    #[test]
    fn resolving_an_empty_trajectory_completes_the_job() {
        let mut job = job(StagePlan::EnergyOnly, Vec::new());
        let state = advance(&mut job, Transition::SnapshotsResolved(Vec::new())).unwrap();
        assert_eq!(state, PipelineState::Complete);
        assert_eq!(job.fraction_done, 1.0);
    }

    #[test]
    fn completing_a_unit_other_than_the_current_one_is_rejected() {
        let mut job = job(StagePlan::MdThenEnergy, vec![0, 1]);
        let before = job.clone();
        let wrong = WorkUnit {
            snapshot_index: 0,
            snapshot: 0,
            molecule: Molecule::Receptor,
            stage: Stage::Md,
        };

        let result = advance(&mut job, Transition::UnitCompleted(wrong));

        assert!(matches!(result, Err(EngineError::Internal(_))));
        assert_eq!(job, before);
    }

    #[test]
    fn commit_before_all_partitions_are_done_is_rejected() {
        let mut job = job(StagePlan::EnergyOnly, vec![0]);
        let result = advance(&mut job, Transition::SnapshotCommitted);
        assert!(matches!(result, Err(EngineError::Internal(_))));
    }

    #[test]
    fn restored_fraction_is_never_lowered_by_the_cursor() {
        let mut job = job(StagePlan::EnergyOnly, vec![0, 1, 2, 3]);
        job.fraction_done = 0.4;
        let unit = match state_of(&job) {
            PipelineState::Ready(unit) => unit,
            other => panic!("unexpected state {other:?}"),
        };

        advance(&mut job, Transition::UnitCompleted(unit)).unwrap();

        assert_eq!(job.fraction_done, 0.4);
    }

    #[test]
    fn cursor_fraction_counts_completed_units() {
        let mut job = job(StagePlan::MdThenEnergy, vec![0, 1]);
        job.cursor.snapshot_index = 1;
        job.cursor.molecule = Molecule::Receptor;
        job.cursor.stage = Stage::Energy;
        // 6 units for snapshot 0, then complex md+energy and receptor md.
        assert_eq!(units_done(&job), 9);
        assert_eq!(units_total(&job), 12);
        assert_eq!(cursor_fraction(&job), 0.75);
    }
}
