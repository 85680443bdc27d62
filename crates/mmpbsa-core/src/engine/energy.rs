//! The energy-extraction seam.
//!
//! The pipeline calls an [`EnergyCalculator`] once per (molecule, snapshot) in the
//! energy stage. [`CommandEnergyCalculator`] runs an external solver and reads its
//! energy block from standard output:
//!
//! ```text
//! BOND 12.5
//! ANGLE 30.1
//! ...
//! AREA 1204.7
//! ```
//!
//! A non-numeric `AREA` value means the surface calculation failed; the map is still
//! returned with `solver_failed` set.

use super::utils::template::TemplateVars;
use crate::core::models::energy::EnergyMap;
use crate::core::models::job::{EnergySettings, Job, Molecule};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, warn};

pub const MOLSURF_FAILED_MARKER: &str = "MOLSURF_FAILED";

#[derive(Debug, Error)]
pub enum EnergyError {
    #[error("No energy program is configured")]
    NotConfigured,
    #[error("Failed to start energy program '{path}': {source}", path = path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Energy program '{path}' exited with {status}: {stderr}", path = path.display())]
    Failed {
        path: PathBuf,
        status: String,
        stderr: String,
    },
    #[error("Energy output line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("Energy output contains no energy terms")]
    Empty,
}

/// Everything the solver needs for one partition of one snapshot.
#[derive(Debug, Clone, Copy)]
pub struct EnergyRequest<'a> {
    pub job: &'a Job,
    pub molecule: Molecule,
    pub snapshot: usize,
    /// Output of the MD stage that preceded this one, if any.
    pub md_output: Option<&'a Path>,
}

pub trait EnergyCalculator {
    fn compute(&self, request: &EnergyRequest<'_>) -> Result<EnergyMap, EnergyError>;
}

/// Runs an external energy program. Per-job settings win over the default.
#[derive(Debug, Clone, Default)]
pub struct CommandEnergyCalculator {
    default_settings: Option<EnergySettings>,
}

impl CommandEnergyCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_settings(settings: EnergySettings) -> Self {
        Self {
            default_settings: Some(settings),
        }
    }

    fn settings_for<'s>(&'s self, job: &'s Job) -> Option<&'s EnergySettings> {
        job.inputs.energy.as_ref().or(self.default_settings.as_ref())
    }
}

impl EnergyCalculator for CommandEnergyCalculator {
    fn compute(&self, request: &EnergyRequest<'_>) -> Result<EnergyMap, EnergyError> {
        let settings = self
            .settings_for(request.job)
            .ok_or(EnergyError::NotConfigured)?;
        let md_output = request
            .md_output
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let vars = TemplateVars::for_unit(request.job, request.molecule, request.snapshot)
            .with("md_output", md_output)
            .with("trust_prmtop", request.job.trust_prmtop.to_string());
        let args: Vec<String> = settings.args.iter().map(|arg| vars.expand(arg)).collect();

        debug!(
            program = %settings.program.display(),
            molecule = %request.molecule,
            snapshot = request.snapshot,
            "Running energy program."
        );
        let output = Command::new(&settings.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| EnergyError::Launch {
                path: settings.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let status = match output.status.code() {
                Some(code) => format!("code {code}"),
                None => "a signal".to_string(),
            };
            return Err(EnergyError::Failed {
                path: settings.program.clone(),
                status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_energy_block(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Reads `TAG value` lines into an [`EnergyMap`]. Unknown tags are skipped with a
/// warning; blank lines are ignored.
pub fn parse_energy_block(text: &str) -> Result<EnergyMap, EnergyError> {
    let mut map = EnergyMap::default();
    let mut terms = 0;

    for (idx, line) in text.lines().enumerate() {
        let line_num = idx + 1;
        let mut fields = line.split_whitespace();
        let Some(tag) = fields.next() else {
            continue;
        };
        let raw = fields.next().unwrap_or("");

        let slot = match tag {
            "BOND" => &mut map.bond,
            "ANGLE" => &mut map.angle,
            "DIHED" => &mut map.dihed,
            "VDW14" => &mut map.vdw14,
            "ELE14" => &mut map.ele14,
            "VACELE" => &mut map.vacele,
            "VDWAALS" => &mut map.vdwaals,
            "PBSOL" => &mut map.elstat_solv,
            "SASOL" => &mut map.sasol,
            "AREA" => {
                match raw.parse::<f64>() {
                    Ok(value) => map.area = value,
                    Err(_) => {
                        if raw != MOLSURF_FAILED_MARKER {
                            warn!(line = line_num, "Unreadable AREA value '{}'.", raw);
                        }
                        map.solver_failed = true;
                    }
                }
                terms += 1;
                continue;
            }
            other => {
                warn!(line = line_num, "Ignoring unknown energy term '{}'.", other);
                continue;
            }
        };

        *slot = raw.parse::<f64>().map_err(|_| EnergyError::Parse {
            line: line_num,
            reason: format!("'{tag}' has non-numeric value '{raw}'"),
        })?;
        terms += 1;
    }

    if terms == 0 {
        return Err(EnergyError::Empty);
    }
    Ok(map)
}
