use crate::core::models::job::{Job, Molecule};
use std::path::PathBuf;

/// Placeholder values for expanding `{name}` templates in program arguments and paths.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    pairs: Vec<(&'static str, String)>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values describing one (job, molecule, snapshot) unit.
    pub fn for_unit(job: &Job, molecule: Molecule, snapshot: usize) -> Self {
        let inputs = &job.inputs;
        let radii = inputs
            .radii
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        Self::new()
            .with("job", inputs.name.clone())
            .with("molecule", molecule.as_str())
            .with("snapshot", snapshot.to_string())
            .with("prmtop", inputs.prmtop.display().to_string())
            .with("trajectory", inputs.trajectory.display().to_string())
            .with("radii", radii)
            .with("atoms", atom_list(job, molecule))
    }

    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.pairs.push((key, value)),
        }
        self
    }

    pub fn expand(&self, template: &str) -> String {
        self.pairs
            .iter()
            .fold(template.to_string(), |acc, (key, value)| {
                acc.replace(&format!("{{{key}}}"), value)
            })
    }

    pub fn expand_path(&self, template: &str) -> PathBuf {
        PathBuf::from(self.expand(template))
    }
}

/// Comma-separated start positions of the segments making up `molecule`.
fn atom_list(job: &Job, molecule: Molecule) -> String {
    let inputs = &job.inputs;
    let mut starts: Vec<usize> = match molecule {
        Molecule::Receptor => inputs.receptor_start.clone(),
        Molecule::Ligand => inputs.ligand_start.clone(),
        Molecule::Complex => inputs
            .receptor_start
            .iter()
            .chain(&inputs.ligand_start)
            .copied()
            .collect(),
        Molecule::EndOfMolecules => Vec::new(),
    };
    starts.sort_unstable();
    starts.dedup();
    starts
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Expanded MD output path for a unit, if the job runs MD at all.
pub fn md_output_path(job: &Job, molecule: Molecule, snapshot: usize) -> Option<PathBuf> {
    let md = job.inputs.md.as_ref()?;
    Some(md.resolve(TemplateVars::for_unit(job, molecule, snapshot).expand_path(&md.output)))
}
