use super::job::Molecule;
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Sub};

/// Energy terms extracted for one molecule partition of one snapshot (kcal/mol).
///
/// `solver_failed` records that the surface-area/Poisson–Boltzmann solver did not
/// converge for this molecule. The remaining terms are still usable, so the flag
/// travels with the map into checkpoints and results instead of aborting the run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EnergyMap {
    pub bond: f64,
    pub angle: f64,
    pub dihed: f64,
    pub vdw14: f64,
    pub ele14: f64,
    pub vdwaals: f64,
    pub vacele: f64,
    pub elstat_solv: f64,
    pub area: f64,
    pub sasol: f64,
    #[serde(default)]
    pub solver_failed: bool,
}

impl EnergyMap {
    /// Sum of the molecular-mechanics and solvation terms. `area` is a surface,
    /// not an energy, and is excluded.
    #[inline]
    pub fn total(&self) -> f64 {
        self.bond
            + self.angle
            + self.dihed
            + self.vdw14
            + self.ele14
            + self.vdwaals
            + self.vacele
            + self.elstat_solv
            + self.sasol
    }
}

impl Add for EnergyMap {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            bond: self.bond + rhs.bond,
            angle: self.angle + rhs.angle,
            dihed: self.dihed + rhs.dihed,
            vdw14: self.vdw14 + rhs.vdw14,
            ele14: self.ele14 + rhs.ele14,
            vdwaals: self.vdwaals + rhs.vdwaals,
            vacele: self.vacele + rhs.vacele,
            elstat_solv: self.elstat_solv + rhs.elstat_solv,
            area: self.area + rhs.area,
            sasol: self.sasol + rhs.sasol,
            solver_failed: self.solver_failed || rhs.solver_failed,
        }
    }
}

impl AddAssign for EnergyMap {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for EnergyMap {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            bond: self.bond - rhs.bond,
            angle: self.angle - rhs.angle,
            dihed: self.dihed - rhs.dihed,
            vdw14: self.vdw14 - rhs.vdw14,
            ele14: self.ele14 - rhs.ele14,
            vdwaals: self.vdwaals - rhs.vdwaals,
            vacele: self.vacele - rhs.vacele,
            elstat_solv: self.elstat_solv - rhs.elstat_solv,
            area: self.area - rhs.area,
            sasol: self.sasol - rhs.sasol,
            solver_failed: self.solver_failed || rhs.solver_failed,
        }
    }
}

/// Energy maps collected so far for the snapshot under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SnapshotEnergies {
    pub complex: Option<EnergyMap>,
    pub receptor: Option<EnergyMap>,
    pub ligand: Option<EnergyMap>,
}

impl SnapshotEnergies {
    pub fn get(&self, molecule: Molecule) -> Option<&EnergyMap> {
        match molecule {
            Molecule::Complex => self.complex.as_ref(),
            Molecule::Receptor => self.receptor.as_ref(),
            Molecule::Ligand => self.ligand.as_ref(),
            Molecule::EndOfMolecules => None,
        }
    }

    /// Stores `energies` for `molecule`. The end-of-molecules sentinel has no slot
    /// and is ignored.
    pub fn insert(&mut self, molecule: Molecule, energies: EnergyMap) {
        match molecule {
            Molecule::Complex => self.complex = Some(energies),
            Molecule::Receptor => self.receptor = Some(energies),
            Molecule::Ligand => self.ligand = Some(energies),
            Molecule::EndOfMolecules => {}
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complex.is_some() && self.receptor.is_some() && self.ligand.is_some()
    }

    pub fn any_solver_failed(&self) -> bool {
        [self.complex, self.receptor, self.ligand]
            .iter()
            .flatten()
            .any(|map| map.solver_failed)
    }

    /// Binding energy `complex - receptor - ligand`, once all three are known.
    pub fn binding(&self) -> Option<EnergyMap> {
        Some(self.complex? - self.receptor? - self.ligand?)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
