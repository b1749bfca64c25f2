//! Scalar molecular descriptors.
//!
//! Masses use standard atomic weights (average) or most-abundant isotope masses
//! (exact). LogP sums Crippen-style atom contributions and TPSA sums Ertl's
//! nitrogen and oxygen contributions; both use reduced atom typings and are
//! close to, not identical with, the full published tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::elements;
use super::molecule::{BondOrder, Molecule};

/// Which descriptor to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    MolecularWeight,
    ExactMolecularWeight,
    LogP,
    TopologicalPolarSurfaceArea,
    HBondDonors,
    HBondAcceptors,
    RotatableBonds,
    RingCount,
    HeavyAtomCount,
}

impl DescriptorKind {
    pub const ALL: [DescriptorKind; 9] = [
        DescriptorKind::MolecularWeight,
        DescriptorKind::ExactMolecularWeight,
        DescriptorKind::LogP,
        DescriptorKind::TopologicalPolarSurfaceArea,
        DescriptorKind::HBondDonors,
        DescriptorKind::HBondAcceptors,
        DescriptorKind::RotatableBonds,
        DescriptorKind::RingCount,
        DescriptorKind::HeavyAtomCount,
    ];

    /// Suffix used for derived column names, e.g. `smiles_MW`.
    pub fn short_name(&self) -> &'static str {
        match self {
            DescriptorKind::MolecularWeight => "MW",
            DescriptorKind::ExactMolecularWeight => "ExactMW",
            DescriptorKind::LogP => "LogP",
            DescriptorKind::TopologicalPolarSurfaceArea => "TPSA",
            DescriptorKind::HBondDonors => "HBD",
            DescriptorKind::HBondAcceptors => "HBA",
            DescriptorKind::RotatableBonds => "RotB",
            DescriptorKind::RingCount => "Rings",
            DescriptorKind::HeavyAtomCount => "HeavyAtoms",
        }
    }

    pub fn compute(&self, molecule: &Molecule) -> f64 {
        match self {
            DescriptorKind::MolecularWeight => molecular_weight(molecule),
            DescriptorKind::ExactMolecularWeight => exact_molecular_weight(molecule),
            DescriptorKind::LogP => crippen_log_p(molecule),
            DescriptorKind::TopologicalPolarSurfaceArea => tpsa(molecule),
            DescriptorKind::HBondDonors => h_bond_donors(molecule) as f64,
            DescriptorKind::HBondAcceptors => h_bond_acceptors(molecule) as f64,
            DescriptorKind::RotatableBonds => rotatable_bonds(molecule) as f64,
            DescriptorKind::RingCount => molecule.ring_count() as f64,
            DescriptorKind::HeavyAtomCount => molecule.heavy_atom_count() as f64,
        }
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for DescriptorKind {
    type Err = String;

    /// Accepts short names case-insensitively (`mw`, `tpsa`, `logp`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DescriptorKind::ALL
            .into_iter()
            .find(|kind| kind.short_name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown descriptor '{s}'"))
    }
}

pub fn molecular_weight(molecule: &Molecule) -> f64 {
    let hydrogen = elements::hydrogen().average_mass;
    molecule
        .atoms()
        .iter()
        .map(|a| a.element.average_mass + f64::from(a.hydrogens) * hydrogen)
        .sum()
}

pub fn exact_molecular_weight(molecule: &Molecule) -> f64 {
    let hydrogen = elements::hydrogen().monoisotopic_mass;
    molecule
        .atoms()
        .iter()
        .map(|a| {
            let heavy = match a.isotope {
                Some(mass_number) => f64::from(mass_number),
                None => a.element.monoisotopic_mass,
            };
            heavy + f64::from(a.hydrogens) * hydrogen
        })
        .sum()
}

fn is_n_or_o(molecule: &Molecule, atom: usize) -> bool {
    matches!(molecule.atom(atom).element.atomic_number, 7 | 8)
}

/// N, O and S atoms carrying at least one hydrogen.
pub fn h_bond_donors(molecule: &Molecule) -> usize {
    (0..molecule.atom_count())
        .filter(|&atom| {
            let a = molecule.atom(atom);
            matches!(a.element.atomic_number, 7 | 8 | 16)
                && a.charge >= 0
                && molecule.hydrogen_count(atom) > 0
        })
        .count()
}

/// N and O atoms with a free lone pair: not positively charged, not a
/// pyrrole-type aromatic nitrogen and not an amide nitrogen.
pub fn h_bond_acceptors(molecule: &Molecule) -> usize {
    (0..molecule.atom_count())
        .filter(|&atom| {
            let a = molecule.atom(atom);
            if !is_n_or_o(molecule, atom) || a.charge > 0 {
                return false;
            }
            if a.element.atomic_number == 8 {
                return true;
            }
            if a.aromatic {
                return molecule.neighbors(atom).len() + molecule.hydrogen_count(atom) == 2;
            }
            !is_amide_nitrogen(molecule, atom)
        })
        .count()
}

fn is_amide_nitrogen(molecule: &Molecule, atom: usize) -> bool {
    molecule.neighbors(atom).iter().any(|&(carbon, bond)| {
        molecule.bond(bond).order == BondOrder::Single
            && molecule.atom(carbon).element.is_carbon()
            && molecule.neighbors(carbon).iter().any(|&(other, b)| {
                molecule.bond(b).order == BondOrder::Double
                    && matches!(molecule.atom(other).element.atomic_number, 8 | 16)
            })
    })
}

/// Non-ring single bonds between two non-terminal heavy atoms, excluding
/// bonds next to a triple bond.
pub fn rotatable_bonds(molecule: &Molecule) -> usize {
    let has_triple = |atom: usize| {
        molecule
            .neighbors(atom)
            .iter()
            .any(|(_, b)| molecule.bond(*b).order == BondOrder::Triple)
    };
    molecule
        .bonds()
        .iter()
        .enumerate()
        .filter(|(index, bond)| {
            bond.order == BondOrder::Single
                && !molecule.is_ring_bond(*index)
                && !molecule.atom(bond.begin).element.is_hydrogen()
                && !molecule.atom(bond.end).element.is_hydrogen()
                && molecule.heavy_degree(bond.begin) > 1
                && molecule.heavy_degree(bond.end) > 1
                && !has_triple(bond.begin)
                && !has_triple(bond.end)
        })
        .count()
}

// =============================================================================
// LogP
// =============================================================================

fn crippen_log_p(molecule: &Molecule) -> f64 {
    (0..molecule.atom_count())
        .map(|atom| heavy_contribution(molecule, atom) + hydrogen_contribution(molecule, atom))
        .sum()
}

fn heavy_contribution(molecule: &Molecule, atom: usize) -> f64 {
    let a = molecule.atom(atom);
    let neighbors = molecule.neighbors(atom);
    let hetero_neighbor = neighbors
        .iter()
        .any(|(n, _)| molecule.atom(*n).element.is_hetero());
    let double_to = |pred: &dyn Fn(usize) -> bool| {
        neighbors
            .iter()
            .any(|(n, b)| molecule.bond(*b).order == BondOrder::Double && pred(*n))
    };
    let triple = neighbors
        .iter()
        .any(|(_, b)| molecule.bond(*b).order == BondOrder::Triple);
    let heavy_degree = molecule.heavy_degree(atom);

    match a.element.atomic_number {
        1 => 0.0,
        6 if a.aromatic => {
            let aromatic_bonds = neighbors
                .iter()
                .filter(|(_, b)| molecule.bond(*b).order == BondOrder::Aromatic)
                .count();
            if aromatic_bonds >= 3 {
                0.2955
            } else if molecule.hydrogen_count(atom) > 0 {
                0.1581
            } else if hetero_neighbor {
                -0.0516
            } else {
                0.1360
            }
        }
        6 => {
            if double_to(&|n| molecule.atom(n).element.is_hetero()) {
                -0.2783
            } else if double_to(&|n| molecule.atom(n).element.is_carbon()) {
                0.1551
            } else if triple {
                0.0017
            } else if hetero_neighbor {
                if heavy_degree <= 2 { -0.2035 } else { -0.2051 }
            } else if heavy_degree <= 2 {
                0.1441
            } else {
                0.0
            }
        }
        7 => {
            if a.charge > 0 {
                -0.3396
            } else if a.aromatic {
                -0.4806
            } else if triple {
                -0.2914
            } else if neighbors
                .iter()
                .any(|(_, b)| molecule.bond(*b).order == BondOrder::Double)
            {
                -0.3239
            } else {
                match molecule.hydrogen_count(atom) {
                    2.. => -1.0190,
                    1 => -0.7096,
                    _ => -0.3187,
                }
            }
        }
        8 => {
            if a.charge < 0 {
                -1.3260
            } else if a.aromatic {
                0.1552
            } else if neighbors
                .iter()
                .any(|(_, b)| molecule.bond(*b).order == BondOrder::Double)
            {
                -0.1526
            } else if molecule.hydrogen_count(atom) > 0 {
                -0.2893
            } else {
                -0.0684
            }
        }
        9 => 0.4202,
        17 => 0.6895,
        35 => 0.8456,
        53 => 0.8857,
        15 => 0.8612,
        16 => {
            if a.aromatic {
                0.6237
            } else if neighbors
                .iter()
                .any(|(_, b)| molecule.bond(*b).order == BondOrder::Double)
            {
                -0.0024
            } else {
                0.6482
            }
        }
        _ => 0.0,
    }
}

fn hydrogen_contribution(molecule: &Molecule, atom: usize) -> f64 {
    let a = molecule.atom(atom);
    let per_hydrogen = match a.element.atomic_number {
        6 => 0.1230,
        7 => 0.2142,
        8 => -0.2677,
        _ => 0.1230,
    };
    f64::from(a.hydrogens) * per_hydrogen
}

// =============================================================================
// TPSA
// =============================================================================

#[derive(Default)]
struct BondCounts {
    single: usize,
    double: usize,
    triple: usize,
    aromatic: usize,
}

fn heavy_bond_counts(molecule: &Molecule, atom: usize) -> BondCounts {
    let mut counts = BondCounts::default();
    for &(next, bond) in molecule.neighbors(atom) {
        if molecule.atom(next).element.is_hydrogen() {
            continue;
        }
        match molecule.bond(bond).order {
            BondOrder::Single => counts.single += 1,
            BondOrder::Double => counts.double += 1,
            BondOrder::Triple | BondOrder::Quadruple => counts.triple += 1,
            BondOrder::Aromatic => counts.aromatic += 1,
        }
    }
    counts
}

fn tpsa(molecule: &Molecule) -> f64 {
    (0..molecule.atom_count())
        .map(|atom| match molecule.atom(atom).element.atomic_number {
            7 => nitrogen_psa(molecule, atom),
            8 => oxygen_psa(molecule, atom),
            _ => 0.0,
        })
        .sum()
}

fn nitrogen_psa(molecule: &Molecule, atom: usize) -> f64 {
    let a = molecule.atom(atom);
    let h = molecule.hydrogen_count(atom);
    let BondCounts {
        single,
        double,
        triple,
        aromatic,
    } = heavy_bond_counts(molecule, atom);

    let known = match (a.charge, h, single, double, triple, aromatic) {
        (0, 0, 3, 0, 0, 0) => Some(3.24),
        (0, 0, 1, 1, 0, 0) => Some(12.36),
        (0, 0, 0, 0, 1, 0) => Some(23.79),
        (0, 0, 1, 2, 0, 0) => Some(11.68),
        (0, 0, 0, 1, 1, 0) => Some(13.60),
        (0, 1, 2, 0, 0, 0) => Some(12.03),
        (0, 1, 0, 1, 0, 0) => Some(23.85),
        (0, 2, 1, 0, 0, 0) => Some(26.02),
        (0, 3, 0, 0, 0, 0) => Some(26.02),
        (1, 0, 4, 0, 0, 0) => Some(0.0),
        (1, 0, 2, 1, 0, 0) => Some(3.01),
        (1, 0, 1, 0, 1, 0) => Some(4.36),
        (1, 0, 0, 1, 1, 0) => Some(4.36),
        (1, 1, 3, 0, 0, 0) => Some(4.44),
        (1, 1, 1, 1, 0, 0) => Some(13.97),
        (1, 2, 2, 0, 0, 0) => Some(16.61),
        (1, 2, 0, 1, 0, 0) => Some(25.59),
        (1, 3, 1, 0, 0, 0) => Some(27.64),
        (0, 0, 0, 0, 0, 2) => Some(12.89),
        (0, 0, 0, 0, 0, 3) => Some(4.41),
        (0, 0, 1, 0, 0, 2) => Some(4.93),
        (0, 0, 0, 1, 0, 2) => Some(8.39),
        (0, 1, 0, 0, 0, 2) => Some(15.79),
        (1, 0, 0, 0, 0, 3) => Some(4.10),
        (1, 0, 1, 0, 0, 2) => Some(3.88),
        (1, 1, 0, 0, 0, 2) => Some(14.14),
        _ => None,
    };
    known.unwrap_or_else(|| {
        let degree = single + double + triple + aromatic;
        (30.5 - 8.2 * degree as f64 + 1.5 * h as f64).max(0.0)
    })
}

fn oxygen_psa(molecule: &Molecule, atom: usize) -> f64 {
    let a = molecule.atom(atom);
    let h = molecule.hydrogen_count(atom);
    let BondCounts {
        single,
        double,
        triple,
        aromatic,
    } = heavy_bond_counts(molecule, atom);

    let known = match (a.charge, h, single, double, triple, aromatic) {
        (0, 0, 2, 0, 0, 0) => Some(9.23),
        (0, 0, 0, 1, 0, 0) => Some(17.07),
        (0, 1, 1, 0, 0, 0) => Some(20.23),
        (0, 2, 0, 0, 0, 0) => Some(20.23),
        (-1, 0, 1, 0, 0, 0) => Some(23.06),
        (0, 0, 0, 0, 0, 2) => Some(13.14),
        _ => None,
    };
    known.unwrap_or_else(|| {
        let degree = single + double + triple + aromatic;
        (28.5 - 8.6 * degree as f64 + 1.5 * h as f64).max(0.0)
    })
}
