//! Aromaticity perception for rings written in Kekulé form.
//!
//! A smallest ring is aromatic when every member contributes to the pi
//! system and the electron count is 4n + 2. Fused rings are resolved in
//! rounds: a ring double bond to an atom already found aromatic counts for
//! the ring under test, so `C1=CC=C2C=CC=CC2=C1` becomes naphthalene.
//! Rings holding an atom that was written aromatic are left as written.

use std::collections::BTreeSet;

use super::molecule::{Atom, Bond, BondOrder, Molecule};

/// Mark the Kekulé aromatic rings of `molecule` aromatic.
///
/// Hydrogen counts are kept. Ring bonds of aromatic rings become
/// [`BondOrder::Aromatic`]; exocyclic bonds keep their order.
pub(crate) fn perceive(molecule: Molecule) -> Molecule {
    let rings = molecule.rings();
    let mut aromatic: Vec<bool> = molecule.atoms().iter().map(|a| a.aromatic).collect();
    let mut pending: Vec<usize> = (0..rings.len())
        .filter(|&index| rings[index].iter().all(|&atom| !aromatic[atom]))
        .collect();
    let mut found: Vec<usize> = Vec::new();

    loop {
        let before = found.len();
        pending.retain(|&index| {
            if !ring_is_aromatic(&molecule, &rings[index], &aromatic) {
                return true;
            }
            for &atom in &rings[index] {
                aromatic[atom] = true;
            }
            found.push(index);
            false
        });
        if found.len() == before {
            break;
        }
    }
    if found.is_empty() {
        return molecule;
    }

    let mut aromatic_bond = vec![false; molecule.bonds().len()];
    for &index in &found {
        let ring = &rings[index];
        for (position, &atom) in ring.iter().enumerate() {
            let next = ring[(position + 1) % ring.len()];
            if let Some(bond) = molecule.bond_between(atom, next) {
                aromatic_bond[bond] = true;
            }
        }
    }

    let atoms: Vec<Atom> = molecule
        .atoms()
        .iter()
        .zip(&aromatic)
        .map(|(atom, &flag)| Atom {
            aromatic: flag,
            ..atom.clone()
        })
        .collect();
    let bonds: Vec<Bond> = molecule
        .bonds()
        .iter()
        .zip(&aromatic_bond)
        .map(|(bond, &in_ring)| Bond {
            order: if in_ring { BondOrder::Aromatic } else { bond.order },
            ..*bond
        })
        .collect();
    Molecule::new(atoms, bonds)
}

fn ring_is_aromatic(molecule: &Molecule, ring: &[usize], aromatic: &[bool]) -> bool {
    let members: BTreeSet<usize> = ring.iter().copied().collect();
    let mut electrons = 0u32;
    for &atom in ring {
        match pi_electrons(molecule, atom, &members, aromatic) {
            Some(count) => electrons += u32::from(count),
            None => return false,
        }
    }
    electrons % 4 == 2
}

/// Electrons an atom donates to the ring `members`, or `None` when the atom
/// breaks conjugation.
fn pi_electrons(
    molecule: &Molecule,
    atom: usize,
    members: &BTreeSet<usize>,
    aromatic: &[bool],
) -> Option<u8> {
    let current = molecule.atom(atom);
    let mut ring_double = 0;
    let mut exocyclic_double = false;
    for &(next, bond) in molecule.neighbors(atom) {
        match molecule.bond(bond).order {
            BondOrder::Single => {}
            BondOrder::Double
                if members.contains(&next)
                    || (aromatic[next] && molecule.is_ring_bond(bond)) =>
            {
                ring_double += 1;
            }
            // C=O, C=N and C=S outside the ring leave the carbon empty.
            BondOrder::Double
                if current.element.atomic_number == 6
                    && !molecule.is_ring_bond(bond)
                    && matches!(molecule.atom(next).element.atomic_number, 7 | 8 | 16) =>
            {
                exocyclic_double = true;
            }
            _ => return None,
        }
    }

    let connections = molecule.neighbors(atom).len() + usize::from(current.hydrogens);
    match (ring_double, exocyclic_double) {
        (1, false) => match (current.element.atomic_number, current.charge) {
            (6, 0) => Some(1),
            (7 | 15, 0) if connections == 2 => Some(1),
            (7 | 15, 1) if connections == 3 => Some(1),
            (8 | 16 | 34, 1) if connections == 2 => Some(1),
            _ => None,
        },
        (0, true) => Some(0),
        (0, false) => match (current.element.atomic_number, current.charge) {
            (7 | 15, 0) if connections == 3 => Some(2),
            (8 | 16 | 34, 0) if connections == 2 => Some(2),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::smiles::parse_smiles;
    use pretty_assertions::assert_eq;

    fn aromatic_atoms(smiles: &str) -> usize {
        parse_smiles(smiles)
            .unwrap()
            .atoms()
            .iter()
            .filter(|a| a.aromatic)
            .count()
    }

    // ============================================================================
    // Single rings
    // ============================================================================

    #[test]
    fn test_kekule_benzene_becomes_aromatic() {
        let molecule = parse_smiles("C1=CC=CC=C1").unwrap();
        assert!(molecule.atoms().iter().all(|a| a.aromatic && a.hydrogens == 1));
        assert!(molecule.bonds().iter().all(|b| b.order == BondOrder::Aromatic));
    }

    #[test]
    fn test_heteroaromatic_rings() {
        assert_eq!(aromatic_atoms("C1=CC=NC=C1"), 6);
        assert_eq!(aromatic_atoms("C1=CNC=C1"), 5);
        assert_eq!(aromatic_atoms("C1=CSC=C1"), 5);
        assert_eq!(aromatic_atoms("C1=COC=C1"), 5);
        assert_eq!(aromatic_atoms("O=C1C=CC=CN1"), 6);
    }

    #[test]
    fn test_non_aromatic_rings_untouched() {
        assert_eq!(aromatic_atoms("C1=CC=C1"), 0);
        assert_eq!(aromatic_atoms("C1=CC=CC1"), 0);
        assert_eq!(aromatic_atoms("C1=CC=CC=CC=C1"), 0);
        assert_eq!(aromatic_atoms("C1CCCCC1"), 0);
        assert_eq!(aromatic_atoms("C1=CCCCC1"), 0);
    }

    #[test]
    fn test_exocyclic_bonds_keep_order() {
        let molecule = parse_smiles("CC1=CC=CC=C1O").unwrap();
        let non_ring: Vec<BondOrder> = molecule
            .bonds()
            .iter()
            .enumerate()
            .filter(|(index, _)| !molecule.is_ring_bond(*index))
            .map(|(_, bond)| bond.order)
            .collect();
        assert_eq!(non_ring, vec![BondOrder::Single, BondOrder::Single]);
        assert_eq!(aromatic_atoms("CC1=CC=CC=C1O"), 6);
    }

    // ============================================================================
    // Fused rings
    // ============================================================================

    #[test]
    fn test_fused_rings_resolved_in_rounds() {
        assert_eq!(aromatic_atoms("C1=CC=C2C=CC=CC2=C1"), 10);
        assert_eq!(aromatic_atoms("C1=CC=C2CCCC2=C1"), 6);
    }

    #[test]
    fn test_caffeine_both_rings() {
        assert_eq!(aromatic_atoms("CN1C=NC2=C1C(=O)N(C(=O)N2C)C"), 9);
    }

    #[test]
    fn test_written_aromatic_ring_left_alone() {
        let molecule = parse_smiles("c1ccccc1").unwrap();
        assert_eq!(perceive(molecule.clone()).atoms(), molecule.atoms());
    }
}
