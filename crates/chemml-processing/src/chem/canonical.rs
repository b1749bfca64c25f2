//! Canonical SMILES writer.
//!
//! Atoms are ranked by graph invariants (element, aromaticity, heavy degree,
//! hydrogens, charge, isotope, ring membership), the ranking is refined with
//! neighbor ranks until stable, and remaining ties are broken one atom at a
//! time. Each component is then written depth-first from its lowest-ranked
//! atom, visiting neighbors in rank order, and components are sorted.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::molecule::{BondOrder, Molecule, implicit_hydrogens};
use super::smiles::parse_smiles;
use crate::error::ParseError;

/// A canonical SMILES string together with the molecule it describes.
///
/// Only constructed from a successful parse, so the text always parses again.
#[derive(Debug, Clone)]
pub struct CanonicalSmiles {
    text: Arc<str>,
    molecule: Arc<Molecule>,
}

impl CanonicalSmiles {
    /// Parse `smiles` and produce its canonical form.
    pub fn parse(smiles: &str) -> Result<Self, ParseError> {
        let molecule = parse_smiles(smiles)?;
        Ok(Self::from_molecule(molecule))
    }

    pub fn from_molecule(molecule: Molecule) -> Self {
        let text = write_canonical(&molecule);
        Self {
            text: Arc::from(text),
            molecule: Arc::new(molecule),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn molecule(&self) -> &Molecule {
        &self.molecule
    }

    pub(crate) fn shared_text(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }
}

impl PartialEq for CanonicalSmiles {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for CanonicalSmiles {}

impl fmt::Display for CanonicalSmiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Canonical SMILES for a parsed molecule.
pub fn write_canonical(molecule: &Molecule) -> String {
    let ranks = canonical_ranks(molecule);
    let mut fragments: Vec<String> = molecule
        .components()
        .into_iter()
        .filter_map(|members| members.into_iter().min_by_key(|&atom| ranks[atom]))
        .map(|start| Writer::new(molecule, &ranks).write_component(start))
        .collect();
    fragments.sort();
    fragments.join(".")
}

// =============================================================================
// Ranking
// =============================================================================

fn atom_invariant(molecule: &Molecule, atom: usize) -> (u8, bool, usize, usize, i8, u16, bool) {
    let a = molecule.atom(atom);
    (
        a.element.atomic_number,
        a.aromatic,
        molecule.heavy_degree(atom),
        molecule.hydrogen_count(atom),
        a.charge,
        a.isotope.unwrap_or(0),
        molecule.is_ring_atom(atom),
    )
}

/// Dense ranks (0-based) of `keys`, equal keys sharing a rank.
fn dense_ranks<K: Ord>(keys: &[K]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..keys.len()).collect();
    order.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
    let mut ranks = vec![0; keys.len()];
    let mut rank = 0;
    for (position, &atom) in order.iter().enumerate() {
        if position > 0 && keys[order[position - 1]] != keys[atom] {
            rank += 1;
        }
        ranks[atom] = rank;
    }
    ranks
}

fn distinct(ranks: &[usize]) -> usize {
    let mut seen: Vec<usize> = ranks.to_vec();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

/// Split rank classes by the multiset of (neighbor rank, bond code) until the
/// number of classes stops growing.
fn refine(molecule: &Molecule, mut ranks: Vec<usize>) -> Vec<usize> {
    loop {
        let keys: Vec<(usize, Vec<(usize, u8)>)> = (0..molecule.atom_count())
            .map(|atom| {
                let mut around: Vec<(usize, u8)> = molecule
                    .neighbors(atom)
                    .iter()
                    .map(|&(next, bond)| (ranks[next], molecule.bond(bond).order.code()))
                    .collect();
                around.sort_unstable();
                (ranks[atom], around)
            })
            .collect();
        let refined = dense_ranks(&keys);
        if distinct(&refined) == distinct(&ranks) {
            return refined;
        }
        ranks = refined;
    }
}

/// Unique rank per atom.
pub(crate) fn canonical_ranks(molecule: &Molecule) -> Vec<usize> {
    let invariants: Vec<_> = (0..molecule.atom_count())
        .map(|atom| atom_invariant(molecule, atom))
        .collect();
    let mut ranks = refine(molecule, dense_ranks(&invariants));

    while distinct(&ranks) < ranks.len() {
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for &rank in &ranks {
            *counts.entry(rank).or_default() += 1;
        }
        let Some(tied) = counts.iter().find(|(_, count)| **count > 1).map(|(rank, _)| *rank) else {
            break;
        };
        let Some(chosen) = ranks.iter().position(|&rank| rank == tied) else {
            break;
        };
        let mut broken: Vec<usize> = ranks.iter().map(|rank| rank * 2 + 1).collect();
        broken[chosen] -= 1;
        ranks = refine(molecule, dense_ranks(&broken));
    }
    ranks
}

// =============================================================================
// Writing
// =============================================================================

struct Writer<'a> {
    molecule: &'a Molecule,
    ranks: &'a [usize],
    visited: Vec<bool>,
    children: Vec<Vec<(usize, usize)>>,
    closures: Vec<Vec<usize>>,
    closure_seen: Vec<bool>,
    open_digits: BTreeMap<usize, u16>,
    written: Vec<bool>,
    out: String,
}

impl<'a> Writer<'a> {
    fn new(molecule: &'a Molecule, ranks: &'a [usize]) -> Self {
        let atoms = molecule.atom_count();
        Self {
            molecule,
            ranks,
            visited: vec![false; atoms],
            children: vec![Vec::new(); atoms],
            closures: vec![Vec::new(); atoms],
            closure_seen: vec![false; molecule.bonds().len()],
            open_digits: BTreeMap::new(),
            written: vec![false; atoms],
            out: String::new(),
        }
    }

    fn write_component(mut self, start: usize) -> String {
        self.plan(start, None);
        self.emit(start);
        self.out
    }

    fn sorted_neighbors(&self, atom: usize) -> Vec<(usize, usize)> {
        let mut around = self.molecule.neighbors(atom).to_vec();
        around.sort_by_key(|&(next, _)| self.ranks[next]);
        around
    }

    /// Depth-first pass recording tree edges and ring-closure bonds.
    fn plan(&mut self, atom: usize, parent_bond: Option<usize>) {
        self.visited[atom] = true;
        for (next, bond) in self.sorted_neighbors(atom) {
            if Some(bond) == parent_bond {
                continue;
            }
            if self.visited[next] {
                if !self.closure_seen[bond] {
                    self.closure_seen[bond] = true;
                    self.closures[atom].push(bond);
                    self.closures[next].push(bond);
                }
            } else {
                self.children[atom].push((next, bond));
                self.plan(next, Some(bond));
            }
        }
    }

    fn emit(&mut self, atom: usize) {
        self.written[atom] = true;
        self.out.push_str(&atom_symbol(self.molecule, atom));

        let mut closing: Vec<(u16, usize)> = Vec::new();
        let mut opening: Vec<(usize, usize)> = Vec::new();
        for &bond in &self.closures[atom] {
            let partner = self.molecule.bond(bond).other(atom);
            if self.written[partner] {
                if let Some(&digit) = self.open_digits.get(&bond) {
                    closing.push((digit, bond));
                }
            } else {
                opening.push((self.ranks[partner], bond));
            }
        }
        closing.sort_unstable();
        opening.sort_unstable();

        for &(digit, bond) in &closing {
            self.open_digits.remove(&bond);
            push_ring_digit(&mut self.out, digit);
        }
        for &(_, bond) in &opening {
            let digit = self.lowest_free_digit(&closing);
            self.open_digits.insert(bond, digit);
            self.out.push_str(bond_symbol(self.molecule, bond));
            push_ring_digit(&mut self.out, digit);
        }

        let children = std::mem::take(&mut self.children[atom]);
        let last = children.len().saturating_sub(1);
        for (position, (child, bond)) in children.into_iter().enumerate() {
            let branch = position < last;
            if branch {
                self.out.push('(');
            }
            self.out.push_str(bond_symbol(self.molecule, bond));
            self.emit(child);
            if branch {
                self.out.push(')');
            }
        }
    }

    /// Lowest ring number not currently open and not just closed on this atom.
    fn lowest_free_digit(&self, just_closed: &[(u16, usize)]) -> u16 {
        (1..)
            .find(|digit| {
                !self.open_digits.values().any(|d| d == digit)
                    && !just_closed.iter().any(|(d, _)| d == digit)
            })
            .unwrap_or(1)
    }
}

fn push_ring_digit(out: &mut String, digit: u16) {
    if digit < 10 {
        out.push_str(&digit.to_string());
    } else {
        out.push_str(&format!("%{digit}"));
    }
}

fn bond_symbol(molecule: &Molecule, bond: usize) -> &'static str {
    let b = molecule.bond(bond);
    let both_aromatic = molecule.atom(b.begin).aromatic && molecule.atom(b.end).aromatic;
    match b.order {
        BondOrder::Single if both_aromatic => "-",
        BondOrder::Single => "",
        BondOrder::Double => "=",
        BondOrder::Triple => "#",
        BondOrder::Quadruple => "$",
        BondOrder::Aromatic if both_aromatic => "",
        BondOrder::Aromatic => ":",
    }
}

fn atom_symbol(molecule: &Molecule, atom: usize) -> String {
    let a = molecule.atom(atom);
    let element = a.element;
    let symbol = if a.aromatic {
        element.symbol.to_ascii_lowercase()
    } else {
        element.symbol.to_string()
    };

    let bare = element.is_organic_subset()
        && a.charge == 0
        && a.isotope.is_none()
        && implicit_hydrogens(element, a.aromatic, molecule.bond_valence(atom)) == Some(a.hydrogens);
    if bare {
        return symbol;
    }

    let mut out = String::from("[");
    if let Some(isotope) = a.isotope {
        out.push_str(&isotope.to_string());
    }
    out.push_str(&symbol);
    match a.hydrogens {
        0 => {}
        1 => out.push('H'),
        n => out.push_str(&format!("H{n}")),
    }
    match a.charge {
        0 => {}
        1 => out.push('+'),
        -1 => out.push('-'),
        c if c > 0 => out.push_str(&format!("+{c}")),
        c => out.push_str(&format!("-{}", -i16::from(c))),
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(smiles: &str) -> String {
        CanonicalSmiles::parse(smiles)
            .unwrap_or_else(|e| panic!("{smiles}: {e}"))
            .as_str()
            .to_string()
    }

    #[test]
    fn test_simple_molecules() {
        assert_eq!(canonical("CCO"), "CCO");
        assert_eq!(canonical("OCC"), "CCO");
        assert_eq!(canonical("C"), "C");
        assert_eq!(canonical("[CH4]"), "C");
    }

    #[test]
    fn test_equivalent_inputs_agree() {
        let groups: &[&[&str]] = &[
            &["c1ccccc1", "c1ccc(cc1)"],
            &["CC(=O)O", "OC(C)=O", "C(O)(=O)C"],
            &["CC(C)C", "C(C)(C)C"],
            &["c1ccncc1", "n1ccccc1"],
            &["OCC1CC1", "C1CC1CO"],
            &["[Na+].[Cl-]", "[Cl-].[Na+]"],
        ];
        for group in groups {
            let first = canonical(group[0]);
            for smiles in &group[1..] {
                assert_eq!(canonical(smiles), first, "{smiles} vs {}", group[0]);
            }
        }
    }

    #[test]
    fn test_kekule_and_aromatic_forms_agree() {
        let pairs = [
            ("C1=CC=CC=C1", "c1ccccc1"),
            ("OC1=CC=CC=C1", "Oc1ccccc1"),
            ("C1=CC=NC=C1", "c1ccncc1"),
            ("C1=CNC=C1", "c1cc[nH]c1"),
            ("C1=CSC=C1", "c1ccsc1"),
            ("C1=CC=C2C=CC=CC2=C1", "c1ccc2ccccc2c1"),
            ("CC(=O)OC1=CC=CC=C1C(=O)O", "CC(=O)Oc1ccccc1C(=O)O"),
            ("CN1C=NC2=C1C(=O)N(C(=O)N2C)C", "Cn1c(=O)c2c(ncn2C)n(C)c1=O"),
        ];
        for (kekule, aromatic) in pairs {
            assert_eq!(canonical(kekule), canonical(aromatic), "{kekule} vs {aromatic}");
        }
        assert_eq!(canonical("C1=CC=CC=C1"), "c1ccccc1");
    }

    #[test]
    fn test_idempotent() {
        for smiles in [
            "CCO",
            "c1ccccc1O",
            "CC(=O)Oc1ccccc1C(=O)O",
            "CN1C=NC2=C1C(=O)N(C(=O)N2C)C",
            "c1ccc2ccccc2c1",
            "C1CC2CCC1CC2",
            "[NH4+].[O-]C(=O)C",
            "c1cc[nH]c1",
            "C#N",
            "[13CH3]O",
            "c1ccccc1-c1ccccc1",
            "C1CCCCCCCCCC2CCCCCCCCC12",
        ] {
            let once = canonical(smiles);
            let twice = canonical(&once);
            assert_eq!(once, twice, "input {smiles}");
        }
    }

    #[test]
    fn test_bracket_output() {
        assert_eq!(canonical("[NH4+]"), "[NH4+]");
        assert_eq!(canonical("[O-]"), "[O-]");
        assert_eq!(canonical("[Fe+2]"), "[Fe+2]");
        assert!(canonical("c1cc[nH]c1").contains("[nH]"));
    }

    #[test]
    fn test_stereo_dropped() {
        assert_eq!(canonical("F/C=C/F"), canonical("FC=CF"));
        assert_eq!(canonical("N[C@@H](C)C(=O)O"), canonical("NC(C)C(=O)O"));
    }

    #[test]
    fn test_canonical_text_parses() {
        for smiles in ["CC(=O)Oc1ccccc1C(=O)O", "C1CC2CCC1CC2", "c1ccccc1-c1ccccc1"] {
            let text = canonical(smiles);
            assert!(parse_smiles(&text).is_ok(), "{text}");
        }
    }

    #[test]
    fn test_ranks_unique() {
        let molecule = parse_smiles("c1ccccc1").unwrap();
        let ranks = canonical_ranks(&molecule);
        assert_eq!(distinct(&ranks), 6);
    }
}
