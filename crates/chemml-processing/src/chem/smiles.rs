//! SMILES reader.
//!
//! Supports the organic subset, bracket atoms (isotope, element, chirality,
//! hydrogen count, charge, atom class), aromatic atoms, the bond symbols
//! `- = # $ : / \`, branches, ring closures (`0`-`9` and `%nn`) and `.`
//! separated components. Chirality and double-bond direction are accepted
//! and dropped.
//!
//! After the graph is built the reader assigns implicit hydrogens, rejects
//! over-valent organic atoms, rejects aromatic atoms outside rings and checks
//! that every aromatic system can be written with alternating double bonds.

use std::collections::BTreeMap;

use super::aromaticity;
use super::elements::{self, Element};
use super::molecule::{Atom, Bond, BondOrder, Molecule, implicit_hydrogens};
use crate::error::ParseError;

/// Parse a SMILES string into a [`Molecule`].
pub fn parse_smiles(smiles: &str) -> Result<Molecule, ParseError> {
    let trimmed = smiles.trim();
    if trimmed.is_empty() {
        return Err(ParseError::unparseable(smiles, "empty input"));
    }
    Reader::new(trimmed)
        .read()
        .map_err(|reason| ParseError::unparseable(smiles, reason))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BondSymbol {
    Single,
    Double,
    Triple,
    Quadruple,
    Aromatic,
    /// `/` or `\`: a single bond with a direction we do not keep.
    Directional,
}

impl BondSymbol {
    fn order(self) -> BondOrder {
        match self {
            BondSymbol::Single | BondSymbol::Directional => BondOrder::Single,
            BondSymbol::Double => BondOrder::Double,
            BondSymbol::Triple => BondOrder::Triple,
            BondSymbol::Quadruple => BondOrder::Quadruple,
            BondSymbol::Aromatic => BondOrder::Aromatic,
        }
    }
}

struct PendingAtom {
    element: &'static Element,
    aromatic: bool,
    charge: i8,
    isotope: Option<u16>,
    /// `Some` for bracket atoms, which never receive implicit hydrogens.
    bracket_hydrogens: Option<u8>,
}

struct PendingBond {
    begin: usize,
    end: usize,
    order: BondOrder,
}

struct Reader<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    atoms: Vec<PendingAtom>,
    bonds: Vec<PendingBond>,
    previous: Option<usize>,
    branches: Vec<usize>,
    open_rings: BTreeMap<u16, (usize, Option<BondSymbol>)>,
    pending_bond: Option<BondSymbol>,
}

type ReadResult<T> = Result<T, String>;

impl<'a> Reader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
            atoms: Vec::new(),
            bonds: Vec::new(),
            previous: None,
            branches: Vec::new(),
            open_rings: BTreeMap::new(),
            pending_bond: None,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn read(mut self) -> ReadResult<Molecule> {
        while let Some(c) = self.peek() {
            match c {
                b'(' => {
                    let Some(atom) = self.previous else {
                        return Err(format!("branch without preceding atom at position {}", self.pos));
                    };
                    if self.peek_at(1) == Some(b')') {
                        return Err(format!("empty branch at position {}", self.pos));
                    }
                    self.branches.push(atom);
                    self.pos += 1;
                }
                b')' => {
                    if self.pending_bond.is_some() {
                        return Err(format!("bond without following atom at position {}", self.pos));
                    }
                    let atom = self
                        .branches
                        .pop()
                        .ok_or_else(|| format!("unbalanced ')' at position {}", self.pos))?;
                    self.previous = Some(atom);
                    self.pos += 1;
                }
                b'.' => {
                    if self.pending_bond.is_some() || self.previous.is_none() {
                        return Err(format!("misplaced '.' at position {}", self.pos));
                    }
                    self.previous = None;
                    self.pos += 1;
                }
                b'-' | b'=' | b'#' | b'$' | b':' | b'/' | b'\\' => {
                    if self.pending_bond.is_some() {
                        return Err(format!("two bond symbols in a row at position {}", self.pos));
                    }
                    if self.previous.is_none() {
                        return Err(format!("bond without preceding atom at position {}", self.pos));
                    }
                    self.pending_bond = Some(match c {
                        b'-' => BondSymbol::Single,
                        b'=' => BondSymbol::Double,
                        b'#' => BondSymbol::Triple,
                        b'$' => BondSymbol::Quadruple,
                        b':' => BondSymbol::Aromatic,
                        _ => BondSymbol::Directional,
                    });
                    self.pos += 1;
                }
                b'0'..=b'9' | b'%' => self.read_ring_bond()?,
                b'[' => {
                    let atom = self.read_bracket_atom()?;
                    self.add_atom(atom)?;
                }
                _ => {
                    let atom = self.read_organic_atom()?;
                    self.add_atom(atom)?;
                }
            }
        }

        if !self.branches.is_empty() {
            return Err("unclosed branch".to_string());
        }
        if let Some(number) = self.open_rings.keys().next() {
            return Err(format!("unclosed ring {number}"));
        }
        if self.pending_bond.is_some() {
            return Err("bond at end of input".to_string());
        }
        self.finish()
    }

    fn add_atom(&mut self, atom: PendingAtom) -> ReadResult<()> {
        let index = self.atoms.len();
        self.atoms.push(atom);
        if let Some(previous) = self.previous {
            let symbol = self.pending_bond.take();
            self.push_bond(previous, index, symbol)?;
        }
        self.previous = Some(index);
        Ok(())
    }

    fn push_bond(&mut self, begin: usize, end: usize, symbol: Option<BondSymbol>) -> ReadResult<()> {
        if begin == end {
            return Err(format!("atom {begin} bonded to itself"));
        }
        let duplicate = self.bonds.iter().any(|b| {
            (b.begin == begin && b.end == end) || (b.begin == end && b.end == begin)
        });
        if duplicate {
            return Err(format!("duplicate bond between atoms {begin} and {end}"));
        }
        let order = match symbol {
            Some(symbol) => symbol.order(),
            None if self.atoms[begin].aromatic && self.atoms[end].aromatic => BondOrder::Aromatic,
            None => BondOrder::Single,
        };
        self.bonds.push(PendingBond { begin, end, order });
        Ok(())
    }

    fn read_ring_bond(&mut self) -> ReadResult<()> {
        let start = self.pos;
        let number = if self.peek() == Some(b'%') {
            let digits = self
                .bytes
                .get(self.pos + 1..self.pos + 3)
                .filter(|d| d.iter().all(u8::is_ascii_digit))
                .ok_or_else(|| format!("'%' must be followed by two digits at position {start}"))?;
            self.pos += 3;
            u16::from(digits[0] - b'0') * 10 + u16::from(digits[1] - b'0')
        } else {
            let digit = self.bytes[self.pos] - b'0';
            self.pos += 1;
            u16::from(digit)
        };

        let atom = self
            .previous
            .ok_or_else(|| format!("ring bond without preceding atom at position {start}"))?;
        let symbol = self.pending_bond.take();

        match self.open_rings.remove(&number) {
            Some((opener, opening_symbol)) => {
                let symbol = match (opening_symbol, symbol) {
                    (Some(a), Some(b)) if a.order() != b.order() => {
                        return Err(format!("conflicting bond symbols on ring {number}"));
                    }
                    (a, b) => a.or(b),
                };
                self.push_bond(opener, atom, symbol)
            }
            None => {
                self.open_rings.insert(number, (atom, symbol));
                Ok(())
            }
        }
    }

    fn read_organic_atom(&mut self) -> ReadResult<PendingAtom> {
        let start = self.pos;
        let rest = &self.text[self.pos..];
        let (symbol, aromatic, len) = if rest.starts_with("Cl") {
            ("Cl", false, 2)
        } else if rest.starts_with("Br") {
            ("Br", false, 2)
        } else {
            match self.bytes[self.pos] {
                b'B' => ("B", false, 1),
                b'C' => ("C", false, 1),
                b'N' => ("N", false, 1),
                b'O' => ("O", false, 1),
                b'P' => ("P", false, 1),
                b'S' => ("S", false, 1),
                b'F' => ("F", false, 1),
                b'I' => ("I", false, 1),
                b'b' => ("B", true, 1),
                b'c' => ("C", true, 1),
                b'n' => ("N", true, 1),
                b'o' => ("O", true, 1),
                b'p' => ("P", true, 1),
                b's' => ("S", true, 1),
                _ => {
                    let found = rest.chars().next().unwrap_or('?');
                    return Err(format!("unexpected character '{found}' at position {start}"));
                }
            }
        };
        self.pos += len;
        let element = elements::by_symbol(symbol)
            .ok_or_else(|| format!("unknown element '{symbol}' at position {start}"))?;
        Ok(PendingAtom {
            element,
            aromatic,
            charge: 0,
            isotope: None,
            bracket_hydrogens: None,
        })
    }

    fn read_number(&mut self) -> Option<u32> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if start == self.pos {
            None
        } else {
            self.text[start..self.pos].parse().ok()
        }
    }

    fn read_bracket_atom(&mut self) -> ReadResult<PendingAtom> {
        let open = self.pos;
        self.pos += 1;

        let isotope = match self.read_number() {
            Some(mass) => Some(
                u16::try_from(mass).map_err(|_| format!("isotope {mass} out of range"))?,
            ),
            None => None,
        };

        let (element, aromatic) = self.read_bracket_symbol(open)?;
        self.skip_chirality();

        let mut hydrogens = 0u8;
        if self.peek() == Some(b'H') {
            self.pos += 1;
            hydrogens = match self.read_number() {
                Some(count) => {
                    u8::try_from(count).map_err(|_| format!("hydrogen count {count} out of range"))?
                }
                None => 1,
            };
        }

        let charge = self.read_charge()?;

        if self.peek() == Some(b':') {
            self.pos += 1;
            if self.read_number().is_none() {
                return Err(format!("atom class without number in bracket at position {open}"));
            }
        }

        if self.peek() != Some(b']') {
            return Err(format!("unterminated bracket atom at position {open}"));
        }
        self.pos += 1;

        Ok(PendingAtom {
            element,
            aromatic,
            charge,
            isotope,
            bracket_hydrogens: Some(hydrogens),
        })
    }

    fn read_bracket_symbol(&mut self, open: usize) -> ReadResult<(&'static Element, bool)> {
        let rest = &self.text[self.pos..];
        let mut chars = rest.chars();
        let first = chars
            .next()
            .ok_or_else(|| format!("unterminated bracket atom at position {open}"))?;

        if first.is_ascii_lowercase() {
            for (symbol, len) in [("se", 2), ("as", 2), ("te", 2), ("c", 1), ("n", 1), ("o", 1), ("p", 1), ("s", 1), ("b", 1)] {
                if rest.starts_with(symbol) {
                    self.pos += len;
                    let mut capitalized = symbol[..1].to_ascii_uppercase();
                    capitalized.push_str(&symbol[1..]);
                    let element = elements::by_symbol(&capitalized)
                        .ok_or_else(|| format!("unknown aromatic element '{symbol}'"))?;
                    return Ok((element, true));
                }
            }
            return Err(format!("unknown aromatic element at position {}", self.pos));
        }

        if !first.is_ascii_uppercase() {
            return Err(format!("expected element symbol at position {}", self.pos));
        }

        if let Some(second) = chars.next().filter(char::is_ascii_lowercase) {
            let two: String = [first, second].iter().collect();
            if let Some(element) = elements::by_symbol(&two) {
                self.pos += 2;
                return Ok((element, false));
            }
        }
        let one = first.to_string();
        let element = elements::by_symbol(&one)
            .ok_or_else(|| format!("unknown element '{one}' at position {}", self.pos))?;
        self.pos += 1;
        Ok((element, false))
    }

    fn skip_chirality(&mut self) {
        if self.peek() != Some(b'@') {
            return;
        }
        self.pos += 1;
        if self.peek() == Some(b'@') {
            self.pos += 1;
            return;
        }
        let rest = &self.text[self.pos..];
        if ["TH", "AL", "SP", "TB", "OH"].iter().any(|class| rest.starts_with(class)) {
            self.pos += 2;
            self.read_number();
        }
    }

    fn read_charge(&mut self) -> ReadResult<i8> {
        let sign: i32 = match self.peek() {
            Some(b'+') => 1,
            Some(b'-') => -1,
            _ => return Ok(0),
        };
        let symbol = self.bytes[self.pos];
        self.pos += 1;

        let magnitude = if let Some(count) = self.read_number() {
            i32::try_from(count).unwrap_or(i32::MAX)
        } else {
            let mut repeats = 1;
            while self.peek() == Some(symbol) {
                repeats += 1;
                self.pos += 1;
            }
            repeats
        };
        if magnitude > 15 {
            return Err(format!("charge {magnitude} out of range"));
        }
        i8::try_from(sign * magnitude).map_err(|_| "charge out of range".to_string())
    }

    /// Resolve implicit bond orders and hydrogens, then validate.
    fn finish(self) -> ReadResult<Molecule> {
        let draft = Molecule::new(
            self.atoms.iter().map(|a| to_atom(a, 0)).collect(),
            self.bonds
                .iter()
                .map(|b| Bond {
                    begin: b.begin,
                    end: b.end,
                    order: b.order,
                })
                .collect(),
        );

        // Aromatic bonds only exist inside rings.
        let bonds: Vec<Bond> = self
            .bonds
            .iter()
            .enumerate()
            .map(|(index, bond)| {
                let order = if bond.order == BondOrder::Aromatic && !draft.is_ring_bond(index) {
                    BondOrder::Single
                } else {
                    bond.order
                };
                Bond {
                    begin: bond.begin,
                    end: bond.end,
                    order,
                }
            })
            .collect();

        let mut valence = vec![0u8; self.atoms.len()];
        for bond in &bonds {
            valence[bond.begin] = valence[bond.begin].saturating_add(bond.order.valence());
            valence[bond.end] = valence[bond.end].saturating_add(bond.order.valence());
        }

        let mut atoms = Vec::with_capacity(self.atoms.len());
        for (index, pending) in self.atoms.iter().enumerate() {
            if pending.aromatic && !draft.is_ring_atom(index) {
                return Err(format!(
                    "aromatic atom {} ({}) is not in a ring",
                    index, pending.element.symbol
                ));
            }
            let hydrogens = match pending.bracket_hydrogens {
                Some(count) => count,
                None => implicit_hydrogens(pending.element, pending.aromatic, valence[index])
                    .ok_or_else(|| {
                        format!(
                            "atom {} ({}) exceeds its allowed valence with {} bonds",
                            index, pending.element.symbol, valence[index]
                        )
                    })?,
            };
            atoms.push(to_atom(pending, hydrogens));
        }

        let molecule = aromaticity::perceive(Molecule::new(atoms, bonds));
        check_kekulizable(&molecule)?;
        Ok(molecule)
    }
}

fn to_atom(pending: &PendingAtom, hydrogens: u8) -> Atom {
    Atom {
        element: pending.element,
        aromatic: pending.aromatic,
        charge: pending.charge,
        isotope: pending.isotope,
        hydrogens,
    }
}

/// Whether an aromatic atom must take part in a ring double bond.
fn needs_pi_bond(molecule: &Molecule, atom: usize) -> bool {
    let a = molecule.atom(atom);
    if !a.aromatic {
        return false;
    }
    let exocyclic_double = molecule
        .neighbors(atom)
        .iter()
        .any(|(_, b)| matches!(molecule.bond(*b).order, BondOrder::Double | BondOrder::Triple));
    if exocyclic_double {
        return false;
    }
    let connections = molecule.neighbors(atom).len() + usize::from(a.hydrogens);
    match a.element.atomic_number {
        6 => a.charge == 0 && connections <= 3,
        7 | 15 | 33 => match a.charge {
            0 => connections == 2,
            1 => connections == 3,
            _ => false,
        },
        8 | 16 | 34 | 52 => a.charge == 1 && connections == 2,
        _ => false,
    }
}

/// Every aromatic atom that needs a double bond must be paired with an
/// aromatic neighbor that also needs one.
fn check_kekulizable(molecule: &Molecule) -> ReadResult<()> {
    let needy: Vec<bool> = (0..molecule.atom_count())
        .map(|atom| needs_pi_bond(molecule, atom))
        .collect();
    if !needy.iter().any(|n| *n) {
        return Ok(());
    }
    let mut matched = vec![false; molecule.atom_count()];
    if match_pi_bonds(molecule, &needy, &mut matched, 0) {
        Ok(())
    } else {
        Err("cannot assign alternating double bonds to aromatic system".to_string())
    }
}

fn match_pi_bonds(molecule: &Molecule, needy: &[bool], matched: &mut [bool], from: usize) -> bool {
    let Some(atom) = (from..needy.len()).find(|&a| needy[a] && !matched[a]) else {
        return true;
    };
    matched[atom] = true;
    for &(next, bond) in molecule.neighbors(atom) {
        if needy[next] && !matched[next] && molecule.bond(bond).order == BondOrder::Aromatic {
            matched[next] = true;
            if match_pi_bonds(molecule, needy, matched, atom + 1) {
                return true;
            }
            matched[next] = false;
        }
    }
    matched[atom] = false;
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(smiles: &str) -> Molecule {
        parse_smiles(smiles).unwrap_or_else(|e| panic!("{smiles}: {e}"))
    }

    fn reason(smiles: &str) -> String {
        match parse_smiles(smiles) {
            Err(ParseError::Unparseable { reason, .. }) => reason,
            other => panic!("expected failure for {smiles}, got {other:?}"),
        }
    }

    #[test]
    fn test_ethanol() {
        let mol = parse("CCO");
        assert_eq!(mol.atom_count(), 3);
        assert_eq!(mol.bonds().len(), 2);
        assert_eq!(mol.atom(0).hydrogens, 3);
        assert_eq!(mol.atom(1).hydrogens, 2);
        assert_eq!(mol.atom(2).hydrogens, 1);
    }

    #[test]
    fn test_benzene_aromatic() {
        let mol = parse("c1ccccc1");
        assert_eq!(mol.ring_count(), 1);
        assert!(mol.atoms().iter().all(|a| a.aromatic && a.hydrogens == 1));
        assert!(mol.bonds().iter().all(|b| b.order == BondOrder::Aromatic));
    }

    #[test]
    fn test_branches_and_double_bonds() {
        let mol = parse("CC(=O)O");
        assert_eq!(mol.atom_count(), 4);
        assert_eq!(mol.atom(1).hydrogens, 0);
        assert_eq!(mol.bond(1).order, BondOrder::Double);
        assert_eq!(mol.atom(3).hydrogens, 1);
    }

    #[test]
    fn test_bracket_atoms() {
        let mol = parse("[NH4+]");
        assert_eq!(mol.atom(0).charge, 1);
        assert_eq!(mol.atom(0).hydrogens, 4);

        let mol = parse("[13CH3][O-]");
        assert_eq!(mol.atom(0).isotope, Some(13));
        assert_eq!(mol.atom(1).charge, -1);
        assert_eq!(mol.atom(1).hydrogens, 0);

        let mol = parse("N[C@@H](C)C(=O)O");
        assert_eq!(mol.atom(1).hydrogens, 1);

        let mol = parse("[Fe++]");
        assert_eq!(mol.atom(0).charge, 2);
    }

    #[test]
    fn test_ring_closure_variants() {
        assert_eq!(parse("C1CC1").ring_count(), 1);
        assert_eq!(parse("C%10CC%10").ring_count(), 1);
        let mol = parse("C=1CCCCC1");
        assert_eq!(mol.bonds().last().unwrap().order, BondOrder::Double);
        assert_eq!(parse("c1ccc2ccccc2c1").ring_count(), 2);
    }

    #[test]
    fn test_components_and_stereo_bonds() {
        let mol = parse("[Na+].[Cl-]");
        assert_eq!(mol.component_count(), 2);
        let mol = parse("F/C=C/F");
        assert_eq!(mol.bond(1).order, BondOrder::Double);
    }

    #[test]
    fn test_pyrrole_and_pyridine() {
        let pyrrole = parse("c1cc[nH]c1");
        assert_eq!(pyrrole.atom(3).hydrogens, 1);
        let pyridine = parse("c1ccncc1");
        assert_eq!(pyridine.atom(3).hydrogens, 0);
        parse("o1cccc1");
        parse("Cn1cccc1");
    }

    #[test]
    fn test_biphenyl_link_is_single() {
        let mol = parse("c1ccccc1c1ccccc1");
        let link = mol.bond_between(5, 6).unwrap();
        assert_eq!(mol.bond(link).order, BondOrder::Single);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(reason("").contains("empty"));
        assert!(reason("invalid_x").contains("unexpected character"));
        assert!(reason("C1CC").contains("unclosed ring"));
        assert!(reason("CC(C").contains("unclosed branch"));
        assert!(reason("CC)C").contains("unbalanced"));
        assert!(reason("C(C)(C)(C)(C)C").contains("valence"));
        assert!(reason("cc").contains("not in a ring"));
        assert!(reason("c1cccc1").contains("alternating"));
        assert!(reason("[Xx]").contains("unknown element"));
        assert!(reason("C=").contains("end of input"));
        assert!(reason("C1CC2").contains("unclosed ring"));
    }

    #[test]
    fn test_error_carries_input() {
        match parse_smiles("C1CC") {
            Err(ParseError::Unparseable { smiles, .. }) => assert_eq!(smiles, "C1CC"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
