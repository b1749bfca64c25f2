//! Structural fingerprints: circular (Morgan/ECFP) and MACCS-style keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::molecule::{BondOrder, Molecule};

/// Number of bits in a MACCS key vector; bit 0 is unused.
pub const MACCS_BITS: usize = 167;

/// Which fingerprint to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FingerprintKind {
    /// Circular fingerprint of the given radius folded to `n_bits`.
    Morgan { radius: u8, n_bits: usize },
    /// 167-bit structural keys.
    Maccs,
}

impl FingerprintKind {
    /// Radius-2 Morgan folded to 1024 bits.
    pub const ECFP4: FingerprintKind = FingerprintKind::Morgan {
        radius: 2,
        n_bits: 1024,
    };

    pub fn n_bits(&self) -> usize {
        match self {
            FingerprintKind::Morgan { n_bits, .. } => *n_bits,
            FingerprintKind::Maccs => MACCS_BITS,
        }
    }

    /// Infix used for derived column names: `ECFP4`, `ECFP6`, `MACCS`.
    pub fn column_prefix(&self) -> String {
        match self {
            FingerprintKind::Morgan { radius, .. } => format!("ECFP{}", u16::from(*radius) * 2),
            FingerprintKind::Maccs => "MACCS".to_string(),
        }
    }

    pub fn compute(&self, molecule: &Molecule) -> Fingerprint {
        match self {
            FingerprintKind::Morgan { radius, n_bits } => morgan(molecule, *radius, *n_bits),
            FingerprintKind::Maccs => maccs(molecule),
        }
    }
}

impl fmt::Display for FingerprintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FingerprintKind::Morgan { radius, n_bits } => {
                write!(f, "Morgan(radius={radius}, bits={n_bits})")
            }
            FingerprintKind::Maccs => f.write_str("MACCS"),
        }
    }
}

/// Fixed-length bit vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    words: Vec<u64>,
    len: usize,
}

impl Fingerprint {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn set(&mut self, bit: usize) {
        if bit < self.len {
            self.words[bit / 64] |= 1 << (bit % 64);
        }
    }

    pub fn get(&self, bit: usize) -> bool {
        bit < self.len && self.words[bit / 64] & (1 << (bit % 64)) != 0
    }

    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

// =============================================================================
// Morgan
// =============================================================================

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a(words: &[u32]) -> u32 {
    let mut hash = FNV_OFFSET;
    for word in words {
        for byte in word.to_le_bytes() {
            hash ^= u32::from(byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

fn initial_identifier(molecule: &Molecule, atom: usize) -> u32 {
    let a = molecule.atom(atom);
    fnv1a(&[
        u32::from(a.element.atomic_number),
        molecule.heavy_degree(atom) as u32,
        molecule.hydrogen_count(atom) as u32,
        a.charge as i32 as u32,
        u32::from(a.isotope.unwrap_or(0)),
        u32::from(molecule.is_ring_atom(atom)),
    ])
}

fn morgan(molecule: &Molecule, radius: u8, n_bits: usize) -> Fingerprint {
    let mut fingerprint = Fingerprint::new(n_bits);
    if n_bits == 0 {
        return fingerprint;
    }
    let heavy: Vec<usize> = (0..molecule.atom_count())
        .filter(|&atom| !molecule.atom(atom).element.is_hydrogen())
        .collect();

    let mut identifiers: Vec<u32> = (0..molecule.atom_count())
        .map(|atom| initial_identifier(molecule, atom))
        .collect();
    for &atom in &heavy {
        fingerprint.set(identifiers[atom] as usize % n_bits);
    }

    for iteration in 1..=u32::from(radius) {
        let next: Vec<u32> = (0..molecule.atom_count())
            .map(|atom| {
                let mut environment: Vec<(u32, u32)> = molecule
                    .neighbors(atom)
                    .iter()
                    .filter(|(n, _)| !molecule.atom(*n).element.is_hydrogen())
                    .map(|&(n, b)| (u32::from(molecule.bond(b).order.code()), identifiers[n]))
                    .collect();
                environment.sort_unstable();
                let mut words = vec![iteration, identifiers[atom]];
                for (bond, id) in environment {
                    words.push(bond);
                    words.push(id);
                }
                fnv1a(&words)
            })
            .collect();
        identifiers = next;
        for &atom in &heavy {
            fingerprint.set(identifiers[atom] as usize % n_bits);
        }
    }
    fingerprint
}

// =============================================================================
// MACCS
// =============================================================================

struct KeyContext<'a> {
    molecule: &'a Molecule,
}

impl KeyContext<'_> {
    fn element(&self, atom: usize) -> u8 {
        self.molecule.atom(atom).element.atomic_number
    }

    fn count_atoms(&self, pred: impl Fn(usize) -> bool) -> usize {
        (0..self.molecule.atom_count()).filter(|&a| pred(a)).count()
    }

    fn any_atom(&self, pred: impl Fn(usize) -> bool) -> bool {
        (0..self.molecule.atom_count()).any(pred)
    }

    /// Some bond (of `order`, or any order when `None`) joins atoms matching
    /// the two predicates.
    fn any_bond(
        &self,
        order: Option<BondOrder>,
        left: impl Fn(usize) -> bool,
        right: impl Fn(usize) -> bool,
    ) -> bool {
        self.molecule.bonds().iter().any(|bond| {
            order.is_none_or(|o| o == bond.order)
                && ((left(bond.begin) && right(bond.end)) || (left(bond.end) && right(bond.begin)))
        })
    }

    fn is_hetero(&self, atom: usize) -> bool {
        self.molecule.atom(atom).element.is_hetero()
    }

    fn is_methyl(&self, atom: usize) -> bool {
        self.element(atom) == 6
            && !self.molecule.atom(atom).aromatic
            && self.molecule.hydrogen_count(atom) >= 3
    }

    fn has_ring_of(&self, pred: impl Fn(usize) -> bool) -> bool {
        self.molecule.rings().iter().any(|ring| pred(ring.len()))
    }
}

fn maccs(molecule: &Molecule) -> Fingerprint {
    let ctx = &KeyContext { molecule };
    let mut fp = Fingerprint::new(MACCS_BITS);
    let mut key = |bit: usize, present: bool| {
        if present {
            fp.set(bit);
        }
    };
    let is = |z: u8| move |atom: usize| ctx.element(atom) == z;
    let any = |_: usize| true;
    let oxygen_count = ctx.count_atoms(is(8));
    let nitrogen_count = ctx.count_atoms(is(7));
    let halogen = |atom: usize| molecule.atom(atom).element.is_halogen();

    key(9, ctx.any_atom(|a| matches!(ctx.element(a), 26 | 27 | 28 | 44 | 45 | 46 | 76 | 77 | 78)));
    key(10, ctx.any_atom(|a| matches!(ctx.element(a), 4 | 12 | 20 | 38 | 56 | 88)));
    key(11, ctx.has_ring_of(|size| size == 4));
    key(12, ctx.any_atom(|a| matches!(ctx.element(a), 29 | 30 | 47 | 48 | 79 | 80)));
    key(14, ctx.any_bond(Some(BondOrder::Single), is(16), is(16)));
    key(17, ctx.any_bond(Some(BondOrder::Triple), is(6), is(6)));
    key(18, ctx.any_atom(|a| matches!(ctx.element(a), 5 | 13 | 31 | 49 | 81)));
    key(19, ctx.has_ring_of(|size| size == 7));
    key(20, ctx.any_atom(is(14)));
    key(22, ctx.has_ring_of(|size| size == 3));
    key(24, ctx.any_bond(Some(BondOrder::Single), is(7), is(8)));
    key(27, ctx.any_atom(is(53)));
    key(29, ctx.any_atom(is(15)));
    key(31, ctx.any_bond(None, |a| ctx.is_hetero(a) && !halogen(a), halogen));
    key(34, ctx.any_bond(
        Some(BondOrder::Double),
        |a| ctx.element(a) == 6 && molecule.hydrogen_count(a) == 2,
        any,
    ));
    key(35, ctx.any_atom(|a| matches!(ctx.element(a), 3 | 11 | 19 | 37 | 55 | 87)));
    key(41, ctx.any_bond(Some(BondOrder::Triple), is(6), is(7)));
    key(42, ctx.any_atom(is(9)));
    key(46, ctx.any_atom(is(35)));
    key(49, ctx.any_atom(|a| molecule.atom(a).charge != 0));
    key(52, ctx.any_bond(None, is(7), is(7)));
    key(57, ctx.any_atom(|a| ctx.element(a) == 8 && molecule.is_ring_atom(a)));
    key(60, ctx.any_bond(Some(BondOrder::Double), is(16), is(8)));
    key(63, ctx.any_bond(Some(BondOrder::Double), is(7), is(8)));
    key(78, ctx.any_bond(Some(BondOrder::Double), is(6), is(7)));
    key(84, ctx.any_atom(|a| ctx.element(a) == 7 && molecule.hydrogen_count(a) == 2));
    key(88, ctx.any_atom(is(16)));
    key(93, ctx.any_bond(None, |a| ctx.is_hetero(a), |a| ctx.is_methyl(a)));
    key(96, ctx.has_ring_of(|size| size == 5));
    key(99, ctx.any_bond(Some(BondOrder::Double), is(6), is(6)));
    key(101, ctx.has_ring_of(|size| size >= 8));
    key(103, ctx.any_atom(is(17)));
    key(121, ctx.any_atom(|a| ctx.element(a) == 7 && molecule.is_ring_atom(a)));
    key(
        125,
        molecule
            .rings()
            .iter()
            .filter(|ring| ring.iter().all(|&a| molecule.atom(a).aromatic))
            .count()
            > 1,
    );
    key(134, ctx.any_atom(halogen));
    key(
        136,
        ctx.count_atoms(|a| {
            ctx.element(a) == 8
                && molecule
                    .neighbors(a)
                    .iter()
                    .any(|(_, b)| molecule.bond(*b).order == BondOrder::Double)
        }) > 1,
    );
    key(137, ctx.any_atom(|a| ctx.is_hetero(a) && molecule.is_ring_atom(a)));
    key(139, ctx.any_atom(|a| ctx.element(a) == 8 && molecule.hydrogen_count(a) > 0));
    key(140, oxygen_count > 3);
    key(142, nitrogen_count > 1);
    key(145, molecule.rings().iter().filter(|ring| ring.len() == 6).count() > 1);
    key(146, oxygen_count > 2);
    key(149, ctx.count_atoms(|a| ctx.is_methyl(a)) > 1);
    key(154, ctx.any_bond(Some(BondOrder::Double), is(6), is(8)));
    key(157, ctx.any_bond(Some(BondOrder::Single), is(6), is(8)));
    key(158, ctx.any_bond(Some(BondOrder::Single), is(6), is(7)));
    key(159, oxygen_count > 1);
    key(160, ctx.any_atom(|a| ctx.is_methyl(a)));
    key(161, nitrogen_count > 0);
    key(162, ctx.any_atom(|a| molecule.atom(a).aromatic));
    key(163, ctx.has_ring_of(|size| size == 6));
    key(164, oxygen_count > 0);
    key(165, ctx.any_atom(|a| molecule.is_ring_atom(a)));
    key(166, molecule.component_count() > 1);
    fp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::smiles::parse_smiles;

    fn fingerprint(smiles: &str, kind: FingerprintKind) -> Fingerprint {
        kind.compute(&parse_smiles(smiles).unwrap())
    }

    #[test]
    fn test_bit_vector_basics() {
        let mut fp = Fingerprint::new(70);
        fp.set(3);
        fp.set(65);
        fp.set(500);
        assert!(fp.get(3) && fp.get(65));
        assert!(!fp.get(4));
        assert_eq!(fp.count_ones(), 2);
        assert!((0..70).filter(|&bit| fp.get(bit)).eq([3, 65]));
    }

    #[test]
    fn test_morgan_deterministic_and_sized() {
        let a = fingerprint("CC(=O)Oc1ccccc1C(=O)O", FingerprintKind::ECFP4);
        let b = fingerprint("CC(=O)Oc1ccccc1C(=O)O", FingerprintKind::ECFP4);
        assert_eq!(a, b);
        assert_eq!(a.len(), 1024);
        assert!(a.count_ones() > 5);
    }

    #[test]
    fn test_morgan_independent_of_atom_order() {
        let a = fingerprint("CCO", FingerprintKind::ECFP4);
        let b = fingerprint("OCC", FingerprintKind::ECFP4);
        assert_eq!(a, b);
    }

    #[test]
    fn test_maccs_keys() {
        let phenol = fingerprint("Oc1ccccc1", FingerprintKind::Maccs);
        assert_eq!(phenol.len(), MACCS_BITS);
        assert!(!phenol.get(0));
        assert!(phenol.get(139)); // OH
        assert!(phenol.get(162)); // aromatic
        assert!(phenol.get(163)); // six-membered ring
        assert!(!phenol.get(161)); // no nitrogen

        let salt = fingerprint("[Na+].[Cl-]", FingerprintKind::Maccs);
        assert!(salt.get(35) && salt.get(49) && salt.get(103) && salt.get(166));

        let naphthalene = fingerprint("c1ccc2ccccc2c1", FingerprintKind::Maccs);
        assert!(naphthalene.get(125) && naphthalene.get(145));
    }

    #[test]
    fn test_column_prefix() {
        assert_eq!(FingerprintKind::ECFP4.column_prefix(), "ECFP4");
        assert_eq!(
            FingerprintKind::Morgan { radius: 3, n_bits: 2048 }.column_prefix(),
            "ECFP6"
        );
        assert_eq!(FingerprintKind::Maccs.column_prefix(), "MACCS");
    }
}
