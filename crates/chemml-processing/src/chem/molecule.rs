//! Molecular graph built by the SMILES reader.
//!
//! Hydrogens are stored as counts on their heavy atom unless they were written
//! as explicit `[H]` atoms. Ring membership and a smallest-cycle ring set are
//! computed once at construction.

use std::collections::{BTreeSet, VecDeque};

use super::elements::Element;
#[cfg(test)]
use super::elements;

/// Bond multiplicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BondOrder {
    Single,
    Double,
    Triple,
    Quadruple,
    Aromatic,
}

impl BondOrder {
    /// Contribution to the valence sum of each endpoint. Aromatic bonds count
    /// as one; the shared pi electron is accounted for separately.
    pub fn valence(self) -> u8 {
        match self {
            BondOrder::Single | BondOrder::Aromatic => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
        }
    }

    /// Small integer used in hashes and canonical invariants.
    pub fn code(self) -> u8 {
        match self {
            BondOrder::Single => 1,
            BondOrder::Double => 2,
            BondOrder::Triple => 3,
            BondOrder::Quadruple => 4,
            BondOrder::Aromatic => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub element: &'static Element,
    pub aromatic: bool,
    pub charge: i8,
    pub isotope: Option<u16>,
    /// Attached hydrogens not present as separate atoms.
    pub hydrogens: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bond {
    pub begin: usize,
    pub end: usize,
    pub order: BondOrder,
}

impl Bond {
    /// The endpoint that is not `atom`.
    pub fn other(&self, atom: usize) -> usize {
        if self.begin == atom { self.end } else { self.begin }
    }
}

/// An undirected molecular graph.
#[derive(Debug, Clone)]
pub struct Molecule {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    /// Per atom: (neighbor, bond index).
    adjacency: Vec<Vec<(usize, usize)>>,
    ring_bond: Vec<bool>,
    ring_atom: Vec<bool>,
    rings: Vec<Vec<usize>>,
    components: usize,
}

impl Molecule {
    /// Assemble a molecule and compute its ring information.
    pub fn new(atoms: Vec<Atom>, bonds: Vec<Bond>) -> Self {
        let mut adjacency = vec![Vec::new(); atoms.len()];
        for (index, bond) in bonds.iter().enumerate() {
            adjacency[bond.begin].push((bond.end, index));
            adjacency[bond.end].push((bond.begin, index));
        }

        let ring_bond = find_ring_bonds(atoms.len(), &bonds, &adjacency);
        let mut ring_atom = vec![false; atoms.len()];
        for (bond, _) in bonds.iter().zip(&ring_bond).filter(|(_, in_ring)| **in_ring) {
            ring_atom[bond.begin] = true;
            ring_atom[bond.end] = true;
        }

        let components = count_components(atoms.len(), &adjacency);
        let mut molecule = Self {
            atoms,
            bonds,
            adjacency,
            ring_bond,
            ring_atom,
            rings: Vec::new(),
            components,
        };
        molecule.rings = molecule.smallest_cycles();
        molecule
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom(&self, index: usize) -> &Atom {
        &self.atoms[index]
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn bond(&self, index: usize) -> &Bond {
        &self.bonds[index]
    }

    /// (neighbor, bond index) pairs of an atom.
    pub fn neighbors(&self, atom: usize) -> &[(usize, usize)] {
        &self.adjacency[atom]
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.atoms.iter().filter(|a| !a.element.is_hydrogen()).count()
    }

    /// Hydrogens stored as counts plus explicit hydrogen atoms.
    pub fn total_hydrogens(&self) -> usize {
        self.atoms
            .iter()
            .map(|a| {
                if a.element.is_hydrogen() {
                    1 + usize::from(a.hydrogens)
                } else {
                    usize::from(a.hydrogens)
                }
            })
            .sum()
    }

    /// Number of non-hydrogen neighbors.
    pub fn heavy_degree(&self, atom: usize) -> usize {
        self.adjacency[atom]
            .iter()
            .filter(|(n, _)| !self.atoms[*n].element.is_hydrogen())
            .count()
    }

    /// Hydrogens on an atom, counting both stored and explicit ones.
    pub fn hydrogen_count(&self, atom: usize) -> usize {
        let explicit = self.adjacency[atom]
            .iter()
            .filter(|(n, _)| self.atoms[*n].element.is_hydrogen())
            .count();
        usize::from(self.atoms[atom].hydrogens) + explicit
    }

    /// Sum of bond valences at an atom.
    pub fn bond_valence(&self, atom: usize) -> u8 {
        self.adjacency[atom]
            .iter()
            .map(|(_, b)| self.bonds[*b].order.valence())
            .sum()
    }

    pub fn is_ring_bond(&self, bond: usize) -> bool {
        self.ring_bond[bond]
    }

    pub fn is_ring_atom(&self, atom: usize) -> bool {
        self.ring_atom[atom]
    }

    /// Number of disconnected fragments.
    pub fn component_count(&self) -> usize {
        self.components
    }

    /// Cyclomatic number: bonds - atoms + components.
    pub fn ring_count(&self) -> usize {
        (self.bonds.len() + self.components).saturating_sub(self.atoms.len())
    }

    /// Smallest cycle through each ring bond, deduplicated. Each ring is the
    /// ordered list of its atoms.
    pub fn rings(&self) -> &[Vec<usize>] {
        &self.rings
    }

    /// Connected components as sorted atom lists, ordered by smallest atom.
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.atoms.len()];
        let mut components = Vec::new();
        for start in 0..self.atoms.len() {
            if seen[start] {
                continue;
            }
            let mut members = Vec::new();
            let mut queue = VecDeque::from([start]);
            seen[start] = true;
            while let Some(atom) = queue.pop_front() {
                members.push(atom);
                for &(next, _) in &self.adjacency[atom] {
                    if !seen[next] {
                        seen[next] = true;
                        queue.push_back(next);
                    }
                }
            }
            members.sort_unstable();
            components.push(members);
        }
        components
    }

    /// Index of the bond joining two atoms.
    pub fn bond_between(&self, a: usize, b: usize) -> Option<usize> {
        self.adjacency[a]
            .iter()
            .find(|(n, _)| *n == b)
            .map(|(_, bond)| *bond)
    }

    /// Shortest path length (in bonds) from `from` to `to` without using
    /// `skip_bond`, by breadth-first search.
    fn shortest_path_avoiding(&self, from: usize, to: usize, skip_bond: usize) -> Option<Vec<usize>> {
        let mut previous = vec![usize::MAX; self.atoms.len()];
        previous[from] = from;
        let mut queue = VecDeque::from([from]);
        while let Some(atom) = queue.pop_front() {
            if atom == to {
                let mut path = vec![to];
                let mut current = to;
                while current != from {
                    current = previous[current];
                    path.push(current);
                }
                path.reverse();
                return Some(path);
            }
            for &(next, bond) in &self.adjacency[atom] {
                if bond == skip_bond || previous[next] != usize::MAX {
                    continue;
                }
                previous[next] = atom;
                queue.push_back(next);
            }
        }
        None
    }

    fn smallest_cycles(&self) -> Vec<Vec<usize>> {
        let mut seen: BTreeSet<Vec<usize>> = BTreeSet::new();
        let mut rings = Vec::new();
        for (index, bond) in self.bonds.iter().enumerate() {
            if !self.ring_bond[index] {
                continue;
            }
            if let Some(path) = self.shortest_path_avoiding(bond.begin, bond.end, index) {
                let mut key = path.clone();
                key.sort_unstable();
                if seen.insert(key) {
                    rings.push(path);
                }
            }
        }
        rings.sort_by_key(Vec::len);
        rings
    }
}

/// Implicit hydrogen count for an atom written without brackets, or `None`
/// when the bonds exceed every allowed valence.
///
/// Aromatic atoms reserve one valence unit for the ring pi system and never
/// fail; they just receive no hydrogens when saturated.
pub fn implicit_hydrogens(element: &Element, aromatic: bool, bond_valence: u8) -> Option<u8> {
    let valences = element.default_valences;
    let max = *valences.last()?;
    if aromatic {
        let lowest = valences[0];
        if bond_valence > max {
            return None;
        }
        return Some(lowest.saturating_sub(bond_valence + 1));
    }
    valences
        .iter()
        .find(|v| **v >= bond_valence)
        .map(|v| v - bond_valence)
}

/// Bridges are the only non-ring bonds; found with Tarjan's low-link.
fn find_ring_bonds(atom_count: usize, bonds: &[Bond], adjacency: &[Vec<(usize, usize)>]) -> Vec<bool> {
    let mut discovery = vec![usize::MAX; atom_count];
    let mut low = vec![0usize; atom_count];
    let mut is_bridge = vec![false; bonds.len()];
    let mut timer = 0;

    for root in 0..atom_count {
        if discovery[root] != usize::MAX {
            continue;
        }
        // Iterative DFS: (atom, parent bond, next neighbor position).
        let mut stack: Vec<(usize, Option<usize>, usize)> = vec![(root, None, 0)];
        discovery[root] = timer;
        low[root] = timer;
        timer += 1;

        while let Some(frame) = stack.last_mut() {
            let (atom, parent_bond, position) = *frame;
            if position < adjacency[atom].len() {
                frame.2 += 1;
                let (next, bond) = adjacency[atom][position];
                if Some(bond) == parent_bond {
                    continue;
                }
                if discovery[next] == usize::MAX {
                    discovery[next] = timer;
                    low[next] = timer;
                    timer += 1;
                    stack.push((next, Some(bond), 0));
                } else {
                    low[atom] = low[atom].min(discovery[next]);
                }
            } else {
                stack.pop();
                if let (Some(bond), Some(parent)) = (parent_bond, stack.last()) {
                    let parent_atom = parent.0;
                    low[parent_atom] = low[parent_atom].min(low[atom]);
                    if low[atom] > discovery[parent_atom] {
                        is_bridge[bond] = true;
                    }
                }
            }
        }
    }

    is_bridge.into_iter().map(|bridge| !bridge).collect()
}

fn count_components(atom_count: usize, adjacency: &[Vec<(usize, usize)>]) -> usize {
    let mut seen = vec![false; atom_count];
    let mut count = 0;
    for start in 0..atom_count {
        if seen[start] {
            continue;
        }
        count += 1;
        let mut stack = vec![start];
        seen[start] = true;
        while let Some(atom) = stack.pop() {
            for &(next, _) in &adjacency[atom] {
                if !seen[next] {
                    seen[next] = true;
                    stack.push(next);
                }
            }
        }
    }
    count
}

#[cfg(test)]
pub(crate) fn plain_atom(symbol: &str, aromatic: bool) -> Option<Atom> {
    Some(Atom {
        element: elements::by_symbol(symbol)?,
        aromatic,
        charge: 0,
        isotope: None,
        hydrogens: 0,
    })
}
