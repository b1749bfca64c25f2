//! Periodic table data needed for SMILES reading and mass descriptors.

/// Static data for one element.
#[derive(Debug, PartialEq)]
pub struct Element {
    pub symbol: &'static str,
    pub atomic_number: u8,
    /// Standard atomic weight.
    pub average_mass: f64,
    /// Mass of the most abundant isotope.
    pub monoisotopic_mass: f64,
    /// Allowed valences for atoms written without brackets, ascending.
    /// Empty for elements outside the organic subset.
    pub default_valences: &'static [u8],
    /// Element may be written in lowercase as an aromatic atom.
    pub aromatic_capable: bool,
}

impl Element {
    /// Member of the SMILES organic subset (may appear without brackets).
    pub fn is_organic_subset(&self) -> bool {
        !self.default_valences.is_empty()
    }

    pub fn is_hydrogen(&self) -> bool {
        self.atomic_number == 1
    }

    pub fn is_carbon(&self) -> bool {
        self.atomic_number == 6
    }

    pub fn is_halogen(&self) -> bool {
        matches!(self.atomic_number, 9 | 17 | 35 | 53)
    }

    /// Neither carbon nor hydrogen.
    pub fn is_hetero(&self) -> bool {
        !self.is_carbon() && !self.is_hydrogen()
    }
}

macro_rules! element {
    ($symbol:literal, $z:literal, $avg:literal, $mono:literal, [$($v:literal),*], $aromatic:literal) => {
        Element {
            symbol: $symbol,
            atomic_number: $z,
            average_mass: $avg,
            monoisotopic_mass: $mono,
            default_valences: &[$($v),*],
            aromatic_capable: $aromatic,
        }
    };
}

static ELEMENTS: &[Element] = &[
    element!("H", 1, 1.008, 1.007825032, [], false),
    element!("He", 2, 4.0026, 4.002603254, [], false),
    element!("Li", 3, 6.94, 7.016004, [], false),
    element!("Be", 4, 9.0122, 9.012182, [], false),
    element!("B", 5, 10.81, 11.0093055, [3], true),
    element!("C", 6, 12.011, 12.0, [4], true),
    element!("N", 7, 14.007, 14.003074005, [3, 5], true),
    element!("O", 8, 15.999, 15.994914622, [2], true),
    element!("F", 9, 18.998, 18.998403205, [1], false),
    element!("Ne", 10, 20.180, 19.99244018, [], false),
    element!("Na", 11, 22.990, 22.98976928, [], false),
    element!("Mg", 12, 24.305, 23.9850417, [], false),
    element!("Al", 13, 26.982, 26.98153863, [], false),
    element!("Si", 14, 28.085, 27.976926533, [], false),
    element!("P", 15, 30.974, 30.97376163, [3, 5], true),
    element!("S", 16, 32.06, 31.972071, [2, 4, 6], true),
    element!("Cl", 17, 35.45, 34.968852682, [1], false),
    element!("Ar", 18, 39.948, 39.962383123, [], false),
    element!("K", 19, 39.098, 38.96370668, [], false),
    element!("Ca", 20, 40.078, 39.96259098, [], false),
    element!("Ti", 22, 47.867, 47.9479463, [], false),
    element!("Cr", 24, 51.996, 51.9405075, [], false),
    element!("Mn", 25, 54.938, 54.9380451, [], false),
    element!("Fe", 26, 55.845, 55.9349375, [], false),
    element!("Co", 27, 58.933, 58.933195, [], false),
    element!("Ni", 28, 58.693, 57.9353429, [], false),
    element!("Cu", 29, 63.546, 62.9295975, [], false),
    element!("Zn", 30, 65.38, 63.9291422, [], false),
    element!("Ga", 31, 69.723, 68.9255736, [], false),
    element!("Ge", 32, 72.630, 73.9211778, [], false),
    element!("As", 33, 74.922, 74.9215965, [], true),
    element!("Se", 34, 78.971, 79.9165213, [], true),
    element!("Br", 35, 79.904, 78.9183371, [1], false),
    element!("Kr", 36, 83.798, 83.911507, [], false),
    element!("Rb", 37, 85.468, 84.911789738, [], false),
    element!("Sr", 38, 87.62, 87.9056121, [], false),
    element!("Mo", 42, 95.95, 97.9054082, [], false),
    element!("Ru", 44, 101.07, 101.9043493, [], false),
    element!("Rh", 45, 102.91, 102.905504, [], false),
    element!("Pd", 46, 106.42, 105.903486, [], false),
    element!("Ag", 47, 107.87, 106.905097, [], false),
    element!("Cd", 48, 112.41, 113.9033585, [], false),
    element!("In", 49, 114.82, 114.903878, [], false),
    element!("Sn", 50, 118.71, 119.9021947, [], false),
    element!("Sb", 51, 121.76, 120.9038157, [], false),
    element!("Te", 52, 127.60, 129.9062244, [], true),
    element!("I", 53, 126.90, 126.904473, [1], false),
    element!("Xe", 54, 131.29, 131.9041535, [], false),
    element!("Cs", 55, 132.91, 132.905451933, [], false),
    element!("Ba", 56, 137.33, 137.9052472, [], false),
    element!("Gd", 64, 157.25, 157.9241039, [], false),
    element!("W", 74, 183.84, 183.9509312, [], false),
    element!("Pt", 78, 195.08, 194.9647911, [], false),
    element!("Au", 79, 196.97, 196.9665687, [], false),
    element!("Hg", 80, 200.59, 201.970643, [], false),
    element!("Tl", 81, 204.38, 204.9744275, [], false),
    element!("Pb", 82, 207.2, 207.9766521, [], false),
    element!("Bi", 83, 208.98, 208.9803987, [], false),
];

/// Look up an element by its capitalized symbol (`"Cl"`, not `"CL"`).
pub fn by_symbol(symbol: &str) -> Option<&'static Element> {
    ELEMENTS.iter().find(|element| element.symbol == symbol)
}

/// Look up an element by atomic number.
pub fn by_atomic_number(atomic_number: u8) -> Option<&'static Element> {
    ELEMENTS
        .iter()
        .find(|element| element.atomic_number == atomic_number)
}

/// Hydrogen, used for implicit hydrogen masses.
pub fn hydrogen() -> &'static Element {
    &ELEMENTS[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(by_symbol("Cl").unwrap().atomic_number, 17);
        assert_eq!(by_atomic_number(6).unwrap().symbol, "C");
        assert!(by_symbol("Xx").is_none());
        assert!(hydrogen().is_hydrogen());
    }

    #[test]
    fn test_organic_subset() {
        for symbol in ["B", "C", "N", "O", "P", "S", "F", "Cl", "Br", "I"] {
            assert!(by_symbol(symbol).unwrap().is_organic_subset(), "{symbol}");
        }
        assert!(!by_symbol("Na").unwrap().is_organic_subset());
    }

    #[test]
    fn test_atomic_numbers_unique() {
        let mut seen = std::collections::HashSet::new();
        for element in ELEMENTS {
            assert!(seen.insert(element.atomic_number), "{}", element.symbol);
        }
    }
}
