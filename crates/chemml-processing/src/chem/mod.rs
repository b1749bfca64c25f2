//! Chemistry layer: SMILES reading and writing, descriptors, fingerprints,
//! the feature cache and the column-level extractor.
//!
//! The molecule model is small. It carries what the descriptors
//! and fingerprints need (elements, charges, hydrogens, bond orders, rings)
//! and drops stereochemistry.

mod aromaticity;
pub mod cache;
pub mod canonical;
pub mod descriptors;
pub mod elements;
pub mod extractor;
pub mod fingerprint;
pub mod molecule;
pub mod smiles;

pub use cache::{CacheStats, FeatureCache, FeatureKind};
pub use canonical::{CanonicalSmiles, write_canonical};
pub use descriptors::DescriptorKind;
pub use extractor::ChemFeatureExtractor;
pub use fingerprint::{Fingerprint, FingerprintKind};
pub use molecule::{Atom, Bond, BondOrder, Molecule};
pub use smiles::parse_smiles;
