//! Seeded train/test splits and k-fold partitions.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::error::{Result, TrainError};

/// Positions (into the projected rows) of each partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n` with `seed` and cut it at `train_ratio`.
///
/// The test partition gets `ceil(n * (1 - train_ratio))` rows, so 12 rows at
/// 0.8 split 9/3. Rounding noise in `1 - train_ratio` is ignored: 1000 rows at
/// 0.7 split 700/300. At least two training rows and one test row are
/// required.
pub fn train_test_split(n: usize, train_ratio: f64, seed: u64) -> Result<TrainTestSplit> {
    let n_test = test_rows(n, train_ratio);
    let n_train = n.saturating_sub(n_test);
    if n_train < 2 || n_test < 1 {
        return Err(TrainError::InsufficientData(format!(
            "{n} rows give {n_train} training and {n_test} test rows; need at least 2 and 1"
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);
    let test = order.split_off(n_train);
    Ok(TrainTestSplit { train: order, test })
}

fn test_rows(n: usize, train_ratio: f64) -> usize {
    let exact = (n as f64) * (1.0 - train_ratio);
    (exact - RATIO_TOLERANCE * exact.max(1.0)).ceil().max(0.0) as usize
}

/// Relative slack below which a fractional test size counts as whole.
const RATIO_TOLERANCE: f64 = 1e-9;

/// Contiguous folds over `0..n`; the first `n % k` folds hold one extra row.
/// `k` is capped at `n`.
pub fn k_folds(n: usize, k: usize) -> Vec<Vec<usize>> {
    let k = k.min(n).max(1);
    let base = n / k;
    let extra = n % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = base + usize::from(fold < extra);
        folds.push((start..start + size).collect());
        start += size;
    }
    folds
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_sizes() {
        let split = train_test_split(100, 0.8, 42).unwrap();
        assert_eq!(split.train.len(), 80);
        assert_eq!(split.test.len(), 20);

        let split = train_test_split(12, 0.8, 42).unwrap();
        assert_eq!(split.test.len(), 3);
        assert_eq!(split.train.len(), 9);
    }

    #[test]
    fn test_split_sizes_ignore_float_noise() {
        for (n, ratio, train, test) in [
            (1000, 0.7, 700, 300),
            (10, 0.7, 7, 3),
            (10, 0.9, 9, 1),
            (100, 0.9, 90, 10),
            (20, 0.85, 17, 3),
        ] {
            let split = train_test_split(n, ratio, 42).unwrap();
            assert_eq!(
                (split.train.len(), split.test.len()),
                (train, test),
                "{n} rows at {ratio}"
            );
        }
    }

    #[test]
    fn test_split_is_a_partition() {
        let split = train_test_split(50, 0.7, 1).unwrap();
        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_split() {
        assert_eq!(
            train_test_split(40, 0.8, 42).unwrap(),
            train_test_split(40, 0.8, 42).unwrap()
        );
        assert_ne!(
            train_test_split(40, 0.8, 42).unwrap(),
            train_test_split(40, 0.8, 43).unwrap()
        );
    }

    #[test]
    fn test_split_too_small() {
        let err = train_test_split(2, 0.8, 42).unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_DATA");
        assert!(train_test_split(3, 0.5, 42).is_err());
        assert!(train_test_split(4, 0.5, 42).is_ok());
    }

    #[test]
    fn test_k_folds() {
        let folds = k_folds(7, 3);
        assert_eq!(folds, vec![vec![0, 1, 2], vec![3, 4], vec![5, 6]]);
        assert_eq!(k_folds(2, 5).len(), 2);
    }
}
