//! Walk-forward splitting for time-ordered data.
//!
//! Fold `k` trains on everything before its test window (expanding window)
//! and tests on a contiguous block that follows it. Test windows never
//! overlap and never precede their training data.

use crate::domain::errors::OptimizationError;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Range<usize>,
    pub test: Range<usize>,
}

/// Splits `len` rows into `folds` walk-forward folds.
///
/// The first `min_train_fraction` of rows only ever train; the rest is cut
/// into `folds` test windows, the last one absorbing the remainder.
pub fn walk_forward_folds(
    len: usize,
    folds: usize,
    min_train_fraction: f64,
) -> Result<Vec<Fold>, OptimizationError> {
    if folds == 0 {
        return Err(OptimizationError::InvalidSettings {
            reason: "cv_folds must be >= 1".to_string(),
        });
    }
    if !(0.0..1.0).contains(&min_train_fraction) {
        return Err(OptimizationError::InvalidSettings {
            reason: format!("min_train_fraction {} not in [0, 1)", min_train_fraction),
        });
    }

    let initial_train = ((len as f64 * min_train_fraction).ceil() as usize).max(1);
    let remaining = len.saturating_sub(initial_train);
    if remaining < folds {
        return Err(OptimizationError::EmptyDataset {
            reason: format!(
                "{} rows cannot form {} walk-forward folds after {} training rows",
                len, folds, initial_train
            ),
        });
    }

    let size = remaining / folds;
    Ok((0..folds)
        .map(|k| {
            let start = initial_train + k * size;
            let end = if k + 1 == folds { len } else { start + size };
            Fold {
                train: 0..start,
                test: start..end,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folds_are_contiguous_and_ordered() {
        let folds = walk_forward_folds(103, 3, 0.4).unwrap();
        assert_eq!(folds.len(), 3);
        assert_eq!(folds[0].test.start, 42);
        for pair in folds.windows(2) {
            assert_eq!(pair[0].test.end, pair[1].test.start);
        }
        for fold in &folds {
            assert_eq!(fold.train.start, 0);
            assert_eq!(fold.train.end, fold.test.start);
            assert!(!fold.test.is_empty());
        }
        assert_eq!(folds.last().unwrap().test.end, 103);
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        assert!(matches!(
            walk_forward_folds(100, 0, 0.4),
            Err(OptimizationError::InvalidSettings { .. })
        ));
        assert!(walk_forward_folds(100, 3, 1.0).is_err());
        assert!(matches!(
            walk_forward_folds(3, 5, 0.5),
            Err(OptimizationError::EmptyDataset { .. })
        ));
    }

    #[test]
    fn test_single_fold_covers_tail() {
        let folds = walk_forward_folds(10, 1, 0.5).unwrap();
        assert_eq!(
            folds,
            vec![Fold {
                train: 0..5,
                test: 5..10
            }]
        );
    }
}
