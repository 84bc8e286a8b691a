//! Per-column standardization for exogenous features.
//!
//! The scaler's fitted mean/variance are per-position over the full column
//! set, so it must always transform the full set before any slicing to the
//! active subset. `transform` therefore only accepts a matrix carrying
//! exactly the fitted columns and returns a [`ScaledMatrix`] that the caller
//! narrows with an explicit [`ScaledMatrix::select`].

use crate::error::{DemandError, Result};
use crate::features::FeatureMatrix;
use serde::{Deserialize, Serialize};

/// Standardization transform fitted over the full candidate column set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    columns: Vec<String>,
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    /// Fit per-column mean and standard deviation over the given matrix
    pub fn fit(matrix: &FeatureMatrix) -> Result<Self> {
        if matrix.is_empty() {
            return Err(DemandError::InsufficientHistory { needed: 1, got: 0 });
        }

        let width = matrix.columns().len();
        let n = matrix.len() as f64;
        let mut means = vec![0.0; width];
        let mut stds = vec![0.0; width];

        for row in matrix.rows() {
            for (j, v) in row.iter().enumerate() {
                means[j] += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }
        for row in matrix.rows() {
            for (j, v) in row.iter().enumerate() {
                stds[j] += (v - means[j]).powi(2);
            }
        }
        for s in &mut stds {
            *s = (*s / n).sqrt();
            // A constant column carries no signal; unit spread keeps the
            // transform finite and the column at zero after centering.
            if *s == 0.0 {
                *s = 1.0;
            }
        }

        Ok(Self {
            columns: matrix.columns().to_vec(),
            means,
            stds,
        })
    }

    /// The full column set this scaler was fitted on, in order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Standardize a matrix carrying exactly the fitted columns.
    ///
    /// A matrix with a different column set is rejected rather than
    /// reordered; pre-sliced inputs would silently produce wrong statistics.
    pub fn transform(&self, matrix: &FeatureMatrix) -> Result<ScaledMatrix> {
        if matrix.columns() != self.columns.as_slice() {
            return Err(DemandError::FeatureContractMismatch(format!(
                "scaler fitted on [{}] but given [{}]",
                self.columns.join(", "),
                matrix.columns().join(", ")
            )));
        }

        let rows = matrix
            .rows()
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(j, v)| (v - self.means[j]) / self.stds[j])
                    .collect()
            })
            .collect();

        Ok(ScaledMatrix {
            columns: self.columns.clone(),
            rows,
        })
    }
}

/// A fully standardized feature matrix awaiting explicit narrowing
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl ScaledMatrix {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Narrow to the active column subset by index lookup in the full set.
    ///
    /// An active column missing from the full set means the artifact is
    /// corrupt or version-skewed.
    pub fn select(&self, active: &[String]) -> Result<Vec<Vec<f64>>> {
        let indices = active
            .iter()
            .map(|c| {
                self.columns.iter().position(|f| f == c).ok_or_else(|| {
                    DemandError::FeatureContractMismatch(format!(
                        "active column '{}' not in full column list [{}]",
                        c,
                        self.columns.join(", ")
                    ))
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        Ok(self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i]).collect())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn matrix(columns: &[&str], rows: Vec<Vec<f64>>) -> FeatureMatrix {
        FeatureMatrix::new(columns.iter().map(|c| c.to_string()).collect(), rows).unwrap()
    }

    #[test]
    fn transform_centers_and_scales() {
        let m = matrix(&["a", "b"], vec![vec![1.0, 10.0], vec![3.0, 30.0]]);
        let scaler = StandardScaler::fit(&m).unwrap();
        let scaled = scaler.transform(&m).unwrap();

        assert_relative_eq!(scaled.rows()[0][0], -1.0);
        assert_relative_eq!(scaled.rows()[1][0], 1.0);
        assert_relative_eq!(scaled.rows()[0][1], -1.0);
        assert_relative_eq!(scaled.rows()[1][1], 1.0);
    }

    #[test]
    fn constant_column_scales_to_zero() {
        let m = matrix(&["a"], vec![vec![5.0], vec![5.0], vec![5.0]]);
        let scaler = StandardScaler::fit(&m).unwrap();
        let scaled = scaler.transform(&m).unwrap();
        assert!(scaled.rows().iter().all(|r| r[0] == 0.0));
    }

    #[test]
    fn transform_rejects_reordered_columns() {
        let full = matrix(&["a", "b"], vec![vec![1.0, 2.0]]);
        let scaler = StandardScaler::fit(&full).unwrap();
        let swapped = matrix(&["b", "a"], vec![vec![2.0, 1.0]]);
        assert!(matches!(
            scaler.transform(&swapped),
            Err(DemandError::FeatureContractMismatch(_))
        ));
    }

    #[test]
    fn select_reorders_by_full_set_index() {
        let m = matrix(
            &["a", "b", "c"],
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        );
        let scaler = StandardScaler::fit(&m).unwrap();
        let scaled = scaler.transform(&m).unwrap();

        let picked = scaled
            .select(&["c".to_string(), "a".to_string()])
            .unwrap();
        assert_eq!(picked[0].len(), 2);
        assert_relative_eq!(picked[0][0], scaled.rows()[0][2]);
        assert_relative_eq!(picked[0][1], scaled.rows()[0][0]);
    }

    #[test]
    fn select_unknown_column_is_contract_mismatch() {
        let m = matrix(&["a"], vec![vec![1.0], vec![2.0]]);
        let scaled = StandardScaler::fit(&m).unwrap().transform(&m).unwrap();
        assert!(matches!(
            scaled.select(&["ghost".to_string()]),
            Err(DemandError::FeatureContractMismatch(_))
        ));
    }

    /// Transform-full-then-slice must not match the buggy path that feeds a
    /// pre-sliced matrix through the full scaler's leading positions. The
    /// two only coincide when the active set is the full set.
    #[test]
    fn full_then_slice_differs_from_positional_misapplication() {
        let full = matrix(
            &["a", "b"],
            vec![vec![1.0, 100.0], vec![2.0, 50.0], vec![3.0, 75.0]],
        );
        let full_scaler = StandardScaler::fit(&full).unwrap();
        let correct = full_scaler
            .transform(&full)
            .unwrap()
            .select(&["b".to_string()])
            .unwrap();

        // Buggy path: the sliced "b" column lands at position 0 and picks up
        // column "a"'s fitted mean/variance.
        let buggy: Vec<f64> = full
            .rows()
            .iter()
            .map(|row| (row[1] - full_scaler.means[0]) / full_scaler.stds[0])
            .collect();

        assert!(correct
            .iter()
            .zip(&buggy)
            .any(|(c, b)| (c[0] - b).abs() > 1e-9));

        // With active == all the slice is the identity.
        let all = full_scaler.transform(&full).unwrap();
        let selected = all
            .select(&["a".to_string(), "b".to_string()])
            .unwrap();
        for (lhs, rhs) in selected.iter().zip(all.rows()) {
            assert_relative_eq!(lhs[0], rhs[0]);
            assert_relative_eq!(lhs[1], rhs[1]);
        }
    }
}
