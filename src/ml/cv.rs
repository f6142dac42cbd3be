//! Time-series k-fold splitting
//!
//! Rows are split into `k + 1` equal blocks (the remainder goes to the first
//! training block). Fold `i` validates on block `i + 1` and trains on every
//! row before it, so training rows always precede validation rows.

use crate::error::{ForecastError, Result};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub index: usize,
    pub train: Range<usize>,
    pub validation: Range<usize>,
}

impl Fold {
    pub fn train_indices(&self) -> Vec<usize> {
        self.train.clone().collect()
    }

    pub fn validation_indices(&self) -> Vec<usize> {
        self.validation.clone().collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TimeSeriesSplit {
    n_splits: usize,
}

impl TimeSeriesSplit {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Rows needed to form every fold
    pub fn min_rows(&self) -> usize {
        self.n_splits + 1
    }

    pub fn split(&self, n_rows: usize) -> Result<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(ForecastError::InvalidInput(format!(
                "need at least 2 splits, got {}",
                self.n_splits
            )));
        }
        if n_rows < self.min_rows() {
            return Err(ForecastError::InsufficientHistory {
                rows: n_rows,
                required: self.min_rows(),
            });
        }

        let test_size = n_rows / (self.n_splits + 1);
        let first_test = n_rows - self.n_splits * test_size;
        Ok((0..self.n_splits)
            .map(|i| {
                let start = first_test + i * test_size;
                Fold {
                    index: i,
                    train: 0..start,
                    validation: start..start + test_size,
                }
            })
            .collect())
    }
}
