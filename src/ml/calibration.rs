//! Isotonic probability calibration
//!
//! Calibration is fitted on held-out rows against the classifier's raw
//! log-odds. The mapping is monotone non-decreasing, piecewise linear between
//! the fitted points, constant beyond them and always within `[0, 1]`.

use super::gbm::GradientBoostedClassifier;
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Monotone step-to-linear mapping from score to probability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotonicCalibrator {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl IsotonicCalibrator {
    /// Pool-adjacent-violators fit of `labels` (0/1) against `scores`.
    ///
    /// Equal scores are merged into one point carrying their mean label.
    pub fn fit(scores: &[f64], labels: &[f64]) -> Result<Self> {
        if scores.is_empty() || scores.len() != labels.len() {
            return Err(ForecastError::InvalidInput(format!(
                "calibration needs matching non-empty inputs ({} scores, {} labels)",
                scores.len(),
                labels.len()
            )));
        }
        if scores.iter().chain(labels).any(|v| !v.is_finite()) {
            return Err(ForecastError::InvalidInput(
                "non-finite calibration input".to_string(),
            ));
        }

        let mut pairs: Vec<(f64, f64)> = scores.iter().copied().zip(labels.iter().copied()).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        // (x, label sum, weight) per distinct score
        let mut points: Vec<(f64, f64, f64)> = Vec::new();
        for (x, y) in pairs {
            match points.last_mut() {
                Some(last) if last.0 == x => {
                    last.1 += y;
                    last.2 += 1.0;
                }
                _ => points.push((x, y, 1.0)),
            }
        }

        // Blocks of (mean, weight, number of points)
        let mut blocks: Vec<(f64, f64, usize)> = Vec::with_capacity(points.len());
        for &(_, sum, weight) in &points {
            blocks.push((sum / weight, weight, 1));
            while blocks.len() > 1 {
                let (mean, w, n) = blocks[blocks.len() - 1];
                let (prev_mean, prev_w, prev_n) = blocks[blocks.len() - 2];
                if prev_mean <= mean {
                    break;
                }
                blocks.pop();
                let total = prev_w + w;
                if let Some(prev) = blocks.last_mut() {
                    *prev = ((prev_mean * prev_w + mean * w) / total, total, prev_n + n);
                }
            }
        }

        let xs = points.iter().map(|p| p.0).collect();
        let ys = blocks
            .iter()
            .flat_map(|&(mean, _, n)| std::iter::repeat(mean.clamp(0.0, 1.0)).take(n))
            .collect();
        Ok(Self { xs, ys })
    }

    pub fn transform(&self, score: f64) -> f64 {
        let (Some(&first_x), Some(&last_x)) = (self.xs.first(), self.xs.last()) else {
            return 0.5;
        };
        let last_y = self.ys[self.ys.len() - 1];
        if score.is_nan() {
            return 0.5;
        }
        if score <= first_x {
            return self.ys[0];
        }
        if score >= last_x {
            return last_y;
        }

        let i = self.xs.partition_point(|x| *x <= score);
        let (x0, x1) = (self.xs[i - 1], self.xs[i]);
        let (y0, y1) = (self.ys[i - 1], self.ys[i]);
        let p = y0 + (y1 - y0) * (score - x0) / (x1 - x0);
        p.clamp(0.0, 1.0)
    }

    pub fn n_points(&self) -> usize {
        self.xs.len()
    }
}

/// Boosted classifier with isotonic post-calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedClassifier {
    base: GradientBoostedClassifier,
    calibrator: IsotonicCalibrator,
}

impl CalibratedClassifier {
    /// Calibrate an already fitted classifier on the rows `x`/`y`
    pub fn fit(base: GradientBoostedClassifier, x: &[Vec<f64>], y: &[f64]) -> Result<Self> {
        let scores: Vec<f64> = x.iter().map(|row| base.decision_function(row)).collect();
        let calibrator = IsotonicCalibrator::fit(&scores, y)?;
        Ok(Self { base, calibrator })
    }

    pub fn predict_proba(&self, x: &[f64]) -> f64 {
        self.calibrator.transform(self.base.decision_function(x))
    }

    pub fn uncalibrated_proba(&self, x: &[f64]) -> f64 {
        self.base.predict_proba(x)
    }

    pub fn n_features(&self) -> usize {
        self.base.n_features()
    }
}
