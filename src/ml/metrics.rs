//! Out-of-fold evaluation metrics

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub r2: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    /// `None` when the out-of-fold labels contain a single class
    pub auc: Option<f64>,
}

/// Metrics persisted in the artifact metadata
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrainingMetrics {
    Regression(RegressionMetrics),
    Classification(ClassificationMetrics),
}

impl TrainingMetrics {
    pub fn regression(y_true: &[f64], y_pred: &[f64]) -> Self {
        TrainingMetrics::Regression(RegressionMetrics {
            mae: mean_absolute_error(y_true, y_pred),
            r2: r2_score(y_true, y_pred),
        })
    }

    pub fn classification(labels: &[f64], probabilities: &[f64]) -> Self {
        TrainingMetrics::Classification(ClassificationMetrics {
            accuracy: accuracy(labels, probabilities),
            auc: roc_auc(labels, probabilities),
        })
    }
}

/// Mean absolute error, 0.0 for empty input
pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).abs())
        .sum::<f64>()
        / y_true.len() as f64
}

/// Coefficient of determination.
///
/// Constant targets score 1.0 when predicted exactly, otherwise 0.0.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Share of rows whose thresholded probability (>= 0.5) matches the label
pub fn accuracy(labels: &[f64], probabilities: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let hits = labels
        .iter()
        .zip(probabilities)
        .filter(|(y, p)| (**p >= 0.5) == (**y >= 0.5))
        .count();
    hits as f64 / labels.len() as f64
}

/// Area under the ROC curve via the rank-sum statistic, ties averaged
pub fn roc_auc(labels: &[f64], scores: &[f64]) -> Option<f64> {
    let positives = labels.iter().filter(|y| **y >= 0.5).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // 1-based average rank of the tie group
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = rank;
        }
        i = j + 1;
    }

    let rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(y, _)| **y >= 0.5)
        .map(|(_, r)| r)
        .sum();
    let p = positives as f64;
    let n = negatives as f64;
    Some((rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mae() {
        assert!((mean_absolute_error(&[1.0, 2.0, 3.0], &[1.5, 2.0, 2.0]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_r2() {
        assert_eq!(r2_score(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 1.0);
        // predicting the mean scores zero
        assert!(r2_score(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0]).abs() < 1e-12);
        assert_eq!(r2_score(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
        assert_eq!(r2_score(&[5.0, 5.0], &[4.0, 5.0]), 0.0);
    }

    #[test]
    fn test_accuracy_threshold_inclusive() {
        assert_eq!(accuracy(&[1.0, 0.0, 1.0, 0.0], &[0.5, 0.49, 0.2, 0.9]), 0.5);
    }

    #[test]
    fn test_auc_perfect_and_inverted() {
        assert_eq!(roc_auc(&[0.0, 0.0, 1.0, 1.0], &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&[1.0, 1.0, 0.0, 0.0], &[0.1, 0.2, 0.8, 0.9]), Some(0.0));
    }

    #[test]
    fn test_auc_with_ties() {
        // all scores tied: chance level
        assert_eq!(roc_auc(&[0.0, 1.0, 0.0, 1.0], &[0.5; 4]), Some(0.5));
        // one discordant pair out of four
        let auc = roc_auc(&[0.0, 1.0, 0.0, 1.0], &[0.1, 0.3, 0.4, 0.9]).unwrap();
        assert!((auc - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_auc_single_class_is_undefined() {
        assert_eq!(roc_auc(&[1.0, 1.0], &[0.2, 0.9]), None);
        assert_eq!(roc_auc(&[], &[]), None);
    }

    #[test]
    fn test_metrics_json_shapes() {
        let reg = TrainingMetrics::regression(&[1.0, 2.0], &[1.0, 2.0]);
        let json = serde_json::to_value(reg).unwrap();
        assert_eq!(json["mae"], 0.0);
        assert_eq!(json["r2"], 1.0);

        let cls = TrainingMetrics::classification(&[1.0, 1.0], &[0.7, 0.4]);
        let json = serde_json::to_value(cls).unwrap();
        assert_eq!(json["accuracy"], 0.5);
        assert!(json["auc"].is_null());

        let back: TrainingMetrics = serde_json::from_value(json).unwrap();
        assert_eq!(back, cls);
    }
}
