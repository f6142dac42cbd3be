//! Histogram gradient-boosted decision trees
//!
//! Features are bucketed into at most `max_bins` bins once per fit. Each
//! boosting round grows one tree best-first: the open leaf with the largest
//! split gain is expanded next, until `max_leaf_nodes` leaves exist or no
//! split leaves `min_samples_leaf` rows on both sides. Only the smaller
//! child's histogram is accumulated from rows; its sibling is the parent
//! minus that child.
//!
//! Fitted models are plain data and serialize with serde.

use crate::error::{ForecastError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::ops::{AddAssign, Sub};

/// Children with less total hessian than this are not split
const MIN_CHILD_HESSIAN: f64 = 1e-3;
/// Class prior clipping for the logistic baseline
const PRIOR_EPSILON: f64 = 1e-15;

/// Boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbmParams {
    /// Number of boosting rounds (one tree each)
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
    /// Shrinkage applied to every leaf value
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// L2 penalty on leaf values
    #[serde(default = "default_l2_regularization")]
    pub l2_regularization: f64,
    #[serde(default = "default_max_leaf_nodes")]
    pub max_leaf_nodes: usize,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// At most 255 so bin codes fit in a byte
    #[serde(default = "default_max_bins")]
    pub max_bins: usize,
    /// Fraction of features considered per tree
    #[serde(default = "default_feature_fraction")]
    pub feature_fraction: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_max_iter() -> usize {
    500
}
fn default_learning_rate() -> f64 {
    0.05
}
fn default_l2_regularization() -> f64 {
    1e-2
}
fn default_max_leaf_nodes() -> usize {
    31
}
fn default_min_samples_leaf() -> usize {
    20
}
fn default_max_bins() -> usize {
    255
}
fn default_feature_fraction() -> f64 {
    1.0
}
fn default_seed() -> u64 {
    42
}

impl Default for GbmParams {
    fn default() -> Self {
        Self::regression_defaults()
    }
}

impl GbmParams {
    pub fn regression_defaults() -> Self {
        Self {
            max_iter: default_max_iter(),
            learning_rate: default_learning_rate(),
            l2_regularization: default_l2_regularization(),
            max_leaf_nodes: default_max_leaf_nodes(),
            min_samples_leaf: default_min_samples_leaf(),
            max_bins: default_max_bins(),
            feature_fraction: default_feature_fraction(),
            seed: default_seed(),
        }
    }

    pub fn classification_defaults() -> Self {
        Self {
            max_iter: 600,
            ..Self::regression_defaults()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(invalid("learning_rate must be positive"));
        }
        if self.l2_regularization < 0.0 {
            return Err(invalid("l2_regularization must be non-negative"));
        }
        if self.max_leaf_nodes < 2 {
            return Err(invalid("max_leaf_nodes must be at least 2"));
        }
        if self.min_samples_leaf == 0 {
            return Err(invalid("min_samples_leaf must be at least 1"));
        }
        if !(2..=255).contains(&self.max_bins) {
            return Err(invalid("max_bins must be within 2..=255"));
        }
        let fraction = self.feature_fraction;
        if fraction.is_nan() || fraction <= 0.0 || fraction > 1.0 {
            return Err(invalid("feature_fraction must be within (0, 1]"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> ForecastError {
    ForecastError::InvalidInput(msg.to_string())
}

// ==================== Trees ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Regression tree; rows with `x[feature] <= threshold` go left
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    // Missing or NaN values go right
                    let v = x.get(*feature).copied().unwrap_or(f64::NAN);
                    index = if v <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

// ==================== Binning ====================

/// Per-feature upper bin edges. Code `b` means `edges[b-1] < x <= edges[b]`.
#[derive(Debug, Clone)]
struct BinMapper {
    edges: Vec<Vec<f64>>,
}

impl BinMapper {
    fn fit(x: &[Vec<f64>], n_features: usize, max_bins: usize) -> Self {
        let edges = (0..n_features)
            .map(|f| bin_edges(x.iter().map(|row| row[f]).collect(), max_bins))
            .collect();
        Self { edges }
    }

    fn n_bins(&self, feature: usize) -> usize {
        self.edges[feature].len() + 1
    }

    /// Column-major bin codes
    fn transform(&self, x: &[Vec<f64>]) -> Vec<Vec<u8>> {
        self.edges
            .iter()
            .enumerate()
            .map(|(f, edges)| {
                x.iter()
                    .map(|row| edges.partition_point(|e| *e < row[f]) as u8)
                    .collect()
            })
            .collect()
    }
}

/// Midpoints between distinct values when they fit in `max_bins`,
/// otherwise data quantiles.
fn bin_edges(mut values: Vec<f64>, max_bins: usize) -> Vec<f64> {
    values.sort_by(f64::total_cmp);
    let mut distinct = values.clone();
    distinct.dedup();

    if distinct.len() <= max_bins {
        return distinct.windows(2).map(|w| (w[0] + w[1]) * 0.5).collect();
    }

    let n = values.len();
    let mut edges: Vec<f64> = (1..max_bins)
        .map(|i| values[i * (n - 1) / max_bins])
        .collect();
    edges.dedup();
    // The maximum must land in the last bin
    if edges.last().is_some_and(|e| *e >= values[n - 1]) {
        edges.pop();
    }
    edges
}

// ==================== Histograms ====================

#[derive(Debug, Clone, Copy, Default)]
struct BinStats {
    grad: f64,
    hess: f64,
    count: usize,
}

impl AddAssign for BinStats {
    fn add_assign(&mut self, rhs: Self) {
        self.grad += rhs.grad;
        self.hess += rhs.hess;
        self.count += rhs.count;
    }
}

impl Sub for BinStats {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            grad: self.grad - rhs.grad,
            hess: self.hess - rhs.hess,
            count: self.count.saturating_sub(rhs.count),
        }
    }
}

impl BinStats {
    fn score(&self, l2: f64) -> f64 {
        self.grad * self.grad / (self.hess + l2)
    }
}

#[derive(Debug, Clone)]
struct Histogram {
    bins: Vec<Vec<BinStats>>,
}

impl Histogram {
    fn subtract(&self, child: &Histogram) -> Histogram {
        let bins = self
            .bins
            .iter()
            .zip(child.bins.iter())
            .map(|(p, c)| p.iter().zip(c.iter()).map(|(p, c)| *p - *c).collect())
            .collect();
        Histogram { bins }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitInfo {
    gain: f64,
    feature: usize,
    bin: usize,
    left: BinStats,
}

struct OpenLeaf {
    node: usize,
    rows: Vec<usize>,
    hist: Histogram,
    sums: BinStats,
    split: Option<SplitInfo>,
}

/// Shared, read-only state for growing the trees of one fit
struct Grower<'a> {
    params: &'a GbmParams,
    mapper: &'a BinMapper,
    codes: &'a [Vec<u8>],
    grad: &'a [f64],
    hess: &'a [f64],
}

impl Grower<'_> {
    fn histogram(&self, features: &[usize], rows: &[usize]) -> Histogram {
        let mut bins = vec![Vec::new(); self.codes.len()];
        for &f in features {
            let mut stats = vec![BinStats::default(); self.mapper.n_bins(f)];
            let column = &self.codes[f];
            for &r in rows {
                let s = &mut stats[column[r] as usize];
                s.grad += self.grad[r];
                s.hess += self.hess[r];
                s.count += 1;
            }
            bins[f] = stats;
        }
        Histogram { bins }
    }

    fn sums(&self, rows: &[usize]) -> BinStats {
        let mut total = BinStats::default();
        for &r in rows {
            total += BinStats {
                grad: self.grad[r],
                hess: self.hess[r],
                count: 1,
            };
        }
        total
    }

    fn best_split(&self, hist: &Histogram, sums: BinStats, features: &[usize]) -> Option<SplitInfo> {
        let min_leaf = self.params.min_samples_leaf;
        if sums.count < 2 * min_leaf {
            return None;
        }

        let l2 = self.params.l2_regularization;
        let parent = sums.score(l2);
        let mut best: Option<SplitInfo> = None;

        for &f in features {
            let bins = &hist.bins[f];
            let mut left = BinStats::default();
            for (b, stats) in bins.iter().enumerate().take(bins.len().saturating_sub(1)) {
                left += *stats;
                let right = sums - left;
                if left.count < min_leaf || right.count < min_leaf {
                    continue;
                }
                if left.hess < MIN_CHILD_HESSIAN || right.hess < MIN_CHILD_HESSIAN {
                    continue;
                }
                let gain = left.score(l2) + right.score(l2) - parent;
                if gain > 0.0 && best.map_or(true, |s| gain > s.gain) {
                    best = Some(SplitInfo {
                        gain,
                        feature: f,
                        bin: b,
                        left,
                    });
                }
            }
        }
        best
    }

    fn grow(&self, features: &[usize], rows: Vec<usize>) -> Tree {
        let hist = self.histogram(features, &rows);
        let sums = self.sums(&rows);
        let split = self.best_split(&hist, sums, features);

        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut leaves = vec![OpenLeaf {
            node: 0,
            rows,
            hist,
            sums,
            split,
        }];

        while leaves.len() < self.params.max_leaf_nodes {
            let next = leaves
                .iter()
                .enumerate()
                .filter_map(|(i, leaf)| leaf.split.map(|s| (i, s.gain)))
                .fold(None, |best: Option<(usize, f64)>, (i, gain)| match best {
                    Some((_, g)) if g >= gain => best,
                    _ => Some((i, gain)),
                });
            let Some((index, _)) = next else { break };

            let leaf = leaves.remove(index);
            let Some(split) = leaf.split else { break };

            let column = &self.codes[split.feature];
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                .rows
                .into_iter()
                .partition(|&r| (column[r] as usize) <= split.bin);

            let (left_hist, right_hist) = if left_rows.len() <= right_rows.len() {
                let small = self.histogram(features, &left_rows);
                let large = leaf.hist.subtract(&small);
                (small, large)
            } else {
                let small = self.histogram(features, &right_rows);
                let large = leaf.hist.subtract(&small);
                (large, small)
            };

            let left_sums = split.left;
            let right_sums = leaf.sums - split.left;
            let left_node = nodes.len();
            let right_node = left_node + 1;
            nodes.push(Node::Leaf { value: 0.0 });
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[leaf.node] = Node::Split {
                feature: split.feature,
                threshold: self.mapper.edges[split.feature][split.bin],
                left: left_node,
                right: right_node,
            };

            leaves.push(OpenLeaf {
                node: left_node,
                split: self.best_split(&left_hist, left_sums, features),
                rows: left_rows,
                hist: left_hist,
                sums: left_sums,
            });
            leaves.push(OpenLeaf {
                node: right_node,
                split: self.best_split(&right_hist, right_sums, features),
                rows: right_rows,
                hist: right_hist,
                sums: right_sums,
            });
        }

        let l2 = self.params.l2_regularization;
        for leaf in leaves {
            let value = -leaf.sums.grad / (leaf.sums.hess + l2) * self.params.learning_rate;
            nodes[leaf.node] = Node::Leaf { value };
        }
        Tree { nodes }
    }
}

// ==================== Boosting ====================

#[derive(Debug, Clone, Copy)]
enum Loss {
    SquaredError,
    Logistic,
}

impl Loss {
    fn baseline(self, y: &[f64], weights: Option<&[f64]>) -> f64 {
        let (sum, total) = match weights {
            Some(w) => y
                .iter()
                .zip(w)
                .fold((0.0, 0.0), |(s, t), (y, w)| (s + y * w, t + w)),
            None => (y.iter().sum(), y.len() as f64),
        };
        let mean = if total > 0.0 { sum / total } else { 0.0 };
        match self {
            Loss::SquaredError => mean,
            Loss::Logistic => {
                let p = mean.clamp(PRIOR_EPSILON, 1.0 - PRIOR_EPSILON);
                (p / (1.0 - p)).ln()
            }
        }
    }

    fn gradients(self, y: &[f64], raw: &[f64], weights: Option<&[f64]>, grad: &mut [f64], hess: &mut [f64]) {
        for i in 0..y.len() {
            let w = weights.map_or(1.0, |w| w[i]);
            let (g, h) = match self {
                Loss::SquaredError => (raw[i] - y[i], 1.0),
                Loss::Logistic => {
                    let p = sigmoid(raw[i]);
                    (p - y[i], p * (1.0 - p))
                }
            };
            grad[i] = w * g;
            hess[i] = w * h;
        }
    }
}

pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ensemble {
    baseline: f64,
    trees: Vec<Tree>,
    n_features: usize,
}

impl Ensemble {
    fn fit(
        params: &GbmParams,
        x: &[Vec<f64>],
        y: &[f64],
        weights: Option<&[f64]>,
        loss: Loss,
    ) -> Result<Self> {
        params.validate()?;
        let n_features = check_matrix(x, y)?;
        if let Some(w) = weights {
            if w.len() != y.len() || w.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
                return Err(invalid("sample weights must be non-negative and match the rows"));
            }
        }

        let mapper = BinMapper::fit(x, n_features, params.max_bins);
        let codes = mapper.transform(x);

        let baseline = loss.baseline(y, weights);
        let mut raw = vec![baseline; y.len()];
        let mut grad = vec![0.0; y.len()];
        let mut hess = vec![0.0; y.len()];

        let mut rng = StdRng::seed_from_u64(params.seed);
        let all_features: Vec<usize> = (0..n_features).collect();
        let per_tree = ((n_features as f64 * params.feature_fraction).ceil() as usize).clamp(1, n_features);

        let mut trees = Vec::with_capacity(params.max_iter);
        for _ in 0..params.max_iter {
            loss.gradients(y, &raw, weights, &mut grad, &mut hess);

            let mut features = all_features.clone();
            if per_tree < n_features {
                features.shuffle(&mut rng);
                features.truncate(per_tree);
                features.sort_unstable();
            }

            let grower = Grower {
                params,
                mapper: &mapper,
                codes: &codes,
                grad: &grad,
                hess: &hess,
            };
            let tree = grower.grow(&features, (0..y.len()).collect());
            for (r, row) in x.iter().enumerate() {
                raw[r] += tree.predict(row);
            }
            trees.push(tree);
        }

        Ok(Self {
            baseline,
            trees,
            n_features,
        })
    }

    fn raw(&self, x: &[f64]) -> f64 {
        self.baseline + self.trees.iter().map(|t| t.predict(x)).sum::<f64>()
    }
}

/// Validates a row-major matrix and returns its width
fn check_matrix(x: &[Vec<f64>], y: &[f64]) -> Result<usize> {
    if x.is_empty() {
        return Err(invalid("cannot fit on zero rows"));
    }
    if x.len() != y.len() {
        return Err(ForecastError::InvalidInput(format!(
            "{} feature rows but {} targets",
            x.len(),
            y.len()
        )));
    }
    let width = x[0].len();
    if width == 0 {
        return Err(invalid("cannot fit without feature columns"));
    }
    if x.iter().any(|row| row.len() != width) {
        return Err(invalid("feature rows have differing widths"));
    }
    if x.iter().flatten().chain(y).any(|v| !v.is_finite()) {
        return Err(invalid("non-finite value in training data"));
    }
    Ok(width)
}

/// Least-squares boosted regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedRegressor {
    ensemble: Ensemble,
}

impl GradientBoostedRegressor {
    pub fn fit(params: &GbmParams, x: &[Vec<f64>], y: &[f64]) -> Result<Self> {
        let ensemble = Ensemble::fit(params, x, y, None, Loss::SquaredError)?;
        Ok(Self { ensemble })
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        self.ensemble.raw(x)
    }

    pub fn n_features(&self) -> usize {
        self.ensemble.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.ensemble.trees.len()
    }
}

/// Binary classifier boosted on log-loss. Labels are `0.0` / `1.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedClassifier {
    ensemble: Ensemble,
}

impl GradientBoostedClassifier {
    pub fn fit(
        params: &GbmParams,
        x: &[Vec<f64>],
        y: &[f64],
        sample_weight: Option<&[f64]>,
    ) -> Result<Self> {
        if y.iter().any(|&v| v != 0.0 && v != 1.0) {
            return Err(invalid("classification labels must be 0 or 1"));
        }
        let ensemble = Ensemble::fit(params, x, y, sample_weight, Loss::Logistic)?;
        Ok(Self { ensemble })
    }

    /// Raw log-odds of the positive class
    pub fn decision_function(&self, x: &[f64]) -> f64 {
        self.ensemble.raw(x)
    }

    pub fn predict_proba(&self, x: &[f64]) -> f64 {
        sigmoid(self.decision_function(x))
    }

    pub fn n_features(&self) -> usize {
        self.ensemble.n_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> GbmParams {
        GbmParams {
            max_iter: 100,
            learning_rate: 0.1,
            min_samples_leaf: 5,
            ..GbmParams::regression_defaults()
        }
    }

    fn step_data(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                let t = i as f64 / n as f64;
                vec![t, ((i * 7) % 13) as f64]
            })
            .collect();
        let y = x.iter().map(|r| if r[0] > 0.5 { 1.0 } else { 0.0 }).collect();
        (x, y)
    }

    #[test]
    fn test_bin_edges_small_cardinality_uses_midpoints() {
        let edges = bin_edges(vec![3.0, 1.0, 2.0, 2.0, 1.0], 255);
        assert_eq!(edges, vec![1.5, 2.5]);
    }

    #[test]
    fn test_bin_edges_respect_max_bins() {
        let values: Vec<f64> = (0..10_000).map(|i| (i as f64).sqrt()).collect();
        let edges = bin_edges(values, 16);
        assert!(edges.len() <= 15);
        assert!(edges.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_regressor_learns_step() {
        let (x, y) = step_data(200);
        let model = GradientBoostedRegressor::fit(&small_params(), &x, &y).unwrap();
        assert_eq!(model.n_trees(), 100);
        for (row, target) in x.iter().zip(&y) {
            assert!((model.predict(row) - target).abs() < 0.05);
        }
    }

    #[test]
    fn test_constant_target_predicts_constant() {
        let x: Vec<Vec<f64>> = (0..50).map(|i| vec![i as f64]).collect();
        let y = vec![0.0003; 50];
        let model = GradientBoostedRegressor::fit(&small_params(), &x, &y).unwrap();
        assert!((model.predict(&[10.0]) - 0.0003).abs() < 1e-12);
        assert!((model.predict(&[1e6]) - 0.0003).abs() < 1e-12);
    }

    #[test]
    fn test_min_samples_leaf_blocks_splits() {
        // 30 rows cannot be split into two leaves of 20
        let (x, y) = step_data(30);
        let params = GbmParams {
            max_iter: 20,
            ..GbmParams::regression_defaults()
        };
        let model = GradientBoostedRegressor::fit(&params, &x, &y).unwrap();
        let first = model.predict(&x[0]);
        assert!(x.iter().all(|row| model.predict(row) == first));
        assert!(model.ensemble.trees.iter().all(|t| t.n_leaves() == 1));
    }

    #[test]
    fn test_leaf_budget() {
        let x: Vec<Vec<f64>> = (0..400).map(|i| vec![i as f64, (i % 17) as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| (r[0] * 0.05).sin() + r[1] * 0.1).collect();
        let params = GbmParams {
            max_iter: 5,
            max_leaf_nodes: 8,
            min_samples_leaf: 5,
            ..GbmParams::regression_defaults()
        };
        let model = GradientBoostedRegressor::fit(&params, &x, &y).unwrap();
        assert!(model.ensemble.trees.iter().all(|t| t.n_leaves() <= 8));
        assert!(model.ensemble.trees.iter().any(|t| t.n_leaves() > 1));
    }

    #[test]
    fn test_classifier_separates_classes() {
        let (x, y) = step_data(200);
        let model = GradientBoostedClassifier::fit(&small_params(), &x, &y, None).unwrap();
        for (row, label) in x.iter().zip(&y) {
            let p = model.predict_proba(row);
            if *label == 1.0 {
                assert!(p > 0.9);
            } else {
                assert!(p < 0.1);
            }
        }
    }

    #[test]
    fn test_classifier_rejects_non_binary_labels() {
        let (x, _) = step_data(50);
        let y = vec![2.0; 50];
        assert!(GradientBoostedClassifier::fit(&small_params(), &x, &y, None).is_err());
    }

    #[test]
    fn test_sample_weights_shift_baseline() {
        let y = vec![1.0, 0.0, 0.0, 0.0];
        let unweighted = Loss::Logistic.baseline(&y, None);
        let balanced = Loss::Logistic.baseline(&y, Some(&[2.0, 2.0 / 3.0, 2.0 / 3.0, 2.0 / 3.0]));
        assert!(unweighted < 0.0);
        assert!(balanced.abs() < 1e-12);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = step_data(150);
        let params = GbmParams {
            feature_fraction: 0.5,
            ..small_params()
        };
        let a = GradientBoostedRegressor::fit(&params, &x, &y).unwrap();
        let b = GradientBoostedRegressor::fit(&params, &x, &y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_serde_preserves_predictions() {
        let (x, y) = step_data(100);
        let model = GradientBoostedClassifier::fit(&small_params(), &x, &y, None).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let restored: GradientBoostedClassifier = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.decision_function(&x[10]), model.decision_function(&x[10]));
    }

    #[test]
    fn test_invalid_inputs() {
        let params = small_params();
        assert!(GradientBoostedRegressor::fit(&params, &[], &[]).is_err());
        assert!(GradientBoostedRegressor::fit(&params, &[vec![1.0], vec![1.0, 2.0]], &[0.0, 1.0]).is_err());
        assert!(GradientBoostedRegressor::fit(&params, &[vec![f64::NAN]], &[0.0]).is_err());
        let bad = GbmParams {
            max_bins: 300,
            ..small_params()
        };
        assert!(GradientBoostedRegressor::fit(&bad, &[vec![1.0]], &[0.0]).is_err());
    }

    #[test]
    fn test_validate_rejects_nan_and_non_positive_rates() {
        for rate in [f64::NAN, 0.0, -0.1] {
            let params = GbmParams {
                learning_rate: rate,
                ..GbmParams::regression_defaults()
            };
            assert!(params.validate().is_err(), "learning_rate {}", rate);
        }
        for fraction in [f64::NAN, 0.0, 1.5] {
            let params = GbmParams {
                feature_fraction: fraction,
                ..GbmParams::regression_defaults()
            };
            assert!(params.validate().is_err(), "feature_fraction {}", fraction);
        }
        let full = GbmParams {
            feature_fraction: 1.0,
            ..GbmParams::regression_defaults()
        };
        assert!(full.validate().is_ok());
    }

    #[test]
    fn test_params_defaults() {
        let reg = GbmParams::regression_defaults();
        assert_eq!(reg.max_iter, 500);
        assert_eq!(reg.max_leaf_nodes, 31);
        assert_eq!(reg.min_samples_leaf, 20);
        assert_eq!(GbmParams::classification_defaults().max_iter, 600);
        assert!(reg.validate().is_ok());
    }
}
