//! Model layer: feature standardization, the bagged decision-tree risk
//! classifier, and the boosted regression trees behind grade forecasting.

use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};
use crate::features::FeatureVector;

const MIN_SAMPLES_LEAF: usize = 1;

/// Per-feature standardization: subtract the mean, divide by the population
/// standard deviation. Fit on the training split only; the same transform is
/// applied unchanged at inference time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    std: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(x: &Array2<f64>) -> Self {
        let mean = x
            .mean_axis(Axis(0))
            .map(|m| m.to_vec())
            .unwrap_or_default();
        let std = x.std_axis(Axis(0), 0.0).to_vec();
        StandardScaler { mean, std }
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.mean.len() {
            return Err(AnalyticsError::FeatureMismatch {
                expected: self.mean.len(),
                actual: x.ncols(),
            });
        }
        let mut out = x.clone();
        for (j, mut column) in out.columns_mut().into_iter().enumerate() {
            let mean = self.mean[j];
            let divisor = divisor(self.std[j]);
            column.mapv_inplace(|v| (v - mean) / divisor);
        }
        Ok(out)
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.mean.len() {
            return Err(AnalyticsError::FeatureMismatch {
                expected: self.mean.len(),
                actual: row.len(),
            });
        }
        Ok(row
            .iter()
            .enumerate()
            .map(|(j, &v)| (v - self.mean[j]) / divisor(self.std[j]))
            .collect())
    }
}

// Constant features carry no signal; divide by 1.0 instead of 0.
fn divisor(std: f64) -> f64 {
    if std > 0.0 {
        std
    } else {
        1.0
    }
}

/// Bagged ensemble of decision trees for the ordinal risk classes. Each tree
/// fits a bootstrap resample of the training rows; prediction is a majority
/// vote with the vote fractions doubling as class probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree<f64, usize>>,
    n_classes: usize,
}

impl RandomForest {
    pub fn fit(
        x: &Array2<f64>,
        y: &Array1<usize>,
        n_trees: usize,
        n_classes: usize,
        seed: u64,
    ) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(AnalyticsError::EmptyCorpus);
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let n = x.nrows();

        let mut trees = Vec::with_capacity(n_trees);
        for _ in 0..n_trees {
            let indices: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let dataset = Dataset::new(x.select(Axis(0), &indices), y.select(Axis(0), &indices));
            let tree = DecisionTree::<f64, usize>::params()
                .split_quality(SplitQuality::Gini)
                .fit(&dataset)
                .map_err(|e| AnalyticsError::Fit(e.to_string()))?;
            trees.push(tree);
        }

        Ok(RandomForest { trees, n_classes })
    }

    /// Majority class for one row plus the vote-fraction distribution over
    /// all classes.
    pub fn predict_with_proba(&self, row: &[f64]) -> Result<(usize, Vec<f64>)> {
        if self.trees.is_empty() {
            return Err(AnalyticsError::Fit("forest has no trees".to_string()));
        }
        let x = Array2::from_shape_vec((1, row.len()), row.to_vec())?;

        let mut votes = vec![0usize; self.n_classes];
        for tree in &self.trees {
            let predicted = tree.predict(&x);
            votes[predicted[0].min(self.n_classes - 1)] += 1;
        }

        let total = self.trees.len() as f64;
        let proba: Vec<f64> = votes.iter().map(|&v| v as f64 / total).collect();
        Ok((argmax(&votes), proba))
    }

    /// Majority class per row, for held-out evaluation.
    pub fn predict_batch(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        if self.trees.is_empty() {
            return Err(AnalyticsError::Fit("forest has no trees".to_string()));
        }
        let mut votes = vec![vec![0usize; self.n_classes]; x.nrows()];
        for tree in &self.trees {
            let predicted = tree.predict(x);
            for (row_votes, &class) in votes.iter_mut().zip(predicted.iter()) {
                row_votes[class.min(self.n_classes - 1)] += 1;
            }
        }
        Ok(Array1::from_iter(votes.iter().map(|v| argmax(v))))
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

// First index holding the maximum vote count.
fn argmax(votes: &[usize]) -> usize {
    let mut best = 0;
    for (class, &count) in votes.iter().enumerate().skip(1) {
        if count > votes[best] {
            best = class;
        }
    }
    best
}

/// Binary regression tree splitting on variance reduction.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    root: Node,
}

impl RegressionTree {
    pub fn fit(x: &Array2<f64>, y: &[f64], max_depth: usize) -> Self {
        let indices: Vec<usize> = (0..x.nrows()).collect();
        RegressionTree {
            root: build_node(x, y, &indices, max_depth),
        }
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut node = &self.root;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }
}

fn build_node(x: &Array2<f64>, y: &[f64], indices: &[usize], depth: usize) -> Node {
    if indices.is_empty() {
        return Node::Leaf { value: 0.0 };
    }
    let value = indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64;
    if depth == 0 || indices.len() < 2 * MIN_SAMPLES_LEAF {
        return Node::Leaf { value };
    }

    match best_split(x, y, indices) {
        None => Node::Leaf { value },
        Some((feature, threshold)) => {
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| x[[i, feature]] <= threshold);
            Node::Split {
                feature,
                threshold,
                left: Box::new(build_node(x, y, &left, depth - 1)),
                right: Box::new(build_node(x, y, &right, depth - 1)),
            }
        }
    }
}

/// Best (feature, threshold) by summed squared error of the two children,
/// scanning each feature in sorted order with running sums. `None` when no
/// split separates the rows.
fn best_split(x: &Array2<f64>, y: &[f64], indices: &[usize]) -> Option<(usize, f64)> {
    let n = indices.len();
    let total_sum: f64 = indices.iter().map(|&i| y[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| y[i] * y[i]).sum();

    let mut best: Option<(usize, f64, f64)> = None;
    for feature in 0..x.ncols() {
        let mut order = indices.to_vec();
        order.sort_by(|&a, &b| {
            x[[a, feature]]
                .partial_cmp(&x[[b, feature]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for (k, &i) in order.iter().enumerate().take(n - 1) {
            left_sum += y[i];
            left_sq += y[i] * y[i];

            let left_n = k + 1;
            let right_n = n - left_n;
            if left_n < MIN_SAMPLES_LEAF || right_n < MIN_SAMPLES_LEAF {
                continue;
            }

            let here = x[[i, feature]];
            let next = x[[order[left_n], feature]];
            if next <= here {
                // Equal feature values cannot be separated.
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / left_n as f64)
                + (right_sq - right_sum * right_sum / right_n as f64);

            if best.map_or(true, |(_, _, best_sse)| sse < best_sse) {
                best = Some((feature, (here + next) / 2.0, sse));
            }
        }
    }

    best.map(|(feature, threshold, _)| (feature, threshold))
}

/// Gradient-boosted regression trees: a mean baseline plus a sequence of
/// shallow trees fit to the running residuals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    init: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoostedTrees {
    pub fn fit(
        x: &Array2<f64>,
        y: &Array1<f64>,
        n_estimators: usize,
        learning_rate: f64,
        max_depth: usize,
    ) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(AnalyticsError::EmptyCorpus);
        }
        let flat = x
            .as_slice()
            .ok_or_else(|| AnalyticsError::Fit("non-contiguous feature matrix".to_string()))?;
        let ncols = x.ncols();
        let targets = y.to_vec();

        let init = targets.iter().sum::<f64>() / targets.len() as f64;
        let mut predictions = vec![init; targets.len()];

        let mut trees = Vec::with_capacity(n_estimators);
        for _ in 0..n_estimators {
            let residuals: Vec<f64> = targets
                .iter()
                .zip(&predictions)
                .map(|(target, predicted)| target - predicted)
                .collect();
            let tree = RegressionTree::fit(x, &residuals, max_depth);
            for (i, predicted) in predictions.iter_mut().enumerate() {
                *predicted += learning_rate * tree.predict_row(&flat[i * ncols..(i + 1) * ncols]);
            }
            trees.push(tree);
        }

        Ok(GradientBoostedTrees {
            init,
            learning_rate,
            trees,
        })
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.init
            + self.learning_rate
                * self
                    .trees
                    .iter()
                    .map(|tree| tree.predict_row(row))
                    .sum::<f64>()
    }

    pub fn predict_batch(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let flat = x
            .as_slice()
            .ok_or_else(|| AnalyticsError::Fit("non-contiguous feature matrix".to_string()))?;
        let ncols = x.ncols();
        Ok(Array1::from_iter(
            (0..x.nrows()).map(|i| self.predict_row(&flat[i * ncols..(i + 1) * ncols])),
        ))
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }
}

/// Risk classifier bound to the scaler fit in the same training run. The
/// pairing is structural: prediction always scales with the bundled scaler,
/// so a mismatched transform cannot be substituted.
#[derive(Debug, Clone)]
pub struct RiskModel {
    pub(crate) forest: RandomForest,
    pub(crate) scaler: StandardScaler,
}

impl RiskModel {
    pub fn new(forest: RandomForest, scaler: StandardScaler) -> Self {
        RiskModel { forest, scaler }
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<(usize, Vec<f64>)> {
        let scaled = self.scaler.transform_row(&features.as_array())?;
        self.forest.predict_with_proba(&scaled)
    }
}

/// Grade regressor bound to the scaler fit in the same training run.
#[derive(Debug, Clone)]
pub struct GradeModel {
    pub(crate) booster: GradientBoostedTrees,
    pub(crate) scaler: StandardScaler,
}

impl GradeModel {
    pub fn new(booster: GradientBoostedTrees, scaler: StandardScaler) -> Self {
        GradeModel { booster, scaler }
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let scaled = self.scaler.transform_row(&features.as_array())?;
        Ok(self.booster.predict_row(&scaled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn scaler_standardizes_columns() {
        let x = array![[1.0, 10.0], [3.0, 30.0]];
        let scaler = StandardScaler::fit(&x);

        let scaled = scaler.transform(&x).expect("transform");
        assert!((scaled[[0, 0]] - -1.0).abs() < 1e-9);
        assert!((scaled[[1, 0]] - 1.0).abs() < 1e-9);
        assert!((scaled[[0, 1]] - -1.0).abs() < 1e-9);
        assert!((scaled[[1, 1]] - 1.0).abs() < 1e-9);

        let row = scaler.transform_row(&[2.0, 20.0]).expect("transform row");
        assert!(row.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn scaler_handles_constant_features() {
        let x = array![[5.0, 1.0], [5.0, 2.0], [5.0, 3.0]];
        let scaler = StandardScaler::fit(&x);

        let row = scaler.transform_row(&[5.0, 2.0]).expect("transform row");
        assert!(row[0].is_finite());
        assert!((row[0]).abs() < 1e-9);
    }

    #[test]
    fn scaler_rejects_wrong_width() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let scaler = StandardScaler::fit(&x);

        let err = scaler.transform_row(&[1.0; 6]).unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::FeatureMismatch {
                expected: 2,
                actual: 6
            }
        ));
    }

    #[test]
    fn forest_separates_clusters() {
        // Two well-separated clusters along the first feature.
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            rows.extend_from_slice(&[i as f64 * 0.1, 1.0]);
            labels.push(0usize);
            rows.extend_from_slice(&[10.0 + i as f64 * 0.1, 1.0]);
            labels.push(1usize);
        }
        let x = Array2::from_shape_vec((40, 2), rows).expect("shape");
        let y = Array1::from_vec(labels);

        let forest = RandomForest::fit(&x, &y, 15, 4, 7).expect("fit forest");
        let (class_low, proba_low) = forest.predict_with_proba(&[0.5, 1.0]).expect("predict");
        let (class_high, _) = forest.predict_with_proba(&[10.5, 1.0]).expect("predict");

        assert_eq!(class_low, 0);
        assert_eq!(class_high, 1);
        assert_eq!(proba_low.len(), 4);
        assert!((proba_low.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(proba_low[class_low] > 0.9);
    }

    #[test]
    fn regression_tree_learns_step_function() {
        let rows: Vec<f64> = (0..20).flat_map(|i| [i as f64, 0.0]).collect();
        let x = Array2::from_shape_vec((20, 2), rows).expect("shape");
        let y: Vec<f64> = (0..20).map(|i| if i < 10 { 0.0 } else { 10.0 }).collect();

        let tree = RegressionTree::fit(&x, &y, 2);
        assert!((tree.predict_row(&[3.0, 0.0]) - 0.0).abs() < 1e-9);
        assert!((tree.predict_row(&[15.0, 0.0]) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn boosted_trees_fit_linear_target() {
        let rows: Vec<f64> = (0..50).flat_map(|i| [i as f64, 1.0]).collect();
        let x = Array2::from_shape_vec((50, 2), rows).expect("shape");
        let y = Array1::from_iter((0..50).map(|i| 2.0 * i as f64));

        let booster = GradientBoostedTrees::fit(&x, &y, 100, 0.1, 3).expect("fit booster");
        for probe in [5.0, 25.0, 40.0] {
            let predicted = booster.predict_row(&[probe, 1.0]);
            assert!(
                (predicted - 2.0 * probe).abs() < 5.0,
                "probe {probe}: predicted {predicted}"
            );
        }
    }

    #[test]
    fn bundles_scale_before_predicting() {
        let x = array![
            [0.0, 0.0],
            [1.0, 0.0],
            [2.0, 0.0],
            [10.0, 0.0],
            [11.0, 0.0],
            [12.0, 0.0]
        ];
        let scaler = StandardScaler::fit(&x);
        let scaled = scaler.transform(&x).expect("transform");

        let y = Array1::from_vec(vec![0usize, 0, 0, 1, 1, 1]);
        let forest = RandomForest::fit(&scaled, &y, 10, 4, 3).expect("fit");
        let bundle = RiskModel::new(forest, scaler);

        let features = FeatureVector {
            avg_score: 1.0,
            submission_rate: 0.0,
            on_time_rate: 0.0,
            participation: 0.0,
            assignment_count: 0,
            days_since_last: 0.0,
        };
        // Bundle was fit on two features, the live vector has six; the
        // mismatch surfaces as an error rather than a silent bad transform.
        assert!(bundle.predict(&features).is_err());
    }
}
