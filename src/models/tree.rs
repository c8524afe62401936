//! Native gradient-boosted tree ensemble evaluation.
//!
//! Trees are stored as flat node arrays exported by the training pipeline.
//! A split sends `x <= threshold` to the left child and NaN to the side named
//! by `default_left`. Leaves hold additive margins; the ensemble output is
//! `base_score + Σ leaf` passed through the objective's link function.

use crate::models::inference::FraudModel;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// One node of a decision tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        default_left: bool,
    },
    Leaf {
        value: f64,
    },
}

/// A single decision tree; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Leaf value reached by `features`.
    ///
    /// Termination relies on [`TreeEnsemble::validate`]: every child index is
    /// strictly greater than its parent's.
    fn leaf_value(&self, features: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let x = features[*feature];
                    let go_left = if x.is_nan() { *default_left } else { x <= *threshold };
                    index = if go_left { *left } else { *right };
                }
            }
        }
    }
}

/// Link between the summed margin and the reported probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Objective {
    /// Logistic link over raw margins (binary log-loss training)
    #[default]
    Binary,
    /// Leaves already sum to a probability; clamp into [0, 1]
    Probability,
}

/// Additive ensemble of decision trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    #[serde(default)]
    pub objective: Objective,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
    #[serde(skip)]
    num_features: usize,
}

impl TreeEnsemble {
    pub fn new(objective: Objective, base_score: f64, trees: Vec<Tree>) -> Self {
        Self {
            objective,
            base_score,
            trees,
            num_features: 0,
        }
    }

    /// Check the ensemble is well formed for `num_features` inputs and bind
    /// that width. Evaluation of a validated ensemble cannot fail or loop.
    pub fn validate(&mut self, num_features: usize) -> Result<()> {
        if self.trees.is_empty() {
            bail!("ensemble has no trees");
        }
        if !self.base_score.is_finite() {
            bail!("base_score is not finite");
        }

        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                bail!("tree {} has no nodes", t);
            }
            let node_count = tree.nodes.len();
            for (n, node) in tree.nodes.iter().enumerate() {
                match node {
                    TreeNode::Leaf { value } => {
                        if !value.is_finite() {
                            bail!("tree {} node {}: leaf value is not finite", t, n);
                        }
                    }
                    TreeNode::Split {
                        feature,
                        threshold,
                        left,
                        right,
                        ..
                    } => {
                        if *feature >= num_features {
                            bail!(
                                "tree {} node {}: feature index {} out of range ({} features)",
                                t,
                                n,
                                feature,
                                num_features
                            );
                        }
                        if threshold.is_nan() {
                            bail!("tree {} node {}: threshold is NaN", t, n);
                        }
                        for child in [*left, *right] {
                            if child <= n || child >= node_count {
                                bail!("tree {} node {}: invalid child index {}", t, n, child);
                            }
                        }
                    }
                }
            }
        }

        self.num_features = num_features;
        Ok(())
    }

    /// Sum of base score and leaf margins
    pub fn margin(&self, features: &[f64]) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|tree| tree.leaf_value(features))
                .sum::<f64>()
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl FraudModel for TreeEnsemble {
    fn predict_proba(&self, features: &[f64]) -> Result<f64> {
        if features.len() != self.num_features {
            bail!(
                "expected {} features, got {}",
                self.num_features,
                features.len()
            );
        }

        let margin = self.margin(features);
        Ok(match self.objective {
            Objective::Binary => sigmoid(margin),
            Objective::Probability => margin.clamp(0.0, 1.0),
        })
    }

    fn feature_count(&self) -> usize {
        self.num_features
    }

    fn backend(&self) -> &'static str {
        "tree_ensemble"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(feature: usize, threshold: f64, left: usize, right: usize) -> TreeNode {
        TreeNode::Split {
            feature,
            threshold,
            left,
            right,
            default_left: true,
        }
    }

    fn leaf(value: f64) -> TreeNode {
        TreeNode::Leaf { value }
    }

    fn stump_ensemble() -> TreeEnsemble {
        let mut ensemble = TreeEnsemble::new(
            Objective::Binary,
            -1.0,
            vec![
                Tree {
                    nodes: vec![split(0, 0.5, 1, 2), leaf(-0.4), leaf(1.2)],
                },
                Tree {
                    nodes: vec![
                        split(1, 14.5, 1, 2),
                        leaf(0.3),
                        leaf(-0.5),
                    ],
                },
            ],
        );
        ensemble.validate(2).unwrap();
        ensemble
    }

    #[test]
    fn test_margin_and_probability() {
        let ensemble = stump_ensemble();

        // -1.0 - 0.4 - 0.5
        assert!((ensemble.margin(&[0.0, 30.0]) + 1.9).abs() < 1e-12);
        // -1.0 + 1.2 + 0.3
        assert!((ensemble.margin(&[1.0, 5.0]) - 0.5).abs() < 1e-12);

        let p = ensemble.predict_proba(&[1.0, 5.0]).unwrap();
        assert!((p - sigmoid(0.5)).abs() < 1e-12);
        assert!(p > 0.5);
    }

    #[test]
    fn test_threshold_goes_left_and_nan_default() {
        let ensemble = stump_ensemble();
        assert_eq!(
            ensemble.margin(&[0.5, 14.5]),
            ensemble.margin(&[0.0, 0.0])
        );
        assert_eq!(
            ensemble.margin(&[f64::NAN, f64::NAN]),
            ensemble.margin(&[0.0, 0.0])
        );
    }

    #[test]
    fn test_wrong_width_is_an_error() {
        let ensemble = stump_ensemble();
        assert!(ensemble.predict_proba(&[0.0]).is_err());
    }

    #[test]
    fn test_probability_objective_clamps() {
        let mut ensemble = TreeEnsemble::new(
            Objective::Probability,
            0.9,
            vec![Tree {
                nodes: vec![leaf(0.4)],
            }],
        );
        ensemble.validate(1).unwrap();
        assert_eq!(ensemble.predict_proba(&[0.0]).unwrap(), 1.0);
    }

    #[test]
    fn test_validation_rejects_malformed_trees() {
        let mut backwards = TreeEnsemble::new(
            Objective::Binary,
            0.0,
            vec![Tree {
                nodes: vec![leaf(0.1), split(0, 1.0, 0, 0)],
            }],
        );
        assert!(backwards.validate(1).is_err());

        let mut out_of_range = TreeEnsemble::new(
            Objective::Binary,
            0.0,
            vec![Tree {
                nodes: vec![split(3, 1.0, 1, 2), leaf(0.0), leaf(1.0)],
            }],
        );
        assert!(out_of_range.validate(2).is_err());

        let mut empty = TreeEnsemble::new(Objective::Binary, 0.0, Vec::new());
        assert!(empty.validate(1).is_err());

        let mut dangling = TreeEnsemble::new(
            Objective::Binary,
            0.0,
            vec![Tree {
                nodes: vec![split(0, 1.0, 1, 5), leaf(0.0)],
            }],
        );
        assert!(dangling.validate(1).is_err());
    }

    #[test]
    fn test_node_deserialization() {
        let tree: Tree = serde_json::from_str(
            r#"{"nodes": [
                {"feature": 0, "threshold": 0.5, "left": 1, "right": 2},
                {"value": -0.4},
                {"value": 1.2}
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            tree.nodes[0],
            TreeNode::Split {
                feature: 0,
                threshold: 0.5,
                left: 1,
                right: 2,
                default_left: false,
            }
        );
        assert_eq!(tree.nodes[2], leaf(1.2));
    }
}
