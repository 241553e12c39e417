use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::artifact::read_artifact;
use crate::classifier::{sigmoid, Classifier, Prediction};
use crate::error::{Error, Result};
use crate::tree::{RegressionTree, SplitRule, TreeNode};

/// Tree splitting on one input column, with a margin contribution at each leaf.
pub type MarginTree = RegressionTree<u32, f64>;

/// Gradient-boosted binary classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedTrees {
    pub n_features: usize,
    /// Margin (log-odds) before any tree contributes.
    pub base_margin: f64,
    pub trees: Vec<MarginTree>,
}

impl BoostedTrees {
    fn check(&self) -> Result<()> {
        for (i, tree) in self.trees.iter().enumerate() {
            if tree.rule != SplitRule::LessGoesLeft {
                return Err(Error::InvalidModel(format!(
                    "Boosted tree {i} must split with the less-goes-left rule"
                )));
            }
            let out_of_range = tree.nodes.iter().any(|node| {
                matches!(node, TreeNode::Split { test, .. } if *test as usize >= self.n_features)
            });
            if out_of_range {
                return Err(Error::InvalidModel(format!(
                    "Boosted tree {i} splits on a column >= {}",
                    self.n_features
                )));
            }
        }
        Ok(())
    }

    pub fn margin(&self, row: &[f32]) -> Result<f64> {
        let mut margin = self.base_margin;
        for (i, tree) in self.trees.iter().enumerate() {
            let leaf = tree
                .predict(|col| row[*col as usize] as f64)
                .ok_or_else(|| Error::InvalidModel(format!("Boosted tree {i} is malformed")))?;
            margin += leaf;
        }
        Ok(margin)
    }
}

/// Linear model `coef · x + intercept`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub coef: Vec<f32>,
    pub intercept: f32,
}

impl LinearModel {
    fn decision(&self, row: &[f32]) -> f32 {
        self.coef.iter().zip(row).map(|(w, x)| w * x).sum::<f32>() + self.intercept
    }
}

/// Generic serialized estimator.
///
/// Boosted trees and logistic regression expose class probabilities; a plain
/// linear regressor only exposes a point score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    BoostedTrees(BoostedTrees),
    Logistic(LinearModel),
    Linear(LinearModel),
}

impl Estimator {
    /// Load from bincode, bzip2-compressed when the path ends in `.bz2`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = read_artifact(path.as_ref())?;
        let estimator: Self = bincode::deserialize(&bytes)?;
        if let Estimator::BoostedTrees(trees) = &estimator {
            trees.check()?;
        }
        Ok(estimator)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Estimator::BoostedTrees(_) => "boosted_trees",
            Estimator::Logistic(_) => "logistic",
            Estimator::Linear(_) => "linear",
        }
    }
}

impl Classifier for Estimator {
    fn predict(&self, row: &[f32]) -> Result<Prediction> {
        if let Some(n) = self.n_features() {
            if row.len() != n {
                return Err(Error::InvalidModel(format!(
                    "{} estimator expects {n} features, got {}",
                    self.kind(),
                    row.len()
                )));
            }
        }

        match self {
            Estimator::BoostedTrees(trees) => {
                let p = sigmoid(trees.margin(row)? as f32);
                Ok(Prediction::Proba(vec![1.0 - p, p]))
            }
            Estimator::Logistic(model) => {
                let p = sigmoid(model.decision(row));
                Ok(Prediction::Proba(vec![1.0 - p, p]))
            }
            Estimator::Linear(model) => Ok(Prediction::Point(model.decision(row))),
        }
    }

    fn n_features(&self) -> Option<usize> {
        match self {
            Estimator::BoostedTrees(trees) => Some(trees.n_features),
            Estimator::Logistic(model) | Estimator::Linear(model) => Some(model.coef.len()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two stumps on column 0: margin -2 below 0.5, +2 at or above.
    pub(crate) fn stump_forest(n_features: usize) -> BoostedTrees {
        let stump = |low: f64, high: f64| {
            MarginTree::new(
                vec![
                    TreeNode::Split {
                        test: 0,
                        threshold: 0.5,
                        left: 1,
                        right: 2,
                    },
                    TreeNode::Leaf(low),
                    TreeNode::Leaf(high),
                ],
                SplitRule::LessGoesLeft,
            )
        };
        BoostedTrees {
            n_features,
            base_margin: 0.0,
            trees: vec![stump(-1.0, 1.0), stump(-1.0, 1.0)],
        }
    }

    fn positive(prediction: Prediction) -> f32 {
        match prediction {
            Prediction::Proba(p) => p[1],
            Prediction::Point(v) => v,
        }
    }

    #[test]
    fn boosted_trees_sum_margins() {
        let model = Estimator::BoostedTrees(stump_forest(2));
        let low = positive(model.predict(&[0.0, 9.0]).unwrap());
        let high = positive(model.predict(&[1.0, 9.0]).unwrap());
        assert!((low - sigmoid(-2.0)).abs() < 1e-6);
        assert!((high - sigmoid(2.0)).abs() < 1e-6);
    }

    #[test]
    fn logistic_and_linear_outputs() {
        let coef = LinearModel {
            coef: vec![1.0, -1.0],
            intercept: 0.0,
        };
        let logistic = Estimator::Logistic(coef.clone());
        assert_eq!(
            logistic.predict(&[2.0, 2.0]).unwrap(),
            Prediction::Proba(vec![0.5, 0.5])
        );

        let linear = Estimator::Linear(LinearModel {
            intercept: 0.25,
            ..coef
        });
        assert_eq!(linear.predict(&[1.0, 0.5]).unwrap(), Prediction::Point(0.75));
    }

    #[test]
    fn width_mismatch_is_an_error() {
        let model = Estimator::BoostedTrees(stump_forest(3));
        assert!(model.predict(&[1.0]).is_err());
    }

    #[test]
    fn load_rejects_out_of_range_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.bin");

        let mut forest = stump_forest(1);
        forest.trees[0].nodes[0] = TreeNode::Split {
            test: 4,
            threshold: 0.0,
            left: 1,
            right: 2,
        };
        std::fs::write(&path, bincode::serialize(&Estimator::BoostedTrees(forest)).unwrap()).unwrap();
        assert!(matches!(Estimator::load(&path), Err(Error::InvalidModel(_))));

        std::fs::write(&path, bincode::serialize(&Estimator::BoostedTrees(stump_forest(1))).unwrap())
            .unwrap();
        assert_eq!(Estimator::load(&path).unwrap().n_features(), Some(1));
    }
}
