use serde::{Deserialize, Serialize};

/// Which branch a split takes when its feature value crosses the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitRule {
    /// `value > threshold` goes left (shape predictor convention).
    GreaterGoesLeft,
    /// `value < threshold` goes left (gradient boosting convention).
    LessGoesLeft,
}

impl SplitRule {
    fn goes_left(self, value: f64, threshold: f64) -> bool {
        match self {
            SplitRule::GreaterGoesLeft => value > threshold,
            SplitRule::LessGoesLeft => value < threshold,
        }
    }
}

/// A node in a binary regression tree.
///
/// `T` is the split test (what to measure), `L` the leaf payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode<T, L> {
    Split {
        test: T,
        threshold: f64,
        left: u32,
        right: u32,
    },
    Leaf(L),
}

/// A single regression tree. Node 0 is the root.
///
/// Prediction walks from the root, evaluating each split's test through the
/// caller-supplied closure, until a leaf is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree<T, L> {
    pub nodes: Vec<TreeNode<T, L>>,
    pub rule: SplitRule,
}

impl<T, L> RegressionTree<T, L> {
    pub fn new(nodes: Vec<TreeNode<T, L>>, rule: SplitRule) -> Self {
        Self { nodes, rule }
    }

    /// Traverse the tree and return the reached leaf, or `None` if a child
    /// index points outside the node table.
    pub fn predict<F>(&self, measure: F) -> Option<&L>
    where
        F: Fn(&T) -> f64,
    {
        let mut node_idx = 0usize;
        // A well-formed tree never revisits a node, so the walk is bounded.
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(node_idx)? {
                TreeNode::Split {
                    test,
                    threshold,
                    left,
                    right,
                } => {
                    node_idx = if self.rule.goes_left(measure(test), *threshold) {
                        *left as usize
                    } else {
                        *right as usize
                    };
                }
                TreeNode::Leaf(leaf) => return Some(leaf),
            }
        }
        None
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
}
