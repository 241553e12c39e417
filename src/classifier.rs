//! Classifier artifacts and the interface the inference engine calls.
//!
//! Three trained formats are supported, plus a neutral stand-in:
//! - [`TabNetClassifier`]: attentive tabular network, bzip2 bincode archive
//! - [`Estimator`](crate::estimator::Estimator): generic bincode estimator
//! - [`DenseNetwork`]: dense tensor network stored as JSON
//! - [`NeutralClassifier`]: always 0.5, used when nothing else loads

use std::fmt;
use std::path::Path;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::artifact::read_artifact;
use crate::error::{Error, Result};

/// Raw classifier output for one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Prediction {
    /// Class probabilities; index 1 is the positive ("abnormal") class.
    Proba(Vec<f32>),
    /// A single score used directly as the probability proxy.
    Point(f32),
}

/// Which artifact format produced a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    TabNet,
    Estimator,
    Tensor,
    Neutral,
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelSource::TabNet => "tabnet",
            ModelSource::Estimator => "estimator",
            ModelSource::Tensor => "tensor",
            ModelSource::Neutral => "neutral",
        })
    }
}

pub trait Classifier: fmt::Debug + Send + Sync {
    fn predict(&self, row: &[f32]) -> Result<Prediction>;

    /// Expected input width, when the format records it.
    fn n_features(&self) -> Option<usize> {
        None
    }
}

/// Reports probability 0.5 for every input.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeutralClassifier;

impl Classifier for NeutralClassifier {
    fn predict(&self, _row: &[f32]) -> Result<Prediction> {
        Ok(Prediction::Proba(vec![0.5, 0.5]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    Identity,
    Relu,
    Sigmoid,
    Softmax,
}

impl Activation {
    fn apply(self, mut x: Array1<f32>) -> Array1<f32> {
        match self {
            Activation::Identity => x,
            Activation::Relu => {
                x.mapv_inplace(|v| v.max(0.0));
                x
            }
            Activation::Sigmoid => {
                x.mapv_inplace(sigmoid);
                x
            }
            Activation::Softmax => softmax(&x),
        }
    }
}

pub(crate) fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

fn softmax(x: &Array1<f32>) -> Array1<f32> {
    let max = x.fold(f32::NEG_INFINITY, |m, v| m.max(*v));
    let exp = x.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

/// Fully connected layer, `weights` shaped `(outputs, inputs)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

impl Dense {
    pub fn inputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn outputs(&self) -> usize {
        self.weights.nrows()
    }

    fn check(&self) -> Result<()> {
        if self.bias.len() != self.outputs() {
            return Err(Error::InvalidModel(format!(
                "Dense layer has {} outputs but {} biases",
                self.outputs(),
                self.bias.len()
            )));
        }
        Ok(())
    }

    fn forward(&self, x: &Array1<f32>) -> Result<Array1<f32>> {
        if x.len() != self.inputs() {
            return Err(Error::InvalidModel(format!(
                "Dense layer expects {} inputs, got {}",
                self.inputs(),
                x.len()
            )));
        }
        Ok(self.weights.dot(x) + &self.bias)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub dense: Dense,
    pub activation: Activation,
}

/// Feed-forward network exported from a tensor framework as JSON.
///
/// A two-wide output is read as class probabilities, a one-wide output as a
/// point score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseNetwork {
    pub layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = read_artifact(path.as_ref())?;
        let network: Self = serde_json::from_slice(&bytes)?;
        network.check()?;
        Ok(network)
    }

    fn check(&self) -> Result<()> {
        let first = self
            .layers
            .first()
            .ok_or_else(|| Error::InvalidModel("Network has no layers".into()))?;
        first.dense.check()?;
        for pair in self.layers.windows(2) {
            pair[1].dense.check()?;
            if pair[0].dense.outputs() != pair[1].dense.inputs() {
                return Err(Error::InvalidModel(format!(
                    "Layer widths do not chain: {} -> {}",
                    pair[0].dense.outputs(),
                    pair[1].dense.inputs()
                )));
            }
        }
        Ok(())
    }
}

impl Classifier for DenseNetwork {
    fn predict(&self, row: &[f32]) -> Result<Prediction> {
        let mut x = Array1::from(row.to_vec());
        for layer in &self.layers {
            x = layer.activation.apply(layer.dense.forward(&x)?);
        }
        match x.len() {
            1 => Ok(Prediction::Point(x[0])),
            2 => Ok(Prediction::Proba(x.to_vec())),
            n => Err(Error::InvalidModel(format!(
                "Network output width {n} is neither 1 nor 2"
            ))),
        }
    }

    fn n_features(&self) -> Option<usize> {
        self.layers.first().map(|l| l.dense.inputs())
    }
}

/// One attentive decision step: a feature mask followed by a transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionStep {
    /// `n_features -> n_features` mask logits.
    pub attention: Dense,
    /// `n_features -> n_decision` representation of the masked input.
    pub transform: Dense,
}

/// Attentive tabular classifier in the TabNet style.
///
/// Each step masks the input with a softmax attention weighted by a prior
/// that decays for features already used (`prior *= relaxation - mask`);
/// ReLU step outputs are summed and a two-logit head gives the class
/// probabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabNetClassifier {
    pub relaxation: f32,
    pub steps: Vec<DecisionStep>,
    pub head: Dense,
}

impl TabNetClassifier {
    /// Load a bzip2-compressed bincode archive.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = read_artifact(path.as_ref())?;
        let model: Self = bincode::deserialize(&bytes)?;
        model.check()?;
        Ok(model)
    }

    pub fn input_width(&self) -> Option<usize> {
        self.steps.first().map(|s| s.attention.inputs())
    }

    fn check(&self) -> Result<()> {
        let n = self
            .input_width()
            .ok_or_else(|| Error::InvalidModel("TabNet has no decision steps".into()))?;
        let n_d = self.head.inputs();
        self.head.check()?;
        if self.head.outputs() != 2 {
            return Err(Error::InvalidModel(format!(
                "TabNet head has {} outputs, expected 2",
                self.head.outputs()
            )));
        }
        for (i, step) in self.steps.iter().enumerate() {
            step.attention.check()?;
            step.transform.check()?;
            let ok = step.attention.inputs() == n
                && step.attention.outputs() == n
                && step.transform.inputs() == n
                && step.transform.outputs() == n_d;
            if !ok {
                return Err(Error::InvalidModel(format!(
                    "TabNet step {i} does not match input width {n} / decision width {n_d}"
                )));
            }
        }
        Ok(())
    }
}

impl Classifier for TabNetClassifier {
    fn predict(&self, row: &[f32]) -> Result<Prediction> {
        let x = Array1::from(row.to_vec());
        let mut prior = Array1::<f32>::ones(x.len());
        let mut aggregate = Array1::<f32>::zeros(self.head.inputs());

        for step in &self.steps {
            let logits = step.attention.forward(&x)? * &prior;
            let mask = softmax(&logits);
            prior = prior * mask.mapv(|m| self.relaxation - m);

            let decision = step.transform.forward(&(&x * &mask))?;
            aggregate = aggregate + decision.mapv(|v| v.max(0.0));
        }

        let proba = softmax(&self.head.forward(&aggregate)?);
        Ok(Prediction::Proba(proba.to_vec()))
    }

    fn n_features(&self) -> Option<usize> {
        self.input_width()
    }
}
