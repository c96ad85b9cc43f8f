//! Classifier capabilities: train, predict, evaluate.

use log::debug;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::config::TrainerConfig;
use crate::error::{ClassifierError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: bool,
    pub probability: f64,
    pub score: f64,
}

pub trait BinaryClassifier {
    fn predict(&self, features: ArrayView1<f64>) -> Result<Prediction>;
}

pub trait Trainer {
    type Model: BinaryClassifier;

    fn fit(&self, features: &Array2<f64>, labels: &[bool]) -> Result<Self::Model>;
}

/// Full-batch gradient descent on the L2-regularised log loss.
/// Weights start at zero, so a fit is a pure function of its inputs.
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    learning_rate: f64,
    epochs: usize,
    l2_penalty: f64,
}

impl From<&TrainerConfig> for LogisticRegression {
    fn from(config: &TrainerConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
            epochs: config.epochs,
            l2_penalty: config.l2_penalty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Vec<f64>,
    pub bias: f64,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Trainer for LogisticRegression {
    type Model = LogisticModel;

    fn fit(&self, features: &Array2<f64>, labels: &[bool]) -> Result<LogisticModel> {
        let (n, width) = features.dim();
        if n == 0 {
            return Err(ClassifierError::TrainingError("no training examples".to_string()));
        }
        if n != labels.len() {
            return Err(ClassifierError::TrainingError(format!(
                "{} feature rows but {} labels",
                n,
                labels.len()
            )));
        }

        let targets: Array1<f64> = labels.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();
        let mut weights = Array1::<f64>::zeros(width);
        let mut bias = 0.0;
        let scale = 1.0 / n as f64;

        for epoch in 0..self.epochs {
            let scores = features.dot(&weights) + bias;
            let residual = scores.mapv(sigmoid) - &targets;

            let grad_w = features.t().dot(&residual) * scale + &weights * self.l2_penalty;
            let grad_b = residual.sum() * scale;

            weights.scaled_add(-self.learning_rate, &grad_w);
            bias -= self.learning_rate * grad_b;

            if epoch % 100 == 0 {
                debug!("epoch {} mean |residual| {:.5}", epoch, residual.mapv(f64::abs).mean().unwrap_or(0.0));
            }
        }

        if weights.iter().any(|w| !w.is_finite()) || !bias.is_finite() {
            return Err(ClassifierError::TrainingError(
                "training diverged; lower the learning rate".to_string(),
            ));
        }

        Ok(LogisticModel {
            weights: weights.to_vec(),
            bias,
        })
    }
}

impl BinaryClassifier for LogisticModel {
    fn predict(&self, features: ArrayView1<f64>) -> Result<Prediction> {
        if features.len() != self.weights.len() {
            return Err(ClassifierError::ModelError(format!(
                "model expects {} features, got {}",
                self.weights.len(),
                features.len()
            )));
        }
        let score = features.dot(&ArrayView1::from(&self.weights[..])) + self.bias;
        let probability = sigmoid(score);
        Ok(Prediction {
            label: probability >= 0.5,
            probability,
            score,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfusionMatrix {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionMatrix {
    pub fn record(&mut self, predicted: bool, actual: bool) {
        match (predicted, actual) {
            (true, true) => self.true_positive += 1,
            (true, false) => self.false_positive += 1,
            (false, false) => self.true_negative += 1,
            (false, true) => self.false_negative += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }
}

/// Held-out metrics. TCP is the positive class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub accuracy: f64,
    pub f1_score: f64,
    pub positive_precision: f64,
    pub positive_recall: f64,
    pub negative_precision: f64,
    pub negative_recall: f64,
    pub confusion: ConfusionMatrix,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl From<ConfusionMatrix> for Metrics {
    fn from(c: ConfusionMatrix) -> Self {
        let positive_precision = ratio(c.true_positive, c.true_positive + c.false_positive);
        let positive_recall = ratio(c.true_positive, c.true_positive + c.false_negative);
        let f1_score = if positive_precision + positive_recall > 0.0 {
            2.0 * positive_precision * positive_recall / (positive_precision + positive_recall)
        } else {
            0.0
        };
        Metrics {
            accuracy: ratio(c.true_positive + c.true_negative, c.total()),
            f1_score,
            positive_precision,
            positive_recall,
            negative_precision: ratio(c.true_negative, c.true_negative + c.false_negative),
            negative_recall: ratio(c.true_negative, c.true_negative + c.false_positive),
            confusion: c,
        }
    }
}

pub fn evaluate<C: BinaryClassifier>(model: &C, features: &Array2<f64>, labels: &[bool]) -> Result<Metrics> {
    if features.nrows() == 0 {
        return Err(ClassifierError::TrainingError("cannot evaluate on an empty test set".to_string()));
    }
    if features.nrows() != labels.len() {
        return Err(ClassifierError::TrainingError(format!(
            "{} feature rows but {} labels",
            features.nrows(),
            labels.len()
        )));
    }

    let mut confusion = ConfusionMatrix::default();
    for (row, &actual) in features.axis_iter(Axis(0)).zip(labels) {
        confusion.record(model.predict(row)?.label, actual);
    }
    Ok(Metrics::from(confusion))
}
