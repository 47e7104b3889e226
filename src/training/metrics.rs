use crate::QaError;
use std::convert::TryFrom;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tch::{Kind, Tensor};

/// Hard labels from binary logits (probability above 0.5)
pub fn binary_predictions(logits: &Tensor) -> Tensor {
    logits.sigmoid().gt(0.5).to_kind(Kind::Int64)
}

/// Hard labels from multi-way logits (argmax over the last dimension)
pub fn multiway_predictions(logits: &Tensor) -> Tensor {
    logits.argmax(-1, false)
}

fn to_labels(tensor: &Tensor) -> Result<Vec<i64>, QaError> {
    Ok(Vec::<i64>::try_from(
        &tensor.detach().to_kind(Kind::Int64).to_device(tch::Device::Cpu),
    )?)
}

/// Fraction of predictions equal to the targets, 0 for empty inputs
pub fn accuracy(predictions: &Tensor, targets: &Tensor) -> Result<f64, QaError> {
    let (predictions, targets) = (to_labels(predictions)?, to_labels(targets)?);
    check_lengths(&predictions, &targets)?;
    if predictions.is_empty() {
        return Ok(0.0);
    }
    let correct = predictions
        .iter()
        .zip(targets.iter())
        .filter(|(prediction, target)| prediction == target)
        .count();
    Ok(correct as f64 / predictions.len() as f64)
}

/// Unweighted mean of the per-class F1 scores over every class present in the predictions or
/// the targets. Classes without predicted or true examples score 0.
pub fn macro_f1(predictions: &Tensor, targets: &Tensor) -> Result<f64, QaError> {
    let (predictions, targets) = (to_labels(predictions)?, to_labels(targets)?);
    check_lengths(&predictions, &targets)?;
    let classes: BTreeSet<i64> = predictions.iter().chain(targets.iter()).copied().collect();
    if classes.is_empty() {
        return Ok(0.0);
    }

    let total: f64 = classes
        .iter()
        .map(|&class| {
            let (mut true_positives, mut false_positives, mut false_negatives) = (0usize, 0, 0);
            for (&prediction, &target) in predictions.iter().zip(targets.iter()) {
                match (prediction == class, target == class) {
                    (true, true) => true_positives += 1,
                    (true, false) => false_positives += 1,
                    (false, true) => false_negatives += 1,
                    (false, false) => {}
                }
            }
            let denominator = 2 * true_positives + false_positives + false_negatives;
            if denominator == 0 {
                0.0
            } else {
                2.0 * true_positives as f64 / denominator as f64
            }
        })
        .sum();
    Ok(total / classes.len() as f64)
}

fn check_lengths(predictions: &[i64], targets: &[i64]) -> Result<(), QaError> {
    if predictions.len() != targets.len() {
        return Err(QaError::ValueError(format!(
            "Got {} predictions for {} targets",
            predictions.len(),
            targets.len()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
/// Accuracy and macro-F1 of an auxiliary classifier, in percent
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub f1: f64,
}

/// Per-step average of auxiliary classification metrics
#[derive(Debug, Default)]
pub(crate) struct ClassificationAccumulator {
    accuracy: f64,
    f1: f64,
    steps: usize,
}

impl ClassificationAccumulator {
    pub(crate) fn update(&mut self, predictions: &Tensor, targets: &Tensor) -> Result<(), QaError> {
        self.accuracy += accuracy(predictions, targets)?;
        self.f1 += macro_f1(predictions, targets)?;
        self.steps += 1;
        Ok(())
    }

    pub(crate) fn current(&self) -> ClassificationMetrics {
        if self.steps == 0 {
            return ClassificationMetrics {
                accuracy: 0.0,
                f1: 0.0,
            };
        }
        ClassificationMetrics {
            accuracy: 100.0 * self.accuracy / self.steps as f64,
            f1: 100.0 * self.f1 / self.steps as f64,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
/// # Metrics of one pass over a data set
pub struct EpochMetrics {
    /// Mean batch loss
    pub loss: f64,
    /// Exact-match percentage
    pub exact_match: f64,
    /// Token F1 percentage
    pub f1: f64,
    pub subjectivity: Option<ClassificationMetrics>,
    pub domain: Option<ClassificationMetrics>,
    /// Number of batches that contributed
    pub steps: usize,
    /// Number of examples that contributed
    pub examples: usize,
}

/// Running sums of the span loss and answer scores
#[derive(Debug, Default)]
pub(crate) struct SpanAccumulator {
    loss: f64,
    exact_match: f64,
    f1: f64,
    steps: usize,
    examples: usize,
}

impl SpanAccumulator {
    pub(crate) fn update(&mut self, loss: f64, exact_match: f64, f1: f64, examples: usize) {
        self.loss += loss;
        self.exact_match += exact_match;
        self.f1 += f1;
        self.steps += 1;
        self.examples += examples;
    }

    /// Running (exact-match, F1) percentages
    pub(crate) fn current_scores(&self) -> (f64, f64) {
        if self.examples == 0 {
            return (0.0, 0.0);
        }
        (
            100.0 * self.exact_match / self.examples as f64,
            100.0 * self.f1 / self.examples as f64,
        )
    }

    pub(crate) fn steps(&self) -> usize {
        self.steps
    }

    pub(crate) fn finish(
        &self,
        subjectivity: Option<ClassificationMetrics>,
        domain: Option<ClassificationMetrics>,
    ) -> EpochMetrics {
        let loss = if self.steps == 0 {
            0.0
        } else {
            self.loss / self.steps as f64
        };
        let (exact_match, f1) = self.current_scores();
        EpochMetrics {
            loss,
            exact_match,
            f1,
            subjectivity,
            domain,
            steps: self.steps,
            examples: self.examples,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
/// # Record of a training run
pub struct TrainingHistory {
    /// Combined loss of every training batch
    pub batch_losses: Vec<f64>,
    pub train: Vec<EpochMetrics>,
    pub validation: Vec<EpochMetrics>,
    /// Location of the best checkpoint written so far
    pub best_checkpoint: Option<PathBuf>,
    pub best_exact_match: Option<f64>,
    pub epochs_completed: usize,
    pub stopped_early: bool,
}
