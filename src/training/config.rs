use crate::{Config, QaError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
/// # Optimizer used for fine-tuning
pub enum OptimizerKind {
    /// Adam with decoupled weight decay. The learning rate schedule is only stepped for this optimizer.
    AdamW,
    #[serde(rename = "SGD")]
    Sgd,
}

impl FromStr for OptimizerKind {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AdamW" => Ok(OptimizerKind::AdamW),
            "SGD" => Ok(OptimizerKind::Sgd),
            _ => Err(QaError::InvalidConfigurationError(format!(
                "Optimizer must be one of {{AdamW, SGD}}, got {}",
                s
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
/// Subjectivity label feeding the auxiliary objective
pub enum QaType {
    #[serde(rename = "question")]
    Question,
    #[serde(rename = "answer")]
    Answer,
}

impl FromStr for QaType {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "question" => Ok(QaType::Question),
            "answer" => Ok(QaType::Answer),
            _ => Err(QaError::InvalidConfigurationError(format!(
                "QA type must be one of {{question, answer}}, got {}",
                s
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
/// Data the model is fine-tuned on
pub enum DatasetKind {
    SQuAD,
    SubjQA,
    #[serde(rename = "combined")]
    Combined,
}

impl FromStr for DatasetKind {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SQuAD" => Ok(DatasetKind::SQuAD),
            "SubjQA" => Ok(DatasetKind::SubjQA),
            "combined" => Ok(DatasetKind::Combined),
            _ => Err(QaError::InvalidConfigurationError(format!(
                "Dataset must be one of {{SQuAD, SubjQA, combined}}, got {}",
                s
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
/// # Training loop configuration
pub struct TrainingConfig {
    pub n_epochs: usize,
    /// Freeze the encoder parameters before training (see `unfrozen_top_layers`)
    #[serde(default)]
    pub freeze_encoder: bool,
    /// Number of top transformer layers left trainable when the encoder is frozen
    #[serde(default)]
    pub unfrozen_top_layers: i64,
    /// Reorder every batch by decreasing true sequence length
    #[serde(default)]
    pub sort_batch: bool,
    #[serde(default = "default_max_grad_norm")]
    pub max_grad_norm: f64,
    #[serde(default = "default_optimizer")]
    pub optimizer: OptimizerKind,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Linear warmup steps of the learning rate schedule. If None, the learning rate is constant.
    #[serde(default)]
    pub warmup_steps: Option<usize>,
    pub model_dir: PathBuf,
    pub model_name: String,
    #[serde(default = "default_qa_type")]
    pub qa_type: QaType,
    #[serde(default = "default_dataset")]
    pub dataset: DatasetKind,
    /// Expected batch size: evaluation batches of any other size are skipped
    pub batch_size: i64,
    #[serde(default = "default_early_stopping")]
    pub early_stopping: bool,
    #[serde(default = "default_seed")]
    pub seed: i64,
}

fn default_max_grad_norm() -> f64 {
    10.0
}

fn default_optimizer() -> OptimizerKind {
    OptimizerKind::AdamW
}

fn default_learning_rate() -> f64 {
    2e-5
}

fn default_qa_type() -> QaType {
    QaType::Question
}

fn default_dataset() -> DatasetKind {
    DatasetKind::SQuAD
}

fn default_early_stopping() -> bool {
    true
}

fn default_seed() -> i64 {
    42
}

impl Config for TrainingConfig {}

impl TrainingConfig {
    /// Configuration with default hyper-parameters writing checkpoints to `model_dir/model_name`
    pub fn new<P: Into<PathBuf>, S: Into<String>>(
        model_dir: P,
        model_name: S,
        n_epochs: usize,
        batch_size: i64,
    ) -> TrainingConfig {
        TrainingConfig {
            n_epochs,
            freeze_encoder: false,
            unfrozen_top_layers: 0,
            sort_batch: false,
            max_grad_norm: default_max_grad_norm(),
            optimizer: default_optimizer(),
            learning_rate: default_learning_rate(),
            warmup_steps: None,
            model_dir: model_dir.into(),
            model_name: model_name.into(),
            qa_type: default_qa_type(),
            dataset: default_dataset(),
            batch_size,
            early_stopping: default_early_stopping(),
            seed: default_seed(),
        }
    }

    pub fn validate(&self) -> Result<(), QaError> {
        if self.n_epochs == 0 {
            return Err(QaError::InvalidConfigurationError(
                "Number of training epochs must be positive".into(),
            ));
        }
        if self.batch_size < 1 {
            return Err(QaError::InvalidConfigurationError(format!(
                "Batch size must be positive, got {}",
                self.batch_size
            )));
        }
        if self.max_grad_norm <= 0.0 {
            return Err(QaError::InvalidConfigurationError(format!(
                "Maximum gradient norm must be positive, got {}",
                self.max_grad_norm
            )));
        }
        if self.unfrozen_top_layers < 0 {
            return Err(QaError::InvalidConfigurationError(format!(
                "Number of unfrozen layers cannot be negative, got {}",
                self.unfrozen_top_layers
            )));
        }
        if self.model_name.is_empty() {
            return Err(QaError::InvalidConfigurationError(
                "Model name of the checkpoint file must be provided".into(),
            ));
        }
        Ok(())
    }
}
