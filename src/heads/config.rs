use crate::modules::RecurrentCell;
use crate::{Config, QaError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
/// # Architecture of the question answering head
pub enum HeadKind {
    /// Fully connected output layers directly on top of the encoder
    #[serde(rename = "LinearQAHead", alias = "linear")]
    Linear,
    /// Bidirectional recurrent re-encoder followed by fully connected output layers
    #[serde(rename = "RecurrentQAHead", alias = "recurrent")]
    Recurrent,
}

impl FromStr for HeadKind {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LinearQAHead" | "linear" => Ok(HeadKind::Linear),
            "RecurrentQAHead" | "recurrent" => Ok(HeadKind::Recurrent),
            _ => Err(QaError::InvalidConfigurationError(format!(
                "QA head must be one of {{LinearQAHead, RecurrentQAHead}}, got {}",
                s
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
/// # Task the head is built for
pub enum TaskKind {
    /// Span prediction, optionally with auxiliary objectives
    #[serde(rename = "QA")]
    QA,
    /// Question / answer subjectivity classification
    #[serde(rename = "Sbj_Classification")]
    SbjClassification,
    /// Review domain classification
    #[serde(rename = "Domain_Classification")]
    DomainClassification,
    /// Sequential transfer over every task
    #[serde(rename = "all")]
    All,
}

impl FromStr for TaskKind {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QA" => Ok(TaskKind::QA),
            "Sbj_Classification" => Ok(TaskKind::SbjClassification),
            "Domain_Classification" => Ok(TaskKind::DomainClassification),
            "all" => Ok(TaskKind::All),
            _ => Err(QaError::InvalidConfigurationError(format!(
                "Task must be one of {{QA, Sbj_Classification, Domain_Classification, all}}, got {}",
                s
            ))),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
/// # Configuration of a question answering head
/// Immutable once the head is built. The flag combination is validated by [`QAHeadConfig::layout`]
/// into a [`HeadLayout`], which decides exactly which parameter groups are created.
pub struct QAHeadConfig {
    pub head: HeadKind,
    /// Size of the encoder representations
    pub hidden_size: i64,
    /// Number of span labels (start and end), must be 2
    #[serde(default = "default_num_labels")]
    pub num_labels: i64,
    #[serde(default = "default_dropout")]
    pub qa_dropout_prob: f64,
    #[serde(default = "default_dropout")]
    pub aux_dropout_prob: f64,
    #[serde(default)]
    pub highway_connection: bool,
    #[serde(default)]
    pub multitask: bool,
    #[serde(default)]
    pub n_aux_tasks: Option<usize>,
    #[serde(default)]
    pub adversarial: bool,
    #[serde(default)]
    pub dataset_agnostic: bool,
    #[serde(default)]
    pub review_agnostic: bool,
    #[serde(default)]
    pub n_domain_labels: Option<i64>,
    /// None for the binary (answer, question) subjectivity task, the number of classes otherwise
    #[serde(default)]
    pub n_qa_type_labels: Option<i64>,
    #[serde(default = "default_task")]
    pub task: TaskKind,
    #[serde(default = "default_recurrent_cell")]
    pub recurrent_cell: RecurrentCell,
    #[serde(default = "default_recurrent_layers")]
    pub n_recurrent_layers: i64,
    /// Width of the auxiliary target vectors concatenated onto every token before the QA projection
    #[serde(default)]
    pub n_aux_target_features: Option<i64>,
    #[serde(default = "default_grl_lambda")]
    pub grl_lambda: f64,
}

fn default_num_labels() -> i64 {
    2
}

fn default_dropout() -> f64 {
    0.1
}

fn default_task() -> TaskKind {
    TaskKind::QA
}

fn default_recurrent_cell() -> RecurrentCell {
    RecurrentCell::LSTM
}

fn default_recurrent_layers() -> i64 {
    2
}

fn default_grl_lambda() -> f64 {
    1.0
}

impl Config for QAHeadConfig {}

impl QAHeadConfig {
    /// Single-task configuration for the given head and hidden size
    pub fn new(head: HeadKind, hidden_size: i64) -> QAHeadConfig {
        QAHeadConfig {
            head,
            hidden_size,
            num_labels: default_num_labels(),
            qa_dropout_prob: default_dropout(),
            aux_dropout_prob: default_dropout(),
            highway_connection: false,
            multitask: false,
            n_aux_tasks: None,
            adversarial: false,
            dataset_agnostic: false,
            review_agnostic: false,
            n_domain_labels: None,
            n_qa_type_labels: None,
            task: default_task(),
            recurrent_cell: default_recurrent_cell(),
            n_recurrent_layers: default_recurrent_layers(),
            n_aux_target_features: None,
            grl_lambda: default_grl_lambda(),
        }
    }

    /// Validates the flag combination and resolves it into a [`HeadLayout`].
    pub fn layout(&self) -> Result<HeadLayout, QaError> {
        if self.num_labels != 2 {
            return Err(configuration_error(format!(
                "QA head predicts start and end positions, num_labels must be 2, got {}",
                self.num_labels
            )));
        }
        if self.hidden_size < 1 {
            return Err(configuration_error(format!(
                "Hidden size must be positive, got {}",
                self.hidden_size
            )));
        }
        if let Some(n_aux_tasks) = self.n_aux_tasks {
            if n_aux_tasks > 2 {
                return Err(configuration_error(format!(
                    "Model cannot perform more than 2 auxiliary tasks along the main task, got {}",
                    n_aux_tasks
                )));
            }
            if !self.multitask && n_aux_tasks > 0 {
                return Err(configuration_error(format!(
                    "{} auxiliary tasks requested without the multitask setting",
                    n_aux_tasks
                )));
            }
        }
        if self.multitask && self.n_aux_tasks.is_none() {
            return Err(configuration_error(
                "If MTL setting, number of auxiliary tasks must be defined",
            ));
        }
        if let Some(n_labels) = self.n_qa_type_labels {
            if n_labels < 2 {
                return Err(configuration_error(format!(
                    "Multi-way question-answer type classification requires at least 2 labels, got {}",
                    n_labels
                )));
            }
        }
        if let Some(n_labels) = self.n_domain_labels {
            if n_labels < 2 {
                return Err(configuration_error(format!(
                    "Domain classification requires at least 2 labels, got {}",
                    n_labels
                )));
            }
        }
        if let Some(n_features) = self.n_aux_target_features {
            if n_features < 1 {
                return Err(configuration_error(format!(
                    "Auxiliary target feature size must be positive, got {}",
                    n_features
                )));
            }
        }
        if self.adversarial && !(self.task == TaskKind::QA && self.multitask) {
            return Err(configuration_error(
                "Adversarial training is only defined for multitask QA heads",
            ));
        }
        if self.dataset_agnostic && !self.adversarial {
            return Err(configuration_error(
                "Dataset classification task must be defined as an adversarial task",
            ));
        }

        let labels = match self.n_qa_type_labels {
            Some(n_labels) => SubjectivityLabels::MultiWay(n_labels),
            None => SubjectivityLabels::Binary,
        };
        let adversary = if self.adversarial {
            Some(Adversary {
                lambda: self.grl_lambda,
                reverse_subjectivity: !(self.dataset_agnostic || self.review_agnostic),
            })
        } else {
            None
        };

        Ok(match self.task {
            TaskKind::QA => match (self.multitask, self.n_aux_tasks.unwrap_or(0)) {
                (false, _) | (true, 0) => HeadLayout::SingleTask,
                (true, 1) => HeadLayout::Subjectivity { labels, adversary },
                (true, _) => match adversary {
                    Some(adversary) if self.dataset_agnostic => {
                        HeadLayout::SubjectivityDataset { labels, adversary }
                    }
                    _ => HeadLayout::SubjectivityDomain {
                        labels,
                        n_domain_labels: self.required_domain_labels(
                            "Total number of domain labels must be provided for a second auxiliary domain task",
                        )?,
                        adversary,
                    },
                },
            },
            TaskKind::SbjClassification => HeadLayout::SubjectivityClassification { labels },
            TaskKind::DomainClassification => HeadLayout::DomainClassification {
                n_domain_labels: self.required_domain_labels(
                    "If model is to perform domain classification, domain labels must be provided",
                )?,
            },
            TaskKind::All => HeadLayout::Sequential {
                labels,
                n_domain_labels: self.required_domain_labels(
                    "If model is to perform sequential transfer, total number of domain labels must be provided",
                )?,
            },
        })
    }

    fn required_domain_labels(&self, message: &str) -> Result<i64, QaError> {
        self.n_domain_labels
            .ok_or_else(|| configuration_error(message))
    }
}

fn configuration_error<S: Into<String>>(message: S) -> QaError {
    QaError::InvalidConfigurationError(message.into())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Output shape of the subjectivity classifier
pub enum SubjectivityLabels {
    /// One logit for the answer and one for the question
    Binary,
    /// One multi-way logit vector over question-answer types
    MultiWay(i64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
/// Adversarial (gradient reversal) settings of a multitask head
pub struct Adversary {
    /// Scale of the reversed gradient
    pub lambda: f64,
    /// Whether the subjectivity classifier is adversarial as well (false for dataset- or review-agnostic setups)
    pub reverse_subjectivity: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
/// # Validated combination of task kind, auxiliary tasks and adversarial training
/// Every variant carries exactly what is needed to build its parameter groups.
pub enum HeadLayout {
    /// Span prediction only
    SingleTask,
    /// Span prediction + subjectivity
    Subjectivity {
        labels: SubjectivityLabels,
        adversary: Option<Adversary>,
    },
    /// Span prediction + subjectivity + review domain
    SubjectivityDomain {
        labels: SubjectivityLabels,
        n_domain_labels: i64,
        adversary: Option<Adversary>,
    },
    /// Span prediction + subjectivity + adversarial dataset classification
    SubjectivityDataset {
        labels: SubjectivityLabels,
        adversary: Adversary,
    },
    /// Subjectivity classification model
    SubjectivityClassification { labels: SubjectivityLabels },
    /// Domain classification model
    DomainClassification { n_domain_labels: i64 },
    /// Sequential transfer: subjectivity and domain classifiers next to the span predictor
    Sequential {
        labels: SubjectivityLabels,
        n_domain_labels: i64,
    },
}

/// Auxiliary objectives optimised jointly with the span prediction loss
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuxiliaryObjectives {
    None,
    Subjectivity,
    SubjectivityDomain,
    SubjectivityDataset,
}

impl AuxiliaryObjectives {
    pub fn n_aux_tasks(&self) -> usize {
        match self {
            AuxiliaryObjectives::None => 0,
            AuxiliaryObjectives::Subjectivity => 1,
            AuxiliaryObjectives::SubjectivityDomain
            | AuxiliaryObjectives::SubjectivityDataset => 2,
        }
    }
}

impl HeadLayout {
    pub fn adversary(&self) -> Option<Adversary> {
        match self {
            HeadLayout::Subjectivity { adversary, .. }
            | HeadLayout::SubjectivityDomain { adversary, .. } => *adversary,
            HeadLayout::SubjectivityDataset { adversary, .. } => Some(*adversary),
            _ => None,
        }
    }

    pub fn subjectivity_labels(&self) -> Option<SubjectivityLabels> {
        match self {
            HeadLayout::Subjectivity { labels, .. }
            | HeadLayout::SubjectivityDomain { labels, .. }
            | HeadLayout::SubjectivityDataset { labels, .. }
            | HeadLayout::SubjectivityClassification { labels }
            | HeadLayout::Sequential { labels, .. } => Some(*labels),
            HeadLayout::SingleTask | HeadLayout::DomainClassification { .. } => None,
        }
    }

    pub fn n_domain_labels(&self) -> Option<i64> {
        match self {
            HeadLayout::SubjectivityDomain {
                n_domain_labels, ..
            }
            | HeadLayout::DomainClassification { n_domain_labels }
            | HeadLayout::Sequential {
                n_domain_labels, ..
            } => Some(*n_domain_labels),
            _ => None,
        }
    }

    pub fn has_dataset_classifier(&self) -> bool {
        matches!(self, HeadLayout::SubjectivityDataset { .. })
    }

    /// Objectives of the joint QA training loop, None for classification-only heads.
    pub fn auxiliary_objectives(&self) -> Option<AuxiliaryObjectives> {
        match self {
            HeadLayout::SingleTask => Some(AuxiliaryObjectives::None),
            HeadLayout::Subjectivity { .. } => Some(AuxiliaryObjectives::Subjectivity),
            HeadLayout::SubjectivityDomain { .. } | HeadLayout::Sequential { .. } => {
                Some(AuxiliaryObjectives::SubjectivityDomain)
            }
            HeadLayout::SubjectivityDataset { .. } => {
                Some(AuxiliaryObjectives::SubjectivityDataset)
            }
            HeadLayout::SubjectivityClassification { .. }
            | HeadLayout::DomainClassification { .. } => None,
        }
    }
}
