use crate::heads::{AuxiliaryObjectives, HeadLayout, SubjectivityLabels, SubjectivityLogits};
use crate::training::batch::QABatch;
use crate::training::config::QaType;
use crate::QaError;
use tch::{Kind, Reduction, Tensor};

/// Class weights of the auxiliary objectives
#[derive(Default)]
pub struct AuxiliaryLossWeights {
    /// Positive-class weight of the binary subjectivity loss (1 element), or class weights of
    /// the multi-way question-answer type loss (*n_qa_type_labels* elements)
    pub qa_type_weights: Option<Tensor>,
    /// Class weights of the domain loss (*n_domain_labels* elements)
    pub domain_weights: Option<Tensor>,
}

/// # Combined loss of the span prediction and auxiliary objectives
/// The span loss is the mean of the start and end cross-entropies. Every auxiliary loss is
/// averaged with it: `(qa + sbj) / 2` for one auxiliary task, `(qa + sbj + aux_2) / 3` for two.
pub struct MultitaskLoss {
    objectives: AuxiliaryObjectives,
    labels: SubjectivityLabels,
    qa_type: QaType,
    qa_type_weights: Option<Tensor>,
    domain_weights: Option<Tensor>,
}

impl MultitaskLoss {
    /// Validates the class weights against the head layout.
    pub fn new(
        layout: &HeadLayout,
        qa_type: QaType,
        weights: AuxiliaryLossWeights,
    ) -> Result<MultitaskLoss, QaError> {
        let objectives = layout.auxiliary_objectives().ok_or_else(|| {
            QaError::InvalidConfigurationError(format!(
                "Head layout {:?} has no span prediction objective to train",
                layout
            ))
        })?;
        let labels = layout
            .subjectivity_labels()
            .unwrap_or(SubjectivityLabels::Binary);

        let qa_type_weights = if objectives.n_aux_tasks() > 0 {
            let qa_type_weights = weights.qa_type_weights.ok_or_else(|| {
                QaError::InvalidConfigurationError(
                    "Tensor of class weights for question-answer types is not provided".into(),
                )
            })?;
            let expected = match labels {
                SubjectivityLabels::Binary => 1,
                SubjectivityLabels::MultiWay(n_labels) => n_labels,
            };
            if qa_type_weights.size() != [expected] {
                return Err(QaError::InvalidConfigurationError(format!(
                    "Expected {} question-answer type weights, got a tensor of shape {:?}",
                    expected,
                    qa_type_weights.size()
                )));
            }
            Some(qa_type_weights.to_kind(Kind::Float))
        } else {
            None
        };

        let domain_weights = match (objectives, layout.n_domain_labels()) {
            (AuxiliaryObjectives::SubjectivityDomain, Some(n_domain_labels)) => {
                let domain_weights = weights.domain_weights.ok_or_else(|| {
                    QaError::InvalidConfigurationError(
                        "Tensor of class weights for different domains is not provided".into(),
                    )
                })?;
                if domain_weights.size() != [n_domain_labels] {
                    return Err(QaError::InvalidConfigurationError(format!(
                        "Expected {} domain weights, got a tensor of shape {:?}",
                        n_domain_labels,
                        domain_weights.size()
                    )));
                }
                Some(domain_weights.to_kind(Kind::Float))
            }
            _ => None,
        };

        Ok(MultitaskLoss {
            objectives,
            labels,
            qa_type,
            qa_type_weights,
            domain_weights,
        })
    }

    pub fn objectives(&self) -> AuxiliaryObjectives {
        self.objectives
    }

    /// Mean of the start and end position cross-entropies
    pub fn span_loss(
        start_logits: &Tensor,
        end_logits: &Tensor,
        start_positions: &Tensor,
        end_positions: &Tensor,
    ) -> Tensor {
        let start_loss = start_logits.cross_entropy_for_logits(start_positions);
        let end_loss = end_logits.cross_entropy_for_logits(end_positions);
        (start_loss + end_loss) / 2.0
    }

    /// Logits of the configured question-answer type
    pub fn select_subjectivity_logits<'a>(&self, logits: &'a SubjectivityLogits) -> &'a Tensor {
        match (logits, self.qa_type) {
            (SubjectivityLogits::Binary { question, .. }, QaType::Question) => question,
            (SubjectivityLogits::Binary { answer, .. }, QaType::Answer) => answer,
            (SubjectivityLogits::MultiWay(logits), _) => logits,
        }
    }

    /// Weighted binary cross-entropy (positive-class weight) or weighted multi-way cross-entropy
    pub fn subjectivity_loss(
        &self,
        logits: &SubjectivityLogits,
        batch: &QABatch,
    ) -> Result<Tensor, QaError> {
        let weights = self.qa_type_weights.as_ref().ok_or_else(|| {
            QaError::InvalidConfigurationError(
                "Subjectivity loss requested without an auxiliary subjectivity objective".into(),
            )
        })?;
        let targets = batch.subjectivity_labels(self.qa_type)?;
        let logits = self.select_subjectivity_logits(logits);
        Ok(match self.labels {
            SubjectivityLabels::Binary => logits.binary_cross_entropy_with_logits::<&Tensor>(
                &targets.to_kind(logits.kind()),
                None,
                Some(&weights.to_device(logits.device())),
                Reduction::Mean,
            ),
            SubjectivityLabels::MultiWay(_) => logits.log_softmax(-1, Kind::Float).g_nll_loss::<&Tensor>(
                &targets.to_kind(Kind::Int64),
                Some(&weights.to_device(logits.device())),
                Reduction::Mean,
                -100,
            ),
        })
    }

    /// Weighted multi-way domain cross-entropy
    pub fn domain_loss(&self, logits: &Tensor, batch: &QABatch) -> Result<Tensor, QaError> {
        let weights = self.domain_weights.as_ref().ok_or_else(|| {
            QaError::InvalidConfigurationError(
                "Domain loss requested without an auxiliary domain objective".into(),
            )
        })?;
        Ok(logits.log_softmax(-1, Kind::Float).g_nll_loss::<&Tensor>(
            &batch.domain_labels()?.to_kind(Kind::Int64),
            Some(&weights.to_device(logits.device())),
            Reduction::Mean,
            -100,
        ))
    }

    /// Binary cross-entropy of the adversarial dataset classifier
    pub fn dataset_loss(&self, logits: &Tensor, batch: &QABatch) -> Result<Tensor, QaError> {
        let targets = batch.dataset_labels()?.to_kind(logits.kind());
        Ok(logits.binary_cross_entropy_with_logits::<&Tensor>(
            &targets,
            None,
            None,
            Reduction::Mean,
        ))
    }

    /// Mean of the span loss and the auxiliary losses
    pub fn combine(span_loss: Tensor, auxiliary_losses: Vec<Tensor>) -> Tensor {
        let n_losses = (auxiliary_losses.len() + 1) as f64;
        auxiliary_losses
            .into_iter()
            .fold(span_loss, |total, loss| total + loss)
            / n_losses
    }
}
