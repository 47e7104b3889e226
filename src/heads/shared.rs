use crate::common::layers::{xavier_linear, Dropout};
use crate::encoder::EncoderOutput;
use crate::heads::classifiers::AuxiliaryClassifiers;
use crate::heads::config::{HeadLayout, QAHeadConfig};
use crate::heads::output::{
    AuxiliaryHiddenStates, HeadInput, HeadOutput, HiddenStateRequest, TaskLogits, TaskSelector,
};
use crate::modules::GradientReversal;
use crate::QaError;
use std::borrow::Borrow;
use std::ops::Range;
use tch::{nn, Tensor};

/// Encoder layers returned for `HiddenStateRequest::LastLayers`
#[derive(Clone, Copy, Debug)]
pub(crate) enum LastLayers {
    /// The two layers preceding the final layer
    BeforeFinal,
    Final,
}

impl LastLayers {
    fn range(self, n_hidden_states: usize) -> Option<Range<usize>> {
        match self {
            LastLayers::BeforeFinal if n_hidden_states >= 3 => {
                Some(n_hidden_states - 3..n_hidden_states - 1)
            }
            LastLayers::Final if n_hidden_states >= 1 => Some(n_hidden_states - 1..n_hidden_states),
            _ => None,
        }
    }
}

/// Parameters and task dispatch shared by the linear and recurrent heads
pub(crate) struct TaskHeadCore {
    layout: HeadLayout,
    pub(crate) qa_dropout: Dropout,
    fc_qa: nn::Linear,
    n_aux_target_features: Option<i64>,
    classifiers: AuxiliaryClassifiers,
}

impl TaskHeadCore {
    pub(crate) fn new<'p, P>(p: P, config: &QAHeadConfig, layout: HeadLayout) -> TaskHeadCore
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let qa_in_size = config.hidden_size + config.n_aux_target_features.unwrap_or(0);
        TaskHeadCore {
            layout,
            qa_dropout: Dropout::new(config.qa_dropout_prob),
            fc_qa: xavier_linear(p / "fc_qa", qa_in_size, config.num_labels),
            n_aux_target_features: config.n_aux_target_features,
            classifiers: AuxiliaryClassifiers::new(
                p,
                &layout,
                config.hidden_size,
                config.aux_dropout_prob,
            ),
        }
    }

    pub(crate) fn layout(&self) -> &HeadLayout {
        &self.layout
    }

    /// Produces the logits and requested hidden states from the head representation.
    ///
    /// * `representation` - token representations of shape (*batch size*, *sequence_length*, *hidden_size*)
    /// * `pooled` - pooled representation of shape (*batch size*, *hidden_size*)
    pub(crate) fn forward_t(
        &self,
        task: TaskSelector,
        representation: &Tensor,
        pooled: &Tensor,
        input: &HeadInput,
        last_layers: LastLayers,
        train: bool,
    ) -> Result<HeadOutput, QaError> {
        let logits = match task {
            TaskSelector::QA => self.span_logits(representation, input.aux_targets)?,
            _ if input.aux_targets.is_some() => {
                return Err(QaError::ValueError(format!(
                    "Auxiliary targets are only concatenated for the QA task, got {:?}",
                    task
                )));
            }
            TaskSelector::SbjClass => self.subjectivity_logits(pooled, train)?,
            TaskSelector::DomainClass => self.domain_logits(pooled, train)?,
            TaskSelector::DatasetClass => self.dataset_logits(pooled, train)?,
        };
        let hidden_states = hidden_state_outputs(
            input.hidden_state_request,
            pooled,
            input.encoder_output,
            last_layers,
        )?;
        Ok(HeadOutput {
            logits,
            hidden_states,
        })
    }

    fn span_logits(
        &self,
        representation: &Tensor,
        aux_targets: Option<&Tensor>,
    ) -> Result<TaskLogits, QaError> {
        let representation = match (self.n_aux_target_features, aux_targets) {
            (None, None) => representation.shallow_clone(),
            (Some(n_features), Some(aux_targets)) => {
                let (batch_size, sequence_length, _) = representation.size3()?;
                if aux_targets.size() != [batch_size, n_features] {
                    return Err(QaError::ValueError(format!(
                        "Expected auxiliary targets of shape [{}, {}], got {:?}",
                        batch_size,
                        n_features,
                        aux_targets.size()
                    )));
                }
                let aux_targets = aux_targets
                    .to_kind(representation.kind())
                    .unsqueeze(1)
                    .expand([batch_size, sequence_length, n_features].as_slice(), true);
                Tensor::cat(&[representation.shallow_clone(), aux_targets], -1)
            }
            (None, Some(_)) => {
                return Err(QaError::InvalidConfigurationError(
                    "Auxiliary targets supplied to a QA projection built without auxiliary target features"
                        .into(),
                ));
            }
            (Some(n_features), None) => {
                return Err(QaError::ValueError(format!(
                    "QA projection expects {} auxiliary target features per example",
                    n_features
                )));
            }
        };

        let logits = representation.apply(&self.fc_qa).split(1, -1);
        match logits.as_slice() {
            [start_logits, end_logits] => Ok(TaskLogits::Span {
                start_logits: start_logits.squeeze_dim(-1),
                end_logits: end_logits.squeeze_dim(-1),
            }),
            _ => Err(QaError::ValueError(format!(
                "QA projection must produce start and end logits, got {} outputs",
                logits.len()
            ))),
        }
    }

    fn reverse(&self, input: &Tensor, enabled: bool) -> Tensor {
        match self.layout.adversary() {
            Some(adversary) if enabled => GradientReversal::new(adversary.lambda).forward(input),
            _ => input.shallow_clone(),
        }
    }

    fn subjectivity_logits(&self, pooled: &Tensor, train: bool) -> Result<TaskLogits, QaError> {
        let classifier = self
            .classifiers
            .subjectivity()
            .ok_or_else(|| missing_classifier("subjectivity", &self.layout))?;
        let reverse_subjectivity = self
            .layout
            .adversary()
            .map_or(false, |adversary| adversary.reverse_subjectivity);
        Ok(TaskLogits::Subjectivity(classifier.forward_t(
            &self.reverse(pooled, reverse_subjectivity),
            train,
        )))
    }

    fn domain_logits(&self, pooled: &Tensor, train: bool) -> Result<TaskLogits, QaError> {
        let classifier = self
            .classifiers
            .domain()
            .ok_or_else(|| missing_classifier("domain", &self.layout))?;
        Ok(TaskLogits::Domain(
            classifier.forward_t(&self.reverse(pooled, true), train),
        ))
    }

    fn dataset_logits(&self, pooled: &Tensor, train: bool) -> Result<TaskLogits, QaError> {
        let classifier = self.classifiers.dataset().ok_or_else(|| {
            QaError::InvalidConfigurationError(
                "Dataset classification requires an adversarial, dataset-agnostic multitask head"
                    .into(),
            )
        })?;
        Ok(TaskLogits::Dataset(
            classifier
                .forward_t(&self.reverse(pooled, true), train)
                .squeeze_dim(-1),
        ))
    }
}

fn missing_classifier(name: &str, layout: &HeadLayout) -> QaError {
    QaError::InvalidConfigurationError(format!(
        "No {} classifier was built for head layout {:?}",
        name, layout
    ))
}

fn hidden_state_outputs(
    request: HiddenStateRequest,
    pooled: &Tensor,
    encoder_output: &EncoderOutput,
    last_layers: LastLayers,
) -> Result<Option<AuxiliaryHiddenStates>, QaError> {
    let all_hidden_states = || {
        encoder_output.all_hidden_states.as_deref().ok_or_else(|| {
            QaError::ValueError(format!(
                "{:?} hidden states requested but the encoder did not output its layers",
                request
            ))
        })
    };

    Ok(match request {
        HiddenStateRequest::None => None,
        HiddenStateRequest::LastCls => Some(AuxiliaryHiddenStates::Pooled(pooled.shallow_clone())),
        HiddenStateRequest::LastLayers => {
            let hidden_states = all_hidden_states()?;
            let range = last_layers.range(hidden_states.len()).ok_or_else(|| {
                QaError::ValueError(format!(
                    "Not enough encoder layers ({}) for {:?} hidden states",
                    hidden_states.len(),
                    last_layers
                ))
            })?;
            Some(AuxiliaryHiddenStates::Layers(
                hidden_states[range].iter().map(Tensor::shallow_clone).collect(),
            ))
        }
        HiddenStateRequest::AllCls => Some(AuxiliaryHiddenStates::Layers(
            all_hidden_states()?
                .iter()
                .skip(1)
                .map(|layer| layer.select(1, 0))
                .collect(),
        )),
        HiddenStateRequest::All => Some(AuxiliaryHiddenStates::Layers(
            all_hidden_states()?
                .iter()
                .skip(1)
                .map(Tensor::shallow_clone)
                .collect(),
        )),
    })
}
