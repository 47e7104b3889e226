use crate::encoder::EncoderOutput;
use crate::heads::classifiers::SubjectivityLogits;
use crate::modules::RecurrentState;
use crate::QaError;
use std::str::FromStr;
use tch::Tensor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// # Output requested from a task head
pub enum TaskSelector {
    /// Start and end logits over every token position
    QA,
    /// Subjectivity logits (question / answer or question-answer type)
    SbjClass,
    /// Review domain logits
    DomainClass,
    /// Adversarial dataset logit
    DatasetClass,
}

impl FromStr for TaskSelector {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QA" => Ok(TaskSelector::QA),
            "Sbj_Class" => Ok(TaskSelector::SbjClass),
            "Domain_Class" => Ok(TaskSelector::DomainClass),
            "Dataset_Class" => Ok(TaskSelector::DatasetClass),
            _ => Err(QaError::InvalidConfigurationError(format!(
                "Task selector must be one of {{QA, Sbj_Class, Domain_Class, Dataset_Class}}, got {}",
                s
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Hidden states returned next to the logits, used by consistency losses
pub enum HiddenStateRequest {
    None,
    /// Pooled head representation (first position for the linear head, last valid position for the recurrent head)
    LastCls,
    /// Layers before the final encoder layer (linear head: two layers, recurrent head: the final layer)
    LastLayers,
    /// First-position vector of every encoder layer
    AllCls,
    /// Every encoder layer
    All,
}

impl Default for HiddenStateRequest {
    fn default() -> Self {
        HiddenStateRequest::None
    }
}

/// Hidden states returned on request
pub enum AuxiliaryHiddenStates {
    /// Tensor of shape (*batch size*, *hidden_size*)
    Pooled(Tensor),
    /// One tensor per encoder layer
    Layers(Vec<Tensor>),
}

/// # Input of a task head
pub struct HeadInput<'a> {
    /// Output of the sequence encoder. Hidden-state requests other than `LastCls` need `all_hidden_states`.
    pub encoder_output: &'a EncoderOutput,
    /// True sequence lengths of shape (*batch size*), required by the recurrent head
    pub input_lengths: Option<&'a Tensor>,
    /// Initial state of the recurrent re-encoder. If None, zero states are used.
    pub recurrent_state: Option<&'a RecurrentState>,
    /// Auxiliary target values of shape (*batch size*, *n_aux_target_features*) concatenated onto every token
    pub aux_targets: Option<&'a Tensor>,
    pub hidden_state_request: HiddenStateRequest,
}

impl<'a> HeadInput<'a> {
    pub fn new(encoder_output: &'a EncoderOutput) -> HeadInput<'a> {
        HeadInput {
            encoder_output,
            input_lengths: None,
            recurrent_state: None,
            aux_targets: None,
            hidden_state_request: HiddenStateRequest::None,
        }
    }

    pub fn with_lengths(mut self, input_lengths: &'a Tensor) -> Self {
        self.input_lengths = Some(input_lengths);
        self
    }

    pub fn with_recurrent_state(mut self, recurrent_state: &'a RecurrentState) -> Self {
        self.recurrent_state = Some(recurrent_state);
        self
    }

    pub fn with_aux_targets(mut self, aux_targets: &'a Tensor) -> Self {
        self.aux_targets = Some(aux_targets);
        self
    }

    pub fn with_hidden_states(mut self, request: HiddenStateRequest) -> Self {
        self.hidden_state_request = request;
        self
    }
}

/// Logits produced for a [`TaskSelector`]
pub enum TaskLogits {
    /// Start and end logits, each of shape (*batch size*, *sequence_length*)
    Span {
        start_logits: Tensor,
        end_logits: Tensor,
    },
    Subjectivity(SubjectivityLogits),
    /// Shape (*batch size*, *n_domain_labels*)
    Domain(Tensor),
    /// Shape (*batch size*)
    Dataset(Tensor),
}

fn unexpected_output(expected: &str) -> QaError {
    QaError::ValueError(format!("Head output does not contain {} logits", expected))
}

impl TaskLogits {
    pub fn into_span(self) -> Result<(Tensor, Tensor), QaError> {
        match self {
            TaskLogits::Span {
                start_logits,
                end_logits,
            } => Ok((start_logits, end_logits)),
            _ => Err(unexpected_output("span")),
        }
    }

    pub fn into_subjectivity(self) -> Result<SubjectivityLogits, QaError> {
        match self {
            TaskLogits::Subjectivity(logits) => Ok(logits),
            _ => Err(unexpected_output("subjectivity")),
        }
    }

    pub fn into_domain(self) -> Result<Tensor, QaError> {
        match self {
            TaskLogits::Domain(logits) => Ok(logits),
            _ => Err(unexpected_output("domain")),
        }
    }

    pub fn into_dataset(self) -> Result<Tensor, QaError> {
        match self {
            TaskLogits::Dataset(logits) => Ok(logits),
            _ => Err(unexpected_output("dataset")),
        }
    }
}

/// Container for the output of a task head
pub struct HeadOutput {
    pub logits: TaskLogits,
    pub hidden_states: Option<AuxiliaryHiddenStates>,
}
