//! # Sequence encoders
//!
//! The task heads only depend on the [`SequenceEncoder`] trait: given token ids, an attention mask
//! and segment ids, produce per-token hidden vectors and (optionally) every intermediate layer.
//! A BERT implementation is provided in [`BertModel`].

mod bert;

pub use bert::{BertConfig, BertEmbeddings, BertLayer, BertModel, BertSelfAttention};

use crate::QaError;
use std::str::FromStr;
use tch::Tensor;

/// Container for the output of a [`SequenceEncoder`].
pub struct EncoderOutput {
    /// Last hidden states, shape (*batch size*, *sequence_length*, *hidden_size*)
    pub hidden_state: Tensor,
    /// Embedding output followed by the output of each transformer layer (length *num_hidden_layers* + 1)
    pub all_hidden_states: Option<Vec<Tensor>>,
}

/// # Pretrained transformer producing contextual token representations
pub trait SequenceEncoder {
    /// Dimension of the token representations
    fn hidden_size(&self) -> i64;

    /// Number of transformer layers
    fn num_hidden_layers(&self) -> i64;

    /// Forward pass through the encoder
    ///
    /// # Arguments
    ///
    /// * `input_ids` - input tensor of shape (*batch size*, *sequence_length*)
    /// * `attention_mask` - Optional mask of shape (*batch size*, *sequence_length*). Masked position have value 0, non-masked value 1. If None set to 1
    /// * `token_type_ids` - Optional segment id of shape (*batch size*, *sequence_length*). If None set to 0.
    /// * `position_ids` - Optional position ids of shape (*batch size*, *sequence_length*). If None, will be incremented from 0.
    /// * `head_mask` - Optional mask of shape (*num_hidden_layers*, *num_attention_heads*) or (*num_attention_heads*) nullifying selected attention heads
    /// * `train` - boolean flag to turn on/off the dropout layers in the model. Should be set to false for inference.
    fn forward_t(
        &self,
        input_ids: &Tensor,
        attention_mask: Option<&Tensor>,
        token_type_ids: Option<&Tensor>,
        position_ids: Option<&Tensor>,
        head_mask: Option<&Tensor>,
        train: bool,
    ) -> Result<EncoderOutput, QaError>;
}

/// # Casing of the pretrained BERT weights to fine-tune
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PretrainedWeights {
    Cased,
    Uncased,
}

impl PretrainedWeights {
    /// Name of the whole-word-masking SQuAD checkpoint for this casing
    pub fn model_name(&self) -> &'static str {
        match self {
            PretrainedWeights::Cased => "bert-large-cased-whole-word-masking-finetuned-squad",
            PretrainedWeights::Uncased => "bert-large-uncased-whole-word-masking-finetuned-squad",
        }
    }

    /// Whether the matching vocabulary expects lower-cased input
    pub fn lower_case(&self) -> bool {
        matches!(self, PretrainedWeights::Uncased)
    }
}

impl FromStr for PretrainedWeights {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cased" => Ok(PretrainedWeights::Cased),
            "uncased" => Ok(PretrainedWeights::Uncased),
            _ => Err(QaError::InvalidConfigurationError(format!(
                "Pretrained weights must be loaded from an uncased or cased BERT model, got {}",
                s
            ))),
        }
    }
}
