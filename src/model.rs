//! # Question answering model
//!
//! Composition of a [`SequenceEncoder`] and exactly one [`QAHead`]. The encoder runs once per
//! call, the [`TaskSelector`] chooses which output of the head is produced.

use crate::encoder::{BertConfig, BertModel, EncoderOutput, SequenceEncoder};
use crate::heads::{HeadInput, HeadLayout, HeadOutput, QAHead, QAHeadConfig, TaskSelector};
use crate::QaError;
use std::borrow::Borrow;
use tch::{nn, Tensor};

/// # Encoder with a question answering head
/// Parameters of a model built with [`QAModel::from_bert`] are named `bert.*` (encoder) and
/// `qa_head.*` (head).
pub struct QAModel<E: SequenceEncoder> {
    encoder: E,
    head: QAHead,
}

impl QAModel<BertModel> {
    /// Build a BERT encoder and the configured head under the same variable store path
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the model
    /// * `bert_config` - `BertConfig` object defining the encoder architecture
    /// * `head_config` - `QAHeadConfig` object defining the head
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rust_subjqa::encoder::BertConfig;
    /// use rust_subjqa::heads::{HeadKind, QAHeadConfig};
    /// use rust_subjqa::{Config, QAModel};
    /// use tch::{nn, Device};
    ///
    /// # fn main() -> Result<(), rust_subjqa::QaError> {
    /// let vs = nn::VarStore::new(Device::cuda_if_available());
    /// let bert_config = BertConfig::from_file("path/to/config.json")?;
    /// let head_config = QAHeadConfig::new(HeadKind::Recurrent, bert_config.hidden_size);
    /// let model = QAModel::from_bert(vs.root(), &bert_config, &head_config)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_bert<'p, P>(
        p: P,
        bert_config: &BertConfig,
        head_config: &QAHeadConfig,
    ) -> Result<QAModel<BertModel>, QaError>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let encoder = BertModel::new(p / "bert", bert_config)?;
        QAModel::new(p, encoder, head_config)
    }
}

impl<E: SequenceEncoder> QAModel<E> {
    /// Wraps an existing encoder, building the head under `p / "qa_head"`.
    pub fn new<'p, P>(p: P, encoder: E, head_config: &QAHeadConfig) -> Result<QAModel<E>, QaError>
    where
        P: Borrow<nn::Path<'p>>,
    {
        if encoder.hidden_size() != head_config.hidden_size {
            return Err(QaError::InvalidConfigurationError(format!(
                "Head hidden size ({}) does not match the encoder hidden size ({})",
                head_config.hidden_size,
                encoder.hidden_size()
            )));
        }
        let head = QAHead::new(p.borrow() / "qa_head", head_config)?;
        Ok(QAModel { encoder, head })
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    pub fn head(&self) -> &QAHead {
        &self.head
    }

    pub fn layout(&self) -> &HeadLayout {
        self.head.layout()
    }

    /// Runs the encoder only, so that several task outputs can share one representation.
    pub fn encode(
        &self,
        input_ids: &Tensor,
        attention_mask: Option<&Tensor>,
        token_type_ids: Option<&Tensor>,
        train: bool,
    ) -> Result<EncoderOutput, QaError> {
        self.encoder
            .forward_t(input_ids, attention_mask, token_type_ids, None, None, train)
    }

    /// Runs the head on a previously computed encoder output.
    pub fn forward_head(
        &self,
        task: TaskSelector,
        input: &HeadInput,
        train: bool,
    ) -> Result<HeadOutput, QaError> {
        self.head.forward_t(task, input, train)
    }

    /// Forward pass through the model
    ///
    /// # Arguments
    ///
    /// * `task` - `TaskSelector` choosing the logits to produce
    /// * `input_ids` - input tensor of shape (*batch size*, *sequence_length*)
    /// * `attention_mask` - Optional mask of shape (*batch size*, *sequence_length*). Masked position have value 0, non-masked value 1. If None set to 1
    /// * `token_type_ids` - Optional segment id of shape (*batch size*, *sequence_length*). If None set to 0.
    /// * `input_lengths` - Optional true sequence lengths of shape (*batch size*), required by the recurrent head
    /// * `train` - boolean flag to turn on/off the dropout layers in the model. Should be set to false for inference.
    ///
    /// # Returns
    ///
    /// * `HeadOutput` with the logits of the selected task
    pub fn forward_t(
        &self,
        task: TaskSelector,
        input_ids: &Tensor,
        attention_mask: Option<&Tensor>,
        token_type_ids: Option<&Tensor>,
        input_lengths: Option<&Tensor>,
        train: bool,
    ) -> Result<HeadOutput, QaError> {
        let encoder_output = self.encode(input_ids, attention_mask, token_type_ids, train)?;
        let mut input = HeadInput::new(&encoder_output);
        input.input_lengths = input_lengths;
        self.forward_head(task, &input, train)
    }
}
