// Copyright 2019-present, the HuggingFace Inc. team, The Google AI Language Team and Facebook, Inc.
// Copyright (c) 2018, NVIDIA CORPORATION.  All rights reserved.
// Copyright 2019 Guillaume Becquin
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::common::activations::{Activation, TensorFunction};
use crate::common::layers::Dropout;
use crate::encoder::{EncoderOutput, SequenceEncoder};
use crate::{Config, QaError};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use tch::nn::{embedding, EmbeddingConfig};
use tch::{nn, Kind, Tensor};

#[derive(Debug, Serialize, Deserialize, Clone)]
/// # BERT encoder configuration
/// Defines the BERT architecture (e.g. number of layers, hidden layer size...).
/// Compatible with the `config.json` files shipped with Hugging Face BERT checkpoints.
pub struct BertConfig {
    pub hidden_act: Activation,
    pub attention_probs_dropout_prob: f64,
    pub hidden_dropout_prob: f64,
    pub hidden_size: i64,
    pub intermediate_size: i64,
    pub max_position_embeddings: i64,
    pub num_attention_heads: i64,
    pub num_hidden_layers: i64,
    pub type_vocab_size: i64,
    pub vocab_size: i64,
    pub output_hidden_states: Option<bool>,
}

impl Config for BertConfig {}

impl Default for BertConfig {
    fn default() -> Self {
        BertConfig {
            hidden_act: Activation::gelu,
            attention_probs_dropout_prob: 0.1,
            hidden_dropout_prob: 0.1,
            hidden_size: 768,
            intermediate_size: 3072,
            max_position_embeddings: 512,
            num_attention_heads: 12,
            num_hidden_layers: 12,
            type_vocab_size: 2,
            vocab_size: 30522,
            output_hidden_states: None,
        }
    }
}

fn bert_layer_norm<'p, P>(p: P, config: &BertConfig) -> nn::LayerNorm
where
    P: Borrow<nn::Path<'p>>,
{
    let layer_norm_config = nn::LayerNormConfig {
        eps: 1e-12,
        ..Default::default()
    };
    nn::layer_norm(p, vec![config.hidden_size], layer_norm_config)
}

#[derive(Debug)]
/// # Word, position and segment embeddings of BERT
pub struct BertEmbeddings {
    word_embeddings: nn::Embedding,
    position_embeddings: nn::Embedding,
    token_type_embeddings: nn::Embedding,
    layer_norm: nn::LayerNorm,
    dropout: Dropout,
}

impl BertEmbeddings {
    pub fn new<'p, P>(p: P, config: &BertConfig) -> BertEmbeddings
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();

        let embedding_config = EmbeddingConfig {
            padding_idx: 0,
            ..Default::default()
        };
        let word_embeddings = embedding(
            p / "word_embeddings",
            config.vocab_size,
            config.hidden_size,
            embedding_config,
        );
        let position_embeddings = embedding(
            p / "position_embeddings",
            config.max_position_embeddings,
            config.hidden_size,
            Default::default(),
        );
        let token_type_embeddings = embedding(
            p / "token_type_embeddings",
            config.type_vocab_size,
            config.hidden_size,
            Default::default(),
        );

        BertEmbeddings {
            word_embeddings,
            position_embeddings,
            token_type_embeddings,
            layer_norm: bert_layer_norm(p / "LayerNorm", config),
            dropout: Dropout::new(config.hidden_dropout_prob),
        }
    }

    pub fn forward_t(
        &self,
        input_ids: &Tensor,
        token_type_ids: Option<&Tensor>,
        position_ids: Option<&Tensor>,
        train: bool,
    ) -> Tensor {
        let input_shape = input_ids.size();
        let device = input_ids.device();

        let position_embeddings = match position_ids {
            Some(value) => value.apply(&self.position_embeddings),
            None => Tensor::arange(input_shape[1], (Kind::Int64, device))
                .unsqueeze(0)
                .expand(input_shape.as_slice(), true)
                .apply(&self.position_embeddings),
        };
        let token_type_embeddings = match token_type_ids {
            Some(value) => value.apply(&self.token_type_embeddings),
            None => Tensor::zeros(input_shape.as_slice(), (Kind::Int64, device))
                .apply(&self.token_type_embeddings),
        };

        let embeddings =
            input_ids.apply(&self.word_embeddings) + position_embeddings + token_type_embeddings;
        embeddings
            .apply(&self.layer_norm)
            .apply_t(&self.dropout, train)
    }
}

#[derive(Debug)]
/// # Multi-head self-attention block (attention + output projection + residual layer norm)
pub struct BertSelfAttention {
    num_attention_heads: i64,
    attention_head_size: i64,
    query: nn::Linear,
    key: nn::Linear,
    value: nn::Linear,
    output: nn::Linear,
    layer_norm: nn::LayerNorm,
    attention_dropout: Dropout,
    hidden_dropout: Dropout,
}

impl BertSelfAttention {
    pub fn new<'p, P>(p: P, config: &BertConfig) -> Result<BertSelfAttention, QaError>
    where
        P: Borrow<nn::Path<'p>>,
    {
        if config.hidden_size % config.num_attention_heads != 0 {
            return Err(QaError::InvalidConfigurationError(format!(
                "Hidden size {} not a multiple of the number of attention heads {}",
                config.hidden_size, config.num_attention_heads
            )));
        }
        let p = p.borrow();
        let self_p = p / "self";
        let output_p = p / "output";

        let linear = |path: nn::Path| {
            nn::linear(
                path,
                config.hidden_size,
                config.hidden_size,
                Default::default(),
            )
        };

        Ok(BertSelfAttention {
            num_attention_heads: config.num_attention_heads,
            attention_head_size: config.hidden_size / config.num_attention_heads,
            query: linear(&self_p / "query"),
            key: linear(&self_p / "key"),
            value: linear(&self_p / "value"),
            output: linear(&output_p / "dense"),
            layer_norm: bert_layer_norm(&output_p / "LayerNorm", config),
            attention_dropout: Dropout::new(config.attention_probs_dropout_prob),
            hidden_dropout: Dropout::new(config.hidden_dropout_prob),
        })
    }

    fn split_heads(&self, x: Tensor, bs: i64) -> Tensor {
        x.view((bs, -1, self.num_attention_heads, self.attention_head_size))
            .transpose(1, 2)
    }

    fn flatten(&self, x: Tensor, bs: i64) -> Tensor {
        x.transpose(1, 2).contiguous().view((
            bs,
            -1,
            self.num_attention_heads * self.attention_head_size,
        ))
    }

    pub fn forward_t(
        &self,
        hidden_states: &Tensor,
        extended_mask: &Tensor,
        layer_head_mask: Option<&Tensor>,
        train: bool,
    ) -> Tensor {
        let bs = hidden_states.size()[0];

        let query_layer = self.split_heads(hidden_states.apply(&self.query), bs)
            / (self.attention_head_size as f64).sqrt();
        let key_layer = self.split_heads(hidden_states.apply(&self.key), bs);
        let value_layer = self.split_heads(hidden_states.apply(&self.value), bs);

        let scores = query_layer.matmul(&key_layer.transpose(-1, -2)) + extended_mask;
        let mut weights = scores
            .softmax(-1, scores.kind())
            .apply_t(&self.attention_dropout, train);
        if let Some(head_mask) = layer_head_mask {
            weights = weights * head_mask.view((1, -1, 1, 1)).to_kind(scores.kind());
        }
        let context = self.flatten(weights.matmul(&value_layer), bs);

        let projected = context
            .apply(&self.output)
            .apply_t(&self.hidden_dropout, train);
        (projected + hidden_states).apply(&self.layer_norm)
    }
}

/// # BERT Layer
/// Self-attention followed by the position-wise feed-forward block.
pub struct BertLayer {
    attention: BertSelfAttention,
    intermediate: nn::Linear,
    activation: TensorFunction,
    output: nn::Linear,
    layer_norm: nn::LayerNorm,
    dropout: Dropout,
}

impl BertLayer {
    pub fn new<'p, P>(p: P, config: &BertConfig) -> Result<BertLayer, QaError>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();

        let attention = BertSelfAttention::new(p / "attention", config)?;
        let intermediate = nn::linear(
            p / "intermediate" / "dense",
            config.hidden_size,
            config.intermediate_size,
            Default::default(),
        );
        let output = nn::linear(
            p / "output" / "dense",
            config.intermediate_size,
            config.hidden_size,
            Default::default(),
        );

        Ok(BertLayer {
            attention,
            intermediate,
            activation: config.hidden_act.get_function(),
            output,
            layer_norm: bert_layer_norm(p / "output" / "LayerNorm", config),
            dropout: Dropout::new(config.hidden_dropout_prob),
        })
    }

    pub fn forward_t(
        &self,
        hidden_states: &Tensor,
        extended_mask: &Tensor,
        layer_head_mask: Option<&Tensor>,
        train: bool,
    ) -> Tensor {
        let attention_output =
            self.attention
                .forward_t(hidden_states, extended_mask, layer_head_mask, train);
        let intermediate = (self.activation.get_fn())(&attention_output.apply(&self.intermediate));
        let output = intermediate
            .apply(&self.output)
            .apply_t(&self.dropout, train);
        (output + attention_output).apply(&self.layer_norm)
    }
}

/// # BERT encoder
/// Base architecture fine-tuned by the question answering heads. It is made of the following blocks:
/// - `embeddings`: `token`, `position` and `segment_id` embeddings
/// - `layers`: stack of `BertLayer` (self-attention and feed-forward)
/// - `pooler`: dense layer of the pretrained checkpoints, registered so that its weights load and
///   train with the encoder. The task heads pool their own representations.
///
/// Variables are named after the Hugging Face checkpoints, so that a model rooted at
/// `vs.root() / "bert"` exposes parameters such as `bert.encoder.layer.11.output.dense.weight`.
pub struct BertModel {
    embeddings: BertEmbeddings,
    layers: Vec<BertLayer>,
    hidden_size: i64,
    num_attention_heads: i64,
    output_hidden_states: bool,
}

impl BertModel {
    /// Build a new `BertModel`
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the BERT model
    /// * `config` - `BertConfig` object defining the model architecture
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rust_subjqa::encoder::{BertConfig, BertModel};
    /// use rust_subjqa::Config;
    /// use tch::{nn, Device};
    ///
    /// let config = BertConfig::from_file("path/to/config.json").unwrap();
    /// let vs = nn::VarStore::new(Device::Cpu);
    /// let bert = BertModel::new(&vs.root() / "bert", &config).unwrap();
    /// ```
    pub fn new<'p, P>(p: P, config: &BertConfig) -> Result<BertModel, QaError>
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();

        let embeddings = BertEmbeddings::new(p / "embeddings", config);
        let layer_path = p / "encoder" / "layer";
        let layers = (0..config.num_hidden_layers)
            .map(|layer_index| BertLayer::new(&layer_path / layer_index, config))
            .collect::<Result<Vec<BertLayer>, QaError>>()?;
        let _pooler = nn::linear(
            p / "pooler" / "dense",
            config.hidden_size,
            config.hidden_size,
            Default::default(),
        );

        Ok(BertModel {
            embeddings,
            layers,
            hidden_size: config.hidden_size,
            num_attention_heads: config.num_attention_heads,
            output_hidden_states: config.output_hidden_states.unwrap_or(false),
        })
    }

    fn layer_head_masks(&self, head_mask: Option<&Tensor>) -> Result<Vec<Option<Tensor>>, QaError> {
        let n_layers = self.layers.len() as i64;
        match head_mask {
            None => Ok((0..n_layers).map(|_| None).collect()),
            Some(mask) => match mask.size().as_slice() {
                [heads] if *heads == self.num_attention_heads => {
                    Ok((0..n_layers).map(|_| Some(mask.shallow_clone())).collect())
                }
                [layers, heads] if *layers == n_layers && *heads == self.num_attention_heads => {
                    Ok((0..n_layers).map(|layer| Some(mask.get(layer))).collect())
                }
                shape => Err(QaError::ValueError(format!(
                    "Head mask of shape {:?} does not match {} layers of {} heads",
                    shape, n_layers, self.num_attention_heads
                ))),
            },
        }
    }
}

impl SequenceEncoder for BertModel {
    fn hidden_size(&self) -> i64 {
        self.hidden_size
    }

    fn num_hidden_layers(&self) -> i64 {
        self.layers.len() as i64
    }

    fn forward_t(
        &self,
        input_ids: &Tensor,
        attention_mask: Option<&Tensor>,
        token_type_ids: Option<&Tensor>,
        position_ids: Option<&Tensor>,
        head_mask: Option<&Tensor>,
        train: bool,
    ) -> Result<EncoderOutput, QaError> {
        let input_shape = input_ids.size();
        if input_shape.len() != 2 {
            return Err(QaError::ValueError(format!(
                "Input ids must have shape (batch size, sequence length), got {:?}",
                input_shape
            )));
        }
        let head_masks = self.layer_head_masks(head_mask)?;

        let embedding_output =
            self.embeddings
                .forward_t(input_ids, token_type_ids, position_ids, train);

        let extended_mask = match attention_mask {
            Some(mask) => {
                if mask.size() != input_shape {
                    return Err(QaError::ValueError(format!(
                        "Attention mask of shape {:?} does not match input ids of shape {:?}",
                        mask.size(),
                        input_shape
                    )));
                }
                mask.unsqueeze(1).unsqueeze(1)
            }
            None => Tensor::ones(input_shape.as_slice(), (Kind::Int64, input_ids.device()))
                .unsqueeze(1)
                .unsqueeze(1),
        };
        let extended_mask: Tensor = ((extended_mask.ones_like() - extended_mask) * -10000.0)
            .to_kind(embedding_output.kind());

        let mut all_hidden_states = if self.output_hidden_states {
            Some(vec![embedding_output.shallow_clone()])
        } else {
            None
        };

        let mut hidden_state = embedding_output;
        for (layer, layer_head_mask) in self.layers.iter().zip(head_masks.iter()) {
            hidden_state =
                layer.forward_t(&hidden_state, &extended_mask, layer_head_mask.as_ref(), train);
            if let Some(hidden_states) = all_hidden_states.as_mut() {
                hidden_states.push(hidden_state.shallow_clone());
            }
        }

        Ok(EncoderOutput {
            hidden_state,
            all_hidden_states,
        })
    }
}
