//! # Multitask extractive question answering
//!
//! Fine-tuning of a BERT encoder for extractive question answering (answer start / end
//! prediction), optionally with auxiliary subjectivity, review domain and dataset objectives and
//! adversarial (gradient reversal) training for domain invariance.
//!
//! - [`encoder`]: the [`SequenceEncoder`](encoder::SequenceEncoder) trait and a BERT implementation
//! - [`modules`]: gradient reversal, highway gates and the bidirectional recurrent re-encoder
//! - [`heads`]: linear and recurrent task heads assembled from a [`QAHeadConfig`](heads::QAHeadConfig)
//! - [`QAModel`]: composition of an encoder and a head
//! - [`training`]: training loop, evaluation loop, checkpointing and early stopping
//! - [`scoring`]: answer decoding, exact-match and token F1
//!
//! ```no_run
//! use rust_subjqa::encoder::BertConfig;
//! use rust_subjqa::heads::{HeadKind, QAHeadConfig, TaskSelector};
//! use rust_subjqa::{Config, QAModel};
//! use tch::{nn, no_grad, Device, Kind, Tensor};
//!
//! # fn main() -> Result<(), rust_subjqa::QaError> {
//! let vs = nn::VarStore::new(Device::Cpu);
//! let bert_config = BertConfig::from_file("path/to/config.json")?;
//! let mut head_config = QAHeadConfig::new(HeadKind::Recurrent, bert_config.hidden_size);
//! head_config.multitask = true;
//! head_config.n_aux_tasks = Some(1);
//! let model = QAModel::from_bert(vs.root(), &bert_config, &head_config)?;
//!
//! let input_ids = Tensor::zeros(&[2, 384], (Kind::Int64, Device::Cpu));
//! let input_lengths = Tensor::from_slice(&[384i64, 200]);
//! let output = no_grad(|| {
//!     model.forward_t(
//!         TaskSelector::QA,
//!         &input_ids,
//!         None,
//!         None,
//!         Some(&input_lengths),
//!         false,
//!     )
//! })?;
//! let (start_logits, end_logits) = output.logits.into_span()?;
//! # Ok(())
//! # }
//! ```

mod common;
pub mod encoder;
pub mod heads;
mod model;
pub mod modules;
pub mod scoring;
pub mod training;

pub use common::activations::Activation;
pub use common::config::Config;
pub use common::error::QaError;
pub use model::QAModel;
