//! # Training and evaluation
//!
//! - [`QATrainer`]: joint optimisation of the span prediction loss and the auxiliary objectives
//!   of the head layout, with gradient clipping, optional warmup schedule, encoder freezing,
//!   best-model checkpointing and early stopping
//! - [`evaluate`]: forward-only validation / test pass returning the loss, exact-match and F1
//!
//! Data enters as [`QABatch`]es of fixed-shape tensors produced by an external feature pipeline.

mod batch;
mod checkpoint;
mod config;
mod early_stopping;
mod evaluation;
mod freeze;
mod losses;
mod metrics;
mod scheduler;
mod trainer;

pub use batch::QABatch;
pub use checkpoint::CheckpointManager;
pub use config::{DatasetKind, OptimizerKind, QaType, TrainingConfig};
pub use early_stopping::EarlyStopping;
pub use evaluation::evaluate;
pub use freeze::{freeze_encoder_layers, FreezeSummary};
pub use losses::{AuxiliaryLossWeights, MultitaskLoss};
pub use metrics::{
    accuracy, binary_predictions, macro_f1, multiway_predictions, ClassificationMetrics,
    EpochMetrics, TrainingHistory,
};
pub use scheduler::LinearWarmupScheduler;
pub use trainer::{clip_grad_norm, QATrainer};
