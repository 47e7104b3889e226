use crate::encoder::SequenceEncoder;
use crate::heads::{AuxiliaryObjectives, HeadInput, SubjectivityLogits, TaskSelector};
use crate::model::QAModel;
use crate::scoring::TokenLookup;
use crate::training::batch::QABatch;
use crate::training::checkpoint::CheckpointManager;
use crate::training::config::{OptimizerKind, TrainingConfig};
use crate::training::early_stopping::EarlyStopping;
use crate::training::evaluation::{evaluate, score_batch};
use crate::training::freeze::freeze_encoder_layers;
use crate::training::losses::{AuxiliaryLossWeights, MultitaskLoss};
use crate::training::metrics::{
    binary_predictions, multiway_predictions, ClassificationAccumulator, EpochMetrics,
    SpanAccumulator, TrainingHistory,
};
use crate::training::scheduler::LinearWarmupScheduler;
use crate::QaError;
use tch::nn::OptimizerConfig;
use tch::{nn, no_grad, Device, Tensor};
use tracing::{debug, info, warn};

/// Rescales the gradients of `variables` so that their global L2 norm does not exceed
/// `max_norm`. Variables without a gradient (e.g. frozen parameters) are ignored.
/// Returns the global norm before clipping.
pub fn clip_grad_norm(variables: &[Tensor], max_norm: f64) -> f64 {
    no_grad(|| {
        let gradients: Vec<Tensor> = variables
            .iter()
            .map(Tensor::grad)
            .filter(Tensor::defined)
            .collect();
        let total_norm = gradients
            .iter()
            .map(|gradient| gradient.norm().double_value(&[]).powi(2))
            .sum::<f64>()
            .sqrt();
        let clip_coefficient = max_norm / (total_norm + 1e-6);
        if clip_coefficient < 1.0 {
            for mut gradient in gradients {
                let _ = gradient.g_mul_scalar_(clip_coefficient);
            }
        }
        total_norm
    })
}

/// # Multitask QA training loop
/// Optimizes the span prediction loss jointly with the auxiliary objectives of the model head
/// layout, validates after every epoch, keeps the best checkpoint on disk and stops early
/// when the validation scores degrade.
///
/// # Example
///
/// ```no_run
/// # use rust_subjqa::encoder::BertConfig;
/// # use rust_subjqa::heads::{HeadKind, QAHeadConfig};
/// # use rust_subjqa::training::{AuxiliaryLossWeights, QABatch, QATrainer, TrainingConfig};
/// # use rust_subjqa::{Config, QAModel};
/// # use rust_tokenizers::vocab::{BertVocab, Vocab};
/// # use tch::{nn, Device, Tensor};
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # let train_batches: Vec<QABatch> = vec![];
/// # let validation_batches: Vec<QABatch> = vec![];
/// let vs = nn::VarStore::new(Device::cuda_if_available());
/// let bert_config = BertConfig::from_file("path/to/config.json")?;
/// let mut head_config = QAHeadConfig::new(HeadKind::Linear, bert_config.hidden_size);
/// head_config.multitask = true;
/// head_config.n_aux_tasks = Some(1);
/// let model = QAModel::from_bert(vs.root(), &bert_config, &head_config)?;
/// let vocab = BertVocab::from_file("path/to/vocab.txt")?;
///
/// let training_config = TrainingConfig::from_file("path/to/training.json")?;
/// let mut trainer = QATrainer::new(&vs, training_config)?;
/// let weights = AuxiliaryLossWeights {
///     qa_type_weights: Some(Tensor::from_slice(&[2.0f32])),
///     domain_weights: None,
/// };
/// let history = trainer.train(
///     &vs,
///     &model,
///     &vocab,
///     &train_batches,
///     &validation_batches,
///     weights,
/// )?;
/// # Ok(())
/// # }
/// ```
pub struct QATrainer {
    config: TrainingConfig,
    optimizer: nn::Optimizer,
    device: Device,
}

impl QATrainer {
    /// Validates the configuration, seeds the random number generator and builds the optimizer
    /// over the variables of `vs`.
    pub fn new(vs: &nn::VarStore, config: TrainingConfig) -> Result<QATrainer, QaError> {
        config.validate()?;
        tch::manual_seed(config.seed);
        let optimizer = match config.optimizer {
            OptimizerKind::AdamW => nn::AdamW::default().build(vs, config.learning_rate)?,
            OptimizerKind::Sgd => nn::Sgd::default().build(vs, config.learning_rate)?,
        };
        Ok(QATrainer {
            config,
            optimizer,
            device: vs.device(),
        })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Trains the model for at most `n_epochs` epochs
    ///
    /// # Arguments
    ///
    /// * `vs` - variable store holding the model parameters (checkpointed and optionally frozen)
    /// * `model` - `QAModel` to train
    /// * `lookup` - token lookup used to render the answers
    /// * `train_batches` - training batches
    /// * `validation_batches` - validation batches, evaluated after every epoch
    /// * `weights` - class weights of the auxiliary objectives
    ///
    /// # Returns
    ///
    /// * `TrainingHistory` with the per-batch losses, the per-epoch metrics and the best checkpoint
    pub fn train<E, T>(
        &mut self,
        vs: &nn::VarStore,
        model: &QAModel<E>,
        lookup: &T,
        train_batches: &[QABatch],
        validation_batches: &[QABatch],
        weights: AuxiliaryLossWeights,
    ) -> Result<TrainingHistory, QaError>
    where
        E: SequenceEncoder,
        T: TokenLookup + ?Sized,
    {
        let loss = MultitaskLoss::new(model.layout(), self.config.qa_type, weights)?;
        let mut checkpoints =
            CheckpointManager::new(&self.config.model_dir, &self.config.model_name)?;
        let mut early_stopping =
            EarlyStopping::new(self.config.early_stopping, self.config.dataset);

        if self.config.freeze_encoder {
            let summary = freeze_encoder_layers(
                vs,
                model.encoder().num_hidden_layers(),
                self.config.unfrozen_top_layers,
            )?;
            info!(
                "Froze {} encoder parameters, {} remain trainable (top {} layers and pooler)",
                summary.frozen, summary.trainable, self.config.unfrozen_top_layers
            );
        }

        let mut scheduler = match (self.config.optimizer, self.config.warmup_steps) {
            (OptimizerKind::AdamW, Some(warmup_steps)) => Some(LinearWarmupScheduler::new(
                &mut self.optimizer,
                self.config.learning_rate,
                warmup_steps,
                self.config.n_epochs * train_batches.len(),
            )),
            _ => None,
        };

        info!(
            "Training for {} epochs on {} batches with {} auxiliary tasks",
            self.config.n_epochs,
            train_batches.len(),
            loss.objectives().n_aux_tasks()
        );

        let mut history = TrainingHistory::default();
        for epoch in 0..self.config.n_epochs {
            let train_metrics = self.train_epoch(
                vs,
                model,
                lookup,
                &loss,
                train_batches,
                scheduler.as_mut(),
                &mut history.batch_losses,
            )?;
            info!(
                "Epoch {}: train loss {:.3}, exact-match {:.3} %, F1 {:.3} %",
                epoch + 1,
                train_metrics.loss,
                train_metrics.exact_match,
                train_metrics.f1
            );
            if let Some(subjectivity) = train_metrics.subjectivity {
                info!(
                    "Epoch {}: train subjectivity accuracy {:.3} %, F1 {:.3} %",
                    epoch + 1,
                    subjectivity.accuracy,
                    subjectivity.f1
                );
            }
            if let Some(domain) = train_metrics.domain {
                info!(
                    "Epoch {}: train domain accuracy {:.3} %, F1 {:.3} %",
                    epoch + 1,
                    domain.accuracy,
                    domain.f1
                );
            }

            let validation_metrics = evaluate(
                model,
                lookup,
                validation_batches,
                self.config.batch_size,
                self.config.sort_batch,
                self.device,
            )?;
            info!(
                "Epoch {}: validation loss {:.3}, exact-match {:.3} %, F1 {:.3} %",
                epoch + 1,
                validation_metrics.loss,
                validation_metrics.exact_match,
                validation_metrics.f1
            );

            if checkpoints.update(vs, epoch, validation_metrics.exact_match)? {
                info!("Saved checkpoint to {}", checkpoints.path().display());
                history.best_checkpoint = Some(checkpoints.path().to_path_buf());
            }
            history.best_exact_match = checkpoints.best_exact_match();

            let stop =
                early_stopping.should_stop(validation_metrics.exact_match, validation_metrics.f1);
            history.train.push(train_metrics);
            history.validation.push(validation_metrics);
            history.epochs_completed = epoch + 1;
            if stop {
                info!("Early stopping after {} epochs", epoch + 1);
                history.stopped_early = true;
                break;
            }
        }
        Ok(history)
    }

    #[allow(clippy::too_many_arguments)]
    fn train_epoch<E, T>(
        &mut self,
        vs: &nn::VarStore,
        model: &QAModel<E>,
        lookup: &T,
        loss: &MultitaskLoss,
        batches: &[QABatch],
        mut scheduler: Option<&mut LinearWarmupScheduler>,
        batch_losses: &mut Vec<f64>,
    ) -> Result<EpochMetrics, QaError>
    where
        E: SequenceEncoder,
        T: TokenLookup + ?Sized,
    {
        let objectives = loss.objectives();
        let mut span_metrics = SpanAccumulator::default();
        let mut subjectivity_metrics = ClassificationAccumulator::default();
        let mut domain_metrics = ClassificationAccumulator::default();
        let trainable_variables = vs.trainable_variables();

        for (step, batch) in batches.iter().enumerate() {
            let batch = batch.to_device(self.device);
            let batch = if self.config.sort_batch {
                batch.sort_by_length()?
            } else {
                batch
            };

            self.optimizer.zero_grad();
            let encoder_output = model.encode(
                &batch.input_ids,
                Some(&batch.attention_mask),
                Some(&batch.token_type_ids),
                true,
            )?;
            let input = HeadInput::new(&encoder_output).with_lengths(&batch.input_lengths);

            let (start_logits, end_logits) = model
                .forward_head(TaskSelector::QA, &input, true)?
                .logits
                .into_span()?;
            let span_loss = MultitaskLoss::span_loss(
                &start_logits,
                &end_logits,
                &batch.start_positions,
                &batch.end_positions,
            );

            let mut auxiliary_losses = Vec::with_capacity(objectives.n_aux_tasks());
            if objectives.n_aux_tasks() > 0 {
                let logits = model
                    .forward_head(TaskSelector::SbjClass, &input, true)?
                    .logits
                    .into_subjectivity()?;
                auxiliary_losses.push(loss.subjectivity_loss(&logits, &batch)?);
                let selected = loss.select_subjectivity_logits(&logits);
                let predictions = match &logits {
                    SubjectivityLogits::Binary { .. } => binary_predictions(selected),
                    SubjectivityLogits::MultiWay(_) => multiway_predictions(selected),
                };
                subjectivity_metrics
                    .update(&predictions, batch.subjectivity_labels(self.config.qa_type)?)?;
            }
            match objectives {
                AuxiliaryObjectives::SubjectivityDomain => {
                    let logits = model
                        .forward_head(TaskSelector::DomainClass, &input, true)?
                        .logits
                        .into_domain()?;
                    auxiliary_losses.push(loss.domain_loss(&logits, &batch)?);
                    domain_metrics.update(&multiway_predictions(&logits), batch.domain_labels()?)?;
                }
                AuxiliaryObjectives::SubjectivityDataset => {
                    let logits = model
                        .forward_head(TaskSelector::DatasetClass, &input, true)?
                        .logits
                        .into_dataset()?;
                    auxiliary_losses.push(loss.dataset_loss(&logits, &batch)?);
                }
                AuxiliaryObjectives::None | AuxiliaryObjectives::Subjectivity => {}
            }

            let batch_loss = MultitaskLoss::combine(span_loss, auxiliary_losses);
            batch_loss.backward();
            clip_grad_norm(&trainable_variables, self.config.max_grad_norm);
            self.optimizer.step();
            if let Some(scheduler) = scheduler.as_mut() {
                scheduler.step(&mut self.optimizer);
            }

            let batch_loss = batch_loss.double_value(&[]);
            batch_losses.push(batch_loss);
            let (exact_match, f1) = score_batch(lookup, &batch, &start_logits, &end_logits)?;
            span_metrics.update(batch_loss, exact_match, f1, batch.batch_size() as usize);
            let (running_exact_match, running_f1) = span_metrics.current_scores();
            debug!(
                "Step {}: batch loss {:.3}, running exact-match {:.3} %, running F1 {:.3} %",
                step + 1,
                batch_loss,
                running_exact_match,
                running_f1
            );
        }

        if span_metrics.steps() == 0 {
            warn!("Training epoch without any batch, metrics default to 0");
        }
        let subjectivity =
            (objectives.n_aux_tasks() > 0).then(|| subjectivity_metrics.current());
        let domain = (objectives == AuxiliaryObjectives::SubjectivityDomain)
            .then(|| domain_metrics.current());
        Ok(span_metrics.finish(subjectivity, domain))
    }
}
