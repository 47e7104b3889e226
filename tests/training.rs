extern crate anyhow;

use std::convert::TryFrom;
use rust_subjqa::encoder::{BertConfig, BertModel, EncoderOutput, SequenceEncoder};
use rust_subjqa::heads::{
    AuxiliaryObjectives, HeadKind, HeadLayout, QAHeadConfig, SubjectivityLabels,
    SubjectivityLogits,
};
use rust_subjqa::scoring::TokenLookup;
use rust_subjqa::training::{
    accuracy, binary_predictions, clip_grad_norm, evaluate, freeze_encoder_layers, macro_f1,
    multiway_predictions, AuxiliaryLossWeights, CheckpointManager, DatasetKind, EarlyStopping,
    LinearWarmupScheduler, MultitaskLoss, OptimizerKind, QABatch, QATrainer, QaType,
    TrainingConfig,
};
use rust_subjqa::{QAModel, QaError};
use std::cell::Cell;
use tch::nn::OptimizerConfig;
use tch::{nn, no_grad, Device, Kind, Tensor};

const SEQUENCE_LENGTH: i64 = 10;

struct IdTokens;

impl TokenLookup for IdTokens {
    fn token(&self, id: i64) -> String {
        format!("tok{}", id)
    }
}

fn tiny_bert_config() -> BertConfig {
    BertConfig {
        hidden_size: 16,
        intermediate_size: 32,
        num_attention_heads: 2,
        num_hidden_layers: 2,
        vocab_size: 30,
        max_position_embeddings: 32,
        type_vocab_size: 2,
        output_hidden_states: Some(true),
        ..Default::default()
    }
}

fn multitask_head_config(head: HeadKind, n_aux_tasks: usize) -> QAHeadConfig {
    let mut config = QAHeadConfig::new(head, 16);
    config.multitask = n_aux_tasks > 0;
    config.n_aux_tasks = Some(n_aux_tasks);
    config.n_domain_labels = Some(4);
    config.n_recurrent_layers = 1;
    config
}

fn labelled_batch(offset: i64) -> anyhow::Result<QABatch> {
    let input_ids: Vec<i64> = (0..2 * SEQUENCE_LENGTH)
        .map(|position| 1 + (7 * position + offset) % 29)
        .collect();
    let mut attention_mask = vec![1i64; 2 * SEQUENCE_LENGTH as usize];
    for position in attention_mask.iter_mut().skip(17) {
        *position = 0;
    }
    let batch = QABatch::new(
        Tensor::from_slice(&input_ids).view((2, SEQUENCE_LENGTH)),
        Tensor::from_slice(&attention_mask).view((2, SEQUENCE_LENGTH)),
        Tensor::zeros([2, SEQUENCE_LENGTH], (Kind::Int64, Device::Cpu)),
        Tensor::from_slice(&[SEQUENCE_LENGTH, 7]),
        Tensor::from_slice(&[2i64, 1]),
        Tensor::from_slice(&[4i64, 3]),
    )?
    .with_subjectivity_labels(Tensor::from_slice(&[0i64, 1]), Tensor::from_slice(&[1i64, 0]))?
    .with_domain_labels(Tensor::from_slice(&[offset % 4, (offset + 1) % 4]))?
    .with_dataset_labels(Tensor::from_slice(&[0i64, 1]))?;
    Ok(batch)
}

fn single_example_batch() -> anyhow::Result<QABatch> {
    Ok(QABatch::new(
        Tensor::from_slice(&[1i64, 2, 3, 4, 5, 6, 7, 8, 9, 10]).view((1, SEQUENCE_LENGTH)),
        Tensor::ones([1, SEQUENCE_LENGTH], (Kind::Int64, Device::Cpu)),
        Tensor::zeros([1, SEQUENCE_LENGTH], (Kind::Int64, Device::Cpu)),
        Tensor::from_slice(&[SEQUENCE_LENGTH]),
        Tensor::from_slice(&[1i64]),
        Tensor::from_slice(&[2i64]),
    )?)
}

fn loss_weights() -> AuxiliaryLossWeights {
    AuxiliaryLossWeights {
        qa_type_weights: Some(Tensor::from_slice(&[2.0f32])),
        domain_weights: Some(Tensor::from_slice(&[1.0f32, 1.0, 2.0, 2.0])),
    }
}

#[test]
fn batch_validation() -> anyhow::Result<()> {
    let mismatched_mask = QABatch::new(
        Tensor::zeros([2, 5], (Kind::Int64, Device::Cpu)),
        Tensor::ones([2, 4], (Kind::Int64, Device::Cpu)),
        Tensor::zeros([2, 5], (Kind::Int64, Device::Cpu)),
        Tensor::from_slice(&[5i64, 3]),
        Tensor::from_slice(&[0i64, 0]),
        Tensor::from_slice(&[1i64, 1]),
    );
    assert!(mismatched_mask.is_err());

    let batch = single_example_batch()?;
    assert_eq!(batch.batch_size(), 1);
    assert_eq!(batch.sequence_length(), SEQUENCE_LENGTH);
    assert!(batch.subjectivity_labels(QaType::Question).is_err());
    assert!(batch.domain_labels().is_err());

    let batch = single_example_batch()?;
    assert!(batch.with_domain_labels(Tensor::from_slice(&[0i64, 1])).is_err());
    Ok(())
}

#[test]
fn batch_sort_is_stable_and_descending() -> anyhow::Result<()> {
    let input_ids = Tensor::arange(16, (Kind::Int64, Device::Cpu)).view((4, 4));
    let batch = QABatch::new(
        input_ids.shallow_clone(),
        input_ids.ones_like(),
        input_ids.zeros_like(),
        Tensor::from_slice(&[3i64, 4, 3, 4]),
        Tensor::from_slice(&[10i64, 11, 12, 13]),
        Tensor::from_slice(&[20i64, 21, 22, 23]),
    )?
    .with_subjectivity_labels(
        Tensor::from_slice(&[0i64, 1, 0, 1]),
        Tensor::from_slice(&[1i64, 1, 0, 0]),
    )?;

    let sorted = batch.sort_by_length()?;

    assert_eq!(
        Vec::<i64>::try_from(&sorted.input_lengths)?,
        vec![4, 4, 3, 3]
    );
    assert_eq!(
        Vec::<i64>::try_from(&sorted.start_positions)?,
        vec![11, 13, 10, 12]
    );
    assert_eq!(
        Vec::<i64>::try_from(&sorted.input_ids.select(1, 0))?,
        vec![4, 12, 0, 8]
    );
    assert_eq!(
        Vec::<i64>::try_from(sorted.subjectivity_labels(QaType::Question)?)?,
        vec![1, 0, 1, 0]
    );
    Ok(())
}

#[test]
fn classification_metrics() -> anyhow::Result<()> {
    let predictions = Tensor::from_slice(&[0i64, 1, 1, 0]);
    let targets = Tensor::from_slice(&[0i64, 1, 0, 0]);

    assert_eq!(accuracy(&predictions, &targets)?, 0.75);
    let expected_f1 = (0.8 + 2.0 / 3.0) / 2.0;
    assert!((macro_f1(&predictions, &targets)? - expected_f1).abs() < 1e-12);

    assert_eq!(
        Vec::<i64>::try_from(&binary_predictions(&Tensor::from_slice(&[-1.0f32, 2.0])))?,
        vec![0, 1]
    );
    let multiway_logits = Tensor::from_slice(&[0.1f32, 2.0, 0.3, 4.0, 0.0, 1.0]).view((2, 3));
    assert_eq!(
        Vec::<i64>::try_from(&multiway_predictions(&multiway_logits))?,
        vec![1, 0]
    );

    assert!(accuracy(&predictions, &Tensor::from_slice(&[0i64])).is_err());
    Ok(())
}

#[test]
fn loss_weights_must_match_layout() -> anyhow::Result<()> {
    let subjectivity = HeadLayout::Subjectivity {
        labels: SubjectivityLabels::Binary,
        adversary: None,
    };
    assert!(
        MultitaskLoss::new(&subjectivity, QaType::Question, AuxiliaryLossWeights::default())
            .is_err()
    );
    let wrong_size = AuxiliaryLossWeights {
        qa_type_weights: Some(Tensor::from_slice(&[1.0f32, 2.0])),
        domain_weights: None,
    };
    assert!(MultitaskLoss::new(&subjectivity, QaType::Question, wrong_size).is_err());
    let loss = MultitaskLoss::new(&subjectivity, QaType::Question, loss_weights())?;
    assert_eq!(loss.objectives(), AuxiliaryObjectives::Subjectivity);

    let subjectivity_domain = HeadLayout::SubjectivityDomain {
        labels: SubjectivityLabels::Binary,
        n_domain_labels: 4,
        adversary: None,
    };
    let missing_domain = AuxiliaryLossWeights {
        qa_type_weights: Some(Tensor::from_slice(&[1.0f32])),
        domain_weights: None,
    };
    assert!(MultitaskLoss::new(&subjectivity_domain, QaType::Answer, missing_domain).is_err());

    let classification_only = HeadLayout::DomainClassification { n_domain_labels: 4 };
    assert!(
        MultitaskLoss::new(&classification_only, QaType::Answer, loss_weights()).is_err()
    );

    let single_task = MultitaskLoss::new(
        &HeadLayout::SingleTask,
        QaType::Question,
        AuxiliaryLossWeights::default(),
    )?;
    assert_eq!(single_task.objectives(), AuxiliaryObjectives::None);
    Ok(())
}

#[test]
fn loss_values() -> anyhow::Result<()> {
    let uniform = Tensor::zeros([2, 5], (Kind::Float, Device::Cpu));
    let span_loss = MultitaskLoss::span_loss(
        &uniform,
        &uniform,
        &Tensor::from_slice(&[0i64, 3]),
        &Tensor::from_slice(&[1i64, 4]),
    );
    assert!((span_loss.double_value(&[]) - 5f64.ln()).abs() < 1e-6);

    let combined = MultitaskLoss::combine(
        Tensor::from(1.0f64),
        vec![Tensor::from(2.0f64), Tensor::from(3.0f64)],
    );
    assert!((combined.double_value(&[]) - 2.0).abs() < 1e-12);

    let batch = labelled_batch(0)?;
    let binary = MultitaskLoss::new(
        &HeadLayout::Subjectivity {
            labels: SubjectivityLabels::Binary,
            adversary: None,
        },
        QaType::Answer,
        AuxiliaryLossWeights {
            qa_type_weights: Some(Tensor::from_slice(&[3.0f32])),
            domain_weights: None,
        },
    )?;
    let logits = SubjectivityLogits::Binary {
        answer: Tensor::zeros([2], (Kind::Float, Device::Cpu)),
        question: Tensor::ones([2], (Kind::Float, Device::Cpu)),
    };
    let subjectivity_loss = binary.subjectivity_loss(&logits, &batch)?;
    assert!((subjectivity_loss.double_value(&[]) - 2.0 * 2f64.ln()).abs() < 1e-6);

    let multi_way = MultitaskLoss::new(
        &HeadLayout::Subjectivity {
            labels: SubjectivityLabels::MultiWay(3),
            adversary: None,
        },
        QaType::Question,
        AuxiliaryLossWeights {
            qa_type_weights: Some(Tensor::from_slice(&[1.0f32, 2.0, 3.0])),
            domain_weights: None,
        },
    )?;
    let logits = SubjectivityLogits::MultiWay(Tensor::zeros([2, 3], (Kind::Float, Device::Cpu)));
    let subjectivity_loss = multi_way.subjectivity_loss(&logits, &batch)?;
    assert!((subjectivity_loss.double_value(&[]) - 3f64.ln()).abs() < 1e-6);
    assert!(multi_way
        .domain_loss(&Tensor::zeros([2, 4], (Kind::Float, Device::Cpu)), &batch)
        .is_err());
    Ok(())
}

#[test]
fn gradient_clipping() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let weight = vs.root().ones("weight", &[2]);
    let _frozen = vs.root().ones_no_train("frozen", &[2]);
    (&weight * Tensor::from_slice(&[3.0f32, 4.0]))
        .sum(Kind::Float)
        .backward();

    let norm = clip_grad_norm(&vs.trainable_variables(), 1.0);

    assert!((norm - 5.0).abs() < 1e-4);
    let gradient = Vec::<f32>::try_from(&weight.grad())?;
    assert!((gradient[0] - 0.6).abs() < 1e-4);
    assert!((gradient[1] - 0.8).abs() < 1e-4);
    Ok(())
}

#[test]
fn warmup_schedule() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let _weight = vs.root().zeros("weight", &[1]);
    let mut optimizer = nn::Sgd::default().build(&vs, 1.0)?;

    let mut scheduler = LinearWarmupScheduler::new(&mut optimizer, 1.0, 2, 4);
    assert_eq!(scheduler.learning_rate(), 0.0);
    let learning_rates: Vec<f64> = (0..5).map(|_| scheduler.step(&mut optimizer)).collect();
    assert_eq!(learning_rates, vec![0.5, 1.0, 0.5, 0.0, 0.0]);
    Ok(())
}

#[test]
fn early_stopping_on_degrading_scores() {
    let mut early_stopping = EarlyStopping::new(true, DatasetKind::SQuAD);
    assert!(early_stopping.is_enabled());
    assert!(!early_stopping.should_stop(50.0, 60.0));
    assert!(!early_stopping.should_stop(40.0, 65.0));
    assert!(!early_stopping.should_stop(45.0, 60.0));
    assert!(early_stopping.should_stop(30.0, 50.0));

    let mut subjqa = EarlyStopping::new(true, DatasetKind::SubjQA);
    assert!(!subjqa.is_enabled());
    assert!(!subjqa.should_stop(50.0, 60.0));
    assert!(!subjqa.should_stop(10.0, 10.0));

    assert!(!EarlyStopping::new(false, DatasetKind::SQuAD).is_enabled());
}

#[test]
fn checkpoint_on_improvement() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let mut vs = nn::VarStore::new(Device::Cpu);
    let mut weight = vs.root().zeros("weight", &[2]);

    let mut checkpoints = CheckpointManager::new(directory.path().join("models"), "best.ot")?;
    assert!(checkpoints.is_improvement(0, 0.0));
    assert!(checkpoints.update(&vs, 0, 10.0)?);
    assert!(checkpoints.path().is_file());
    assert!(!checkpoints.update(&vs, 1, 5.0)?);
    assert!(!checkpoints.update(&vs, 2, 10.0)?);

    no_grad(|| {
        let _ = weight.fill_(3.0);
    });
    assert!(checkpoints.update(&vs, 3, 12.5)?);
    assert_eq!(checkpoints.best_exact_match(), Some(12.5));

    no_grad(|| {
        let _ = weight.fill_(-1.0);
    });
    checkpoints.load(&mut vs)?;
    assert_eq!(Vec::<f32>::try_from(&weight)?, vec![3.0f32, 3.0]);

    let missing = CheckpointManager::new(directory.path(), "missing.ot")?;
    assert!(missing.load(&mut vs).is_err());
    Ok(())
}

#[test]
fn encoder_freezing_keeps_top_layers_trainable() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let _model = QAModel::from_bert(
        vs.root(),
        &tiny_bert_config(),
        &QAHeadConfig::new(HeadKind::Linear, 16),
    )?;

    let summary = freeze_encoder_layers(&vs, 2, 1)?;
    assert_eq!(summary.trainable, 18);
    assert_eq!(summary.frozen, 21);

    let variables = vs.variables();
    assert!(!variables["bert.embeddings.word_embeddings.weight"].requires_grad());
    assert!(!variables["bert.encoder.layer.0.attention.self.query.weight"].requires_grad());
    assert!(variables["bert.encoder.layer.1.attention.self.query.weight"].requires_grad());
    assert!(variables["bert.pooler.dense.weight"].requires_grad());
    assert!(variables["qa_head.fc_qa.weight"].requires_grad());
    Ok(())
}

#[test]
fn evaluation_skips_partial_batches() -> anyhow::Result<()> {
    let vs = nn::VarStore::new(Device::Cpu);
    let model = QAModel::from_bert(
        vs.root(),
        &tiny_bert_config(),
        &QAHeadConfig::new(HeadKind::Linear, 16),
    )?;

    let partial = evaluate(
        &model,
        &IdTokens,
        &[single_example_batch()?],
        2,
        false,
        Device::Cpu,
    )?;
    assert_eq!(partial.steps, 0);
    assert_eq!(partial.loss, 0.0);
    assert_eq!(partial.exact_match, 0.0);

    let metrics = evaluate(
        &model,
        &IdTokens,
        &[labelled_batch(0)?, single_example_batch()?, labelled_batch(1)?],
        2,
        true,
        Device::Cpu,
    )?;
    assert_eq!(metrics.steps, 2);
    assert_eq!(metrics.examples, 4);
    assert!(metrics.loss.is_finite() && metrics.loss > 0.0);
    assert!((0.0..=100.0).contains(&metrics.exact_match));
    assert!(metrics.f1 >= metrics.exact_match);
    assert!(metrics.subjectivity.is_none());
    Ok(())
}

#[test]
fn training_config_defaults() -> anyhow::Result<()> {
    let config: TrainingConfig = serde_json::from_str(
        r#"{"n_epochs": 3, "model_dir": "models", "model_name": "subjqa.ot", "batch_size": 32,
            "optimizer": "SGD", "qa_type": "answer", "dataset": "combined"}"#,
    )?;
    assert_eq!(config.optimizer, OptimizerKind::Sgd);
    assert_eq!(config.qa_type, QaType::Answer);
    assert_eq!(config.dataset, DatasetKind::Combined);
    assert_eq!(config.max_grad_norm, 10.0);
    assert!(config.early_stopping);
    assert!(config.validate().is_ok());

    let mut invalid = TrainingConfig::new("models", "subjqa.ot", 0, 32);
    assert!(invalid.validate().is_err());
    invalid.n_epochs = 1;
    invalid.unfrozen_top_layers = -1;
    assert!(invalid.validate().is_err());
    Ok(())
}

fn train_model(
    model_dir: &std::path::Path,
    head_config: &QAHeadConfig,
    configure: impl FnOnce(&mut TrainingConfig),
) -> anyhow::Result<(
    nn::VarStore,
    QAModel<BertModel>,
    rust_subjqa::training::TrainingHistory,
)> {
    let vs = nn::VarStore::new(Device::Cpu);
    let model = QAModel::from_bert(vs.root(), &tiny_bert_config(), head_config)?;

    let mut config = TrainingConfig::new(model_dir, "model.ot", 3, 2);
    config.early_stopping = false;
    config.learning_rate = 1e-3;
    configure(&mut config);
    let mut trainer = QATrainer::new(&vs, config)?;

    let train_batches = vec![labelled_batch(0)?, labelled_batch(1)?, labelled_batch(2)?];
    let validation_batches = vec![labelled_batch(3)?, single_example_batch()?];
    let history = trainer.train(
        &vs,
        &model,
        &IdTokens,
        &train_batches,
        &validation_batches,
        loss_weights(),
    )?;
    Ok((vs, model, history))
}

#[test]
fn single_task_training_loop() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let (_, _, history) = train_model(
        directory.path(),
        &QAHeadConfig::new(HeadKind::Linear, 16),
        |_| {},
    )?;

    assert_eq!(history.epochs_completed, 3);
    assert!(!history.stopped_early);
    assert_eq!(history.train.len(), 3);
    assert_eq!(history.validation.len(), 3);
    assert_eq!(history.batch_losses.len(), 9);
    assert!(history.batch_losses.iter().all(|loss| loss.is_finite()));
    assert!(history.train.iter().all(|metrics| metrics.subjectivity.is_none()));
    assert!(history.validation.iter().all(|metrics| metrics.steps == 1));

    let checkpoint = directory.path().join("model.ot");
    assert!(checkpoint.is_file());
    assert_eq!(history.best_checkpoint, Some(checkpoint));
    assert!(history.best_exact_match.is_some());
    Ok(())
}

#[test]
fn multitask_training_loop_with_warmup() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let mut head_config = multitask_head_config(HeadKind::Recurrent, 2);
    head_config.highway_connection = true;
    head_config.adversarial = true;
    let (_, _, history) = train_model(directory.path(), &head_config, |config| {
        config.warmup_steps = Some(2);
        config.sort_batch = true;
        config.qa_type = QaType::Answer;
    })?;

    assert_eq!(history.epochs_completed, 3);
    for metrics in &history.train {
        let subjectivity = metrics.subjectivity.expect("subjectivity metrics");
        let domain = metrics.domain.expect("domain metrics");
        assert!((0.0..=100.0).contains(&subjectivity.accuracy));
        assert!((0.0..=100.0).contains(&domain.f1));
        assert_eq!(metrics.steps, 3);
        assert_eq!(metrics.examples, 6);
    }
    assert!(history.batch_losses.iter().all(|loss| loss.is_finite()));

    let mut restored_vs = nn::VarStore::new(Device::Cpu);
    let _restored = QAModel::from_bert(restored_vs.root(), &tiny_bert_config(), &head_config)?;
    CheckpointManager::new(directory.path(), "model.ot")?.load(&mut restored_vs)?;
    Ok(())
}

const SIGNAL_SIZE: i64 = 4;

/// Encoder emitting a start signal on feature 0 and an end signal on feature 1. Every
/// evaluation pass moves both signals one position further away from the gold answer.
struct DriftingSpanEncoder {
    starts: Vec<i64>,
    ends: Vec<i64>,
    evaluation_passes: Cell<i64>,
}

impl DriftingSpanEncoder {
    fn new(starts: &[i64], ends: &[i64]) -> DriftingSpanEncoder {
        DriftingSpanEncoder {
            starts: starts.to_vec(),
            ends: ends.to_vec(),
            evaluation_passes: Cell::new(0),
        }
    }
}

impl SequenceEncoder for DriftingSpanEncoder {
    fn hidden_size(&self) -> i64 {
        SIGNAL_SIZE
    }

    fn num_hidden_layers(&self) -> i64 {
        0
    }

    fn forward_t(
        &self,
        input_ids: &Tensor,
        _attention_mask: Option<&Tensor>,
        _token_type_ids: Option<&Tensor>,
        _position_ids: Option<&Tensor>,
        _head_mask: Option<&Tensor>,
        train: bool,
    ) -> Result<EncoderOutput, QaError> {
        let (batch_size, sequence_length) = input_ids.size2()?;
        let shift = if train {
            0
        } else {
            let passes = self.evaluation_passes.get();
            self.evaluation_passes.set(passes + 1);
            passes
        };
        let mut signal = vec![0f32; (batch_size * sequence_length * SIGNAL_SIZE) as usize];
        for row in 0..batch_size as usize {
            for (feature, position) in [(0, self.starts[row]), (1, self.ends[row])] {
                let position = (position + shift).min(sequence_length - 1);
                let index = (row as i64 * sequence_length + position) * SIGNAL_SIZE + feature;
                signal[index as usize] = 10.0;
            }
        }
        Ok(EncoderOutput {
            hidden_state: Tensor::from_slice(&signal).view((
                batch_size,
                sequence_length,
                SIGNAL_SIZE,
            )),
            all_hidden_states: None,
        })
    }
}

fn train_drifting_model(
    model_dir: &std::path::Path,
    dataset: DatasetKind,
) -> anyhow::Result<rust_subjqa::training::TrainingHistory> {
    let vs = nn::VarStore::new(Device::Cpu);
    let mut head_config = QAHeadConfig::new(HeadKind::Linear, SIGNAL_SIZE);
    head_config.qa_dropout_prob = 0.0;
    let model = QAModel::new(
        vs.root(),
        DriftingSpanEncoder::new(&[2, 1], &[4, 3]),
        &head_config,
    )?;
    no_grad(|| {
        for (name, mut variable) in vs.variables() {
            match name.as_str() {
                "qa_head.fc_qa.weight" => {
                    let _ = variable.copy_(
                        &Tensor::from_slice(&[1f32, 0., 0., 0., 0., 1., 0., 0.])
                            .view((2, SIGNAL_SIZE)),
                    );
                }
                "qa_head.fc_qa.bias" => {
                    let _ = variable.zero_();
                }
                _ => {}
            }
        }
    });

    let mut config = TrainingConfig::new(model_dir, "model.ot", 5, 2);
    config.optimizer = OptimizerKind::Sgd;
    config.learning_rate = 1e-6;
    config.dataset = dataset;
    config.early_stopping = true;
    let mut trainer = QATrainer::new(&vs, config)?;

    Ok(trainer.train(
        &vs,
        &model,
        &IdTokens,
        &[labelled_batch(0)?, labelled_batch(1)?],
        &[labelled_batch(3)?],
        AuxiliaryLossWeights::default(),
    )?)
}

#[test]
fn training_stops_when_validation_scores_degrade() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let history = train_drifting_model(directory.path(), DatasetKind::SQuAD)?;

    assert!(history.stopped_early);
    assert_eq!(history.epochs_completed, 2);
    assert_eq!(history.validation.len(), 2);
    assert_eq!(history.validation[0].exact_match, 100.0);
    assert_eq!(history.validation[1].exact_match, 0.0);
    assert!(history.validation[1].f1 < history.validation[0].f1);

    let checkpoint = directory.path().join("model.ot");
    assert!(checkpoint.is_file());
    assert_eq!(history.best_checkpoint, Some(checkpoint));
    assert_eq!(history.best_exact_match, Some(100.0));
    Ok(())
}

#[test]
fn degrading_scores_do_not_stop_subjqa_training() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let history = train_drifting_model(directory.path(), DatasetKind::SubjQA)?;

    assert!(!history.stopped_early);
    assert_eq!(history.epochs_completed, 5);
    assert_eq!(history.validation.len(), 5);
    Ok(())
}

#[test]
fn dataset_agnostic_training_with_frozen_encoder() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let mut head_config = multitask_head_config(HeadKind::Linear, 2);
    head_config.adversarial = true;
    head_config.dataset_agnostic = true;
    head_config.n_domain_labels = None;

    let layout_vs = nn::VarStore::new(Device::Cpu);
    let layout_model = QAModel::from_bert(layout_vs.root(), &tiny_bert_config(), &head_config)?;
    assert_eq!(
        layout_model.layout().auxiliary_objectives(),
        Some(AuxiliaryObjectives::SubjectivityDataset)
    );

    let (vs, _, history) = train_model(directory.path(), &head_config, |config| {
        config.n_epochs = 1;
        config.optimizer = OptimizerKind::Sgd;
        config.freeze_encoder = true;
        config.unfrozen_top_layers = 1;
    })?;

    assert_eq!(history.epochs_completed, 1);
    assert!(history.train[0].subjectivity.is_some());
    assert!(history.train[0].domain.is_none());
    let variables = vs.variables();
    assert!(!variables["bert.encoder.layer.0.output.dense.weight"].requires_grad());
    assert!(!variables["bert.embeddings.word_embeddings.weight"]
        .grad()
        .defined());
    assert!(variables["qa_head.fc_ds_3.weight"].grad().defined());
    Ok(())
}

#[test]
fn multi_way_subjectivity_training() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let mut head_config = multitask_head_config(HeadKind::Linear, 1);
    head_config.n_qa_type_labels = Some(2);

    let vs = nn::VarStore::new(Device::Cpu);
    let model = QAModel::from_bert(vs.root(), &tiny_bert_config(), &head_config)?;
    let mut trainer = QATrainer::new(&vs, TrainingConfig::new(directory.path(), "model.ot", 1, 2))?;
    let weights = AuxiliaryLossWeights {
        qa_type_weights: Some(Tensor::from_slice(&[1.0f32, 3.0])),
        domain_weights: None,
    };
    let history = trainer.train(
        &vs,
        &model,
        &IdTokens,
        &[labelled_batch(0)?],
        &[labelled_batch(1)?],
        weights,
    )?;
    assert_eq!(history.train[0].steps, 1);
    assert!(history.train[0].subjectivity.is_some());

    assert!(trainer
        .train(
            &vs,
            &model,
            &IdTokens,
            &[labelled_batch(0)?],
            &[],
            AuxiliaryLossWeights::default(),
        )
        .is_err());
    Ok(())
}
