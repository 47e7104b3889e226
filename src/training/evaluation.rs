use crate::encoder::SequenceEncoder;
use crate::heads::TaskSelector;
use crate::model::QAModel;
use crate::scoring::{exact_match_batch, f1_batch, gold_answers, predicted_answers, TokenLookup};
use crate::training::batch::QABatch;
use crate::training::losses::MultitaskLoss;
use crate::training::metrics::{EpochMetrics, SpanAccumulator};
use crate::QaError;
use tch::{no_grad, Device, Tensor};
use tracing::{debug, warn};

/// Summed (exact-match, F1) of the predicted answers of a batch against its gold answers
pub(crate) fn score_batch<T: TokenLookup + ?Sized>(
    lookup: &T,
    batch: &QABatch,
    start_logits: &Tensor,
    end_logits: &Tensor,
) -> Result<(f64, f64), QaError> {
    let predictions = predicted_answers(lookup, &batch.input_ids, start_logits, end_logits)?;
    let gold = gold_answers(
        lookup,
        &batch.input_ids,
        &batch.start_positions,
        &batch.end_positions,
    )?;
    Ok((
        exact_match_batch(&gold, &predictions),
        f1_batch(&gold, &predictions),
    ))
}

/// Forward-only pass over a validation or test set
///
/// Batches whose size differs from `batch_size` (typically a trailing partial batch) are skipped.
/// No gradient is computed and the model parameters are left untouched.
///
/// # Arguments
///
/// * `model` - `QAModel` to evaluate
/// * `lookup` - token lookup used to render the answers
/// * `batches` - evaluation batches
/// * `batch_size` - expected batch size
/// * `sort_batch` - reorder every batch by decreasing true sequence length
/// * `device` - device the batches are moved to
///
/// # Returns
///
/// * `EpochMetrics` with the mean span loss, the exact-match and the F1 percentages
pub fn evaluate<E, T>(
    model: &QAModel<E>,
    lookup: &T,
    batches: &[QABatch],
    batch_size: i64,
    sort_batch: bool,
    device: Device,
) -> Result<EpochMetrics, QaError>
where
    E: SequenceEncoder,
    T: TokenLookup + ?Sized,
{
    no_grad(|| {
        let mut accumulator = SpanAccumulator::default();
        for (batch_index, batch) in batches.iter().enumerate() {
            if batch.batch_size() != batch_size {
                debug!(
                    "Skipping evaluation batch {} of size {} (expected {})",
                    batch_index,
                    batch.batch_size(),
                    batch_size
                );
                continue;
            }
            let batch = batch.to_device(device);
            let batch = if sort_batch {
                batch.sort_by_length()?
            } else {
                batch
            };

            let (start_logits, end_logits) = model
                .forward_t(
                    TaskSelector::QA,
                    &batch.input_ids,
                    Some(&batch.attention_mask),
                    Some(&batch.token_type_ids),
                    Some(&batch.input_lengths),
                    false,
                )?
                .logits
                .into_span()?;
            let loss = MultitaskLoss::span_loss(
                &start_logits,
                &end_logits,
                &batch.start_positions,
                &batch.end_positions,
            )
            .double_value(&[]);
            let (exact_match, f1) = score_batch(lookup, &batch, &start_logits, &end_logits)?;
            accumulator.update(loss, exact_match, f1, batch.batch_size() as usize);
            debug!("Evaluation batch {} loss: {:.3}", batch_index, loss);
        }

        if accumulator.steps() == 0 {
            warn!(
                "No evaluation batch of size {} among {} batches, metrics default to 0",
                batch_size,
                batches.len()
            );
        }
        Ok(accumulator.finish(None, None))
    })
}
