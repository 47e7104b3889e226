use crate::QaError;
use lazy_static::lazy_static;
use regex::Regex;
use tch::nn;

lazy_static! {
    static ref ENCODER_LAYER: Regex = Regex::new(r"^bert\.encoder\.layer\.(\d+)\.").unwrap();
}

const ENCODER_PREFIX: &str = "bert.";
const POOLER_PREFIX: &str = "bert.pooler.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Number of encoder parameter tensors left trainable or frozen
pub struct FreezeSummary {
    pub frozen: usize,
    pub trainable: usize,
}

/// Freezes the encoder parameters (`bert.*`) except the top `unfrozen_top_layers` transformer
/// layers and the pooler. The layer index is read from the parameter name
/// (`bert.encoder.layer.<index>.`). Head parameters are left untouched.
pub fn freeze_encoder_layers(
    vs: &nn::VarStore,
    num_hidden_layers: i64,
    unfrozen_top_layers: i64,
) -> Result<FreezeSummary, QaError> {
    let first_trainable_layer = num_hidden_layers - unfrozen_top_layers;
    let mut summary = FreezeSummary::default();

    for (name, variable) in vs.variables() {
        if !name.starts_with(ENCODER_PREFIX) {
            continue;
        }
        let trainable = if name.starts_with(POOLER_PREFIX) {
            true
        } else if let Some(captures) = ENCODER_LAYER.captures(&name) {
            let layer_index = captures[1].parse::<i64>().map_err(|_| {
                QaError::ValueError(format!("Invalid layer index in parameter name {}", name))
            })?;
            layer_index >= first_trainable_layer
        } else {
            false
        };

        let _ = variable.set_requires_grad(trainable);
        if trainable {
            summary.trainable += 1;
        } else {
            summary.frozen += 1;
        }
    }
    Ok(summary)
}
