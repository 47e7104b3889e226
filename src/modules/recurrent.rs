use crate::QaError;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::str::FromStr;
use tch::nn::{RNNConfig, RNN};
use tch::{nn, Device, Kind, Tensor};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
/// # Recurrent unit used by the re-encoder
pub enum RecurrentCell {
    LSTM,
    GRU,
}

impl FromStr for RecurrentCell {
    type Err = QaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LSTM" | "lstm" => Ok(RecurrentCell::LSTM),
            "GRU" | "gru" => Ok(RecurrentCell::GRU),
            _ => Err(QaError::InvalidConfigurationError(format!(
                "Recurrent cell must be one of {{LSTM, GRU}}, got {}",
                s
            ))),
        }
    }
}

/// Hidden (and cell) state of a stacked bidirectional recurrent encoder.
/// Every tensor has shape (*num_layers* x *num_directions*, *batch size*, *hidden size*), ordered
/// layer by layer with the forward direction first.
pub enum RecurrentState {
    Lstm { hidden: Tensor, cell: Tensor },
    Gru { hidden: Tensor },
}

impl RecurrentState {
    pub fn hidden(&self) -> &Tensor {
        match self {
            RecurrentState::Lstm { hidden, .. } => hidden,
            RecurrentState::Gru { hidden } => hidden,
        }
    }

    pub fn cell(&self) -> Option<&Tensor> {
        match self {
            RecurrentState::Lstm { cell, .. } => Some(cell),
            RecurrentState::Gru { .. } => None,
        }
    }
}

enum DirectionalUnit {
    Lstm(nn::LSTM),
    Gru(nn::GRU),
}

impl DirectionalUnit {
    fn new<'p, P>(p: P, cell: RecurrentCell, in_size: i64, hidden_size: i64) -> DirectionalUnit
    where
        P: Borrow<nn::Path<'p>>,
    {
        let config = RNNConfig {
            has_biases: true,
            num_layers: 1,
            dropout: 0.0,
            train: true,
            bidirectional: false,
            batch_first: true,
            ..Default::default()
        };
        match cell {
            RecurrentCell::LSTM => {
                DirectionalUnit::Lstm(nn::lstm(p, in_size, hidden_size, config))
            }
            RecurrentCell::GRU => DirectionalUnit::Gru(nn::gru(p, in_size, hidden_size, config)),
        }
    }

    fn run(&self, input: &Tensor, state: &RecurrentState, index: i64) -> Result<Tensor, QaError> {
        Ok(match (self, state) {
            (DirectionalUnit::Lstm(lstm), RecurrentState::Lstm { hidden, cell }) => {
                let initial = nn::LSTMState((hidden.narrow(0, index, 1), cell.narrow(0, index, 1)));
                lstm.seq_init(input, &initial).0
            }
            (DirectionalUnit::Gru(gru), RecurrentState::Gru { hidden }) => {
                let initial = nn::GRUState(hidden.narrow(0, index, 1));
                gru.seq_init(input, &initial).0
            }
            _ => {
                return Err(QaError::ValueError(
                    "Recurrent state does not match the recurrent cell of the encoder".into(),
                ));
            }
        })
    }
}

/// # Stacked bidirectional recurrent re-encoder
/// Mixes temporal context across the token representations produced by the sequence encoder.
/// Each direction has `in_size / 2` units so that the concatenated output keeps the input size.
///
/// Sequences are handled by their true length: the backward direction reads every sequence
/// reversed within its own length, so padding never flows into valid positions, and padded
/// output positions are set to zero.
pub struct RecurrentEncoder {
    cell: RecurrentCell,
    layers: Vec<(DirectionalUnit, DirectionalUnit)>,
    hidden_size: i64,
    device: Device,
}

impl RecurrentEncoder {
    /// Build a new `RecurrentEncoder`
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the recurrent encoder
    /// * `cell` - `RecurrentCell` (LSTM or GRU)
    /// * `in_size` - size of the input representations, must be even
    /// * `num_layers` - number of stacked bidirectional layers
    pub fn new<'p, P>(
        p: P,
        cell: RecurrentCell,
        in_size: i64,
        num_layers: i64,
    ) -> Result<RecurrentEncoder, QaError>
    where
        P: Borrow<nn::Path<'p>>,
    {
        if in_size % 2 != 0 {
            return Err(QaError::InvalidConfigurationError(format!(
                "Bidirectional re-encoder requires an even input size, got {}",
                in_size
            )));
        }
        if num_layers < 1 {
            return Err(QaError::InvalidConfigurationError(format!(
                "Recurrent encoder requires at least one layer, got {}",
                num_layers
            )));
        }
        let p = p.borrow();
        let hidden_size = in_size / 2;

        let layers = (0..num_layers)
            .map(|layer| {
                let layer_in_size = if layer == 0 { in_size } else { 2 * hidden_size };
                (
                    DirectionalUnit::new(
                        p / format!("l{}_forward", layer),
                        cell,
                        layer_in_size,
                        hidden_size,
                    ),
                    DirectionalUnit::new(
                        p / format!("l{}_backward", layer),
                        cell,
                        layer_in_size,
                        hidden_size,
                    ),
                )
            })
            .collect();

        Ok(RecurrentEncoder {
            cell,
            layers,
            hidden_size,
            device: p.device(),
        })
    }

    pub fn num_layers(&self) -> i64 {
        self.layers.len() as i64
    }

    /// Number of units per direction
    pub fn hidden_size(&self) -> i64 {
        self.hidden_size
    }

    /// Zero state of shape (*num_layers* x 2, `batch_size`, *hidden size*) for the configured cell.
    pub fn init_hidden(&self, batch_size: i64) -> RecurrentState {
        let shape = [2 * self.num_layers(), batch_size, self.hidden_size];
        let zeros = || Tensor::zeros(shape.as_slice(), (Kind::Float, self.device));
        match self.cell {
            RecurrentCell::LSTM => RecurrentState::Lstm {
                hidden: zeros(),
                cell: zeros(),
            },
            RecurrentCell::GRU => RecurrentState::Gru { hidden: zeros() },
        }
    }

    /// Forward pass through the re-encoder
    ///
    /// # Arguments
    ///
    /// * `input` - tensor of shape (*batch size*, *sequence_length*, *in_size*)
    /// * `input_lengths` - true sequence lengths of shape (*batch size*), between 1 and *sequence_length*
    /// * `state` - Optional initial state (see `init_hidden`). If None, zero states are used.
    ///
    /// # Returns
    ///
    /// * `Tensor` of shape (*batch size*, *sequence_length*, *in_size*), zero at padded positions
    pub fn forward(
        &self,
        input: &Tensor,
        input_lengths: &Tensor,
        state: Option<&RecurrentState>,
    ) -> Result<Tensor, QaError> {
        let (batch_size, sequence_length, _) = input.size3()?;
        if input_lengths.size() != [batch_size] {
            return Err(QaError::ValueError(format!(
                "Expected {} sequence lengths, got a tensor of shape {:?}",
                batch_size,
                input_lengths.size()
            )));
        }
        let lengths = input_lengths.to_kind(Kind::Int64).to_device(input.device());
        let (min_length, max_length) = (
            lengths.min().int64_value(&[]),
            lengths.max().int64_value(&[]),
        );
        if min_length < 1 || max_length > sequence_length {
            return Err(QaError::ValueError(format!(
                "Sequence lengths must lie in [1, {}], got [{}, {}]",
                sequence_length, min_length, max_length
            )));
        }

        let default_state;
        let state = match state {
            Some(value) => {
                let expected = [2 * self.num_layers(), batch_size, self.hidden_size];
                for tensor in [Some(value.hidden()), value.cell()].iter().flatten() {
                    if tensor.size() != expected {
                        return Err(QaError::ValueError(format!(
                            "Expected recurrent state of shape {:?}, got {:?}",
                            expected,
                            tensor.size()
                        )));
                    }
                }
                value
            }
            None => {
                default_state = self.init_hidden(batch_size);
                &default_state
            }
        };

        let positions = Tensor::arange(sequence_length, (Kind::Int64, input.device()))
            .unsqueeze(0)
            .expand([batch_size, sequence_length].as_slice(), true);
        let lengths = lengths.unsqueeze(1);
        let valid = positions.lt_tensor(&lengths);
        let reversed_positions = (&lengths - 1 - &positions).where_self(&valid, &positions);
        let valid = valid.unsqueeze(-1).to_kind(input.kind());

        let reverse_within_length = |x: &Tensor| {
            let index = reversed_positions
                .unsqueeze(-1)
                .expand([batch_size, sequence_length, x.size()[2]].as_slice(), true);
            x.gather(1, &index, false)
        };

        let mut hidden_states = input.shallow_clone();
        for (layer_index, (forward_unit, backward_unit)) in self.layers.iter().enumerate() {
            let layer_index = layer_index as i64;
            let forward_output = forward_unit.run(&hidden_states, state, 2 * layer_index)?;
            let backward_output = backward_unit.run(
                &reverse_within_length(&hidden_states),
                state,
                2 * layer_index + 1,
            )?;
            let backward_output = reverse_within_length(&backward_output);
            hidden_states = Tensor::cat(&[forward_output, backward_output], -1) * &valid;
        }
        Ok(hidden_states)
    }
}

/// Representation at the last valid (non-padded) position of each sequence.
///
/// # Arguments
///
/// * `hidden_states` - tensor of shape (*batch size*, *sequence_length*, *hidden_size*)
/// * `input_lengths` - true sequence lengths of shape (*batch size*)
pub fn select_last_valid(hidden_states: &Tensor, input_lengths: &Tensor) -> Tensor {
    let hidden_size = hidden_states.size()[2];
    let index = (input_lengths.to_kind(Kind::Int64).to_device(hidden_states.device()) - 1)
        .view((-1, 1, 1))
        .expand([-1, 1, hidden_size].as_slice(), false);
    hidden_states.gather(1, &index, false).squeeze_dim(1)
}
