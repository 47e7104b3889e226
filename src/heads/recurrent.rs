use crate::heads::config::{HeadKind, HeadLayout, QAHeadConfig};
use crate::heads::output::{HeadInput, HeadOutput, TaskSelector};
use crate::heads::shared::{LastLayers, TaskHeadCore};
use crate::modules::{select_last_valid, Highway, RecurrentEncoder, RecurrentState};
use crate::QaError;
use std::borrow::Borrow;
use tch::nn;

/// # Recurrent QA head
/// Re-encodes the encoder representations with a stacked bidirectional LSTM or GRU before the
/// task projection: dropout, optional highway block, recurrent re-encoder, optional highway block.
/// Classification tasks pool the last valid position of every sequence, so the true sequence
/// lengths are required for every task.
pub struct RecurrentQAHead {
    core: TaskHeadCore,
    recurrent: RecurrentEncoder,
    highway: Option<(Highway, Highway)>,
}

impl RecurrentQAHead {
    pub fn new<'p, P>(p: P, config: &QAHeadConfig) -> Result<RecurrentQAHead, QaError>
    where
        P: Borrow<nn::Path<'p>>,
    {
        if config.head != HeadKind::Recurrent {
            return Err(QaError::InvalidConfigurationError(format!(
                "Recurrent QA head built from a {:?} configuration",
                config.head
            )));
        }
        let p = p.borrow();
        let layout = config.layout()?;
        let recurrent = RecurrentEncoder::new(
            p / "rnn",
            config.recurrent_cell,
            config.hidden_size,
            config.n_recurrent_layers,
        )?;
        let highway = if config.highway_connection {
            Some((
                Highway::new(p / "highway_1", config.hidden_size),
                Highway::new(p / "highway_2", config.hidden_size),
            ))
        } else {
            None
        };
        Ok(RecurrentQAHead {
            core: TaskHeadCore::new(p, config, layout),
            recurrent,
            highway,
        })
    }

    pub fn layout(&self) -> &HeadLayout {
        self.core.layout()
    }

    /// Zero initial state of the re-encoder for a batch
    pub fn init_hidden(&self, batch_size: i64) -> RecurrentState {
        self.recurrent.init_hidden(batch_size)
    }

    pub fn forward_t(
        &self,
        task: TaskSelector,
        input: &HeadInput,
        train: bool,
    ) -> Result<HeadOutput, QaError> {
        let input_lengths = input.input_lengths.ok_or_else(|| {
            QaError::ValueError("Recurrent QA head requires the true sequence lengths".into())
        })?;

        let representation = input
            .encoder_output
            .hidden_state
            .apply_t(&self.core.qa_dropout, train);
        let representation = match &self.highway {
            Some((highway_1, _)) => highway_1.forward(&representation),
            None => representation,
        };
        let representation =
            self.recurrent
                .forward(&representation, input_lengths, input.recurrent_state)?;
        let representation = match &self.highway {
            Some((_, highway_2)) => highway_2.forward(&representation),
            None => representation,
        };

        let pooled = select_last_valid(&representation, input_lengths);
        self.core.forward_t(
            task,
            &representation,
            &pooled,
            input,
            LastLayers::Final,
            train,
        )
    }
}
