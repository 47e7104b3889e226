use crate::heads::config::{HeadKind, HeadLayout, QAHeadConfig};
use crate::heads::output::{HeadInput, HeadOutput, TaskSelector};
use crate::heads::shared::{LastLayers, TaskHeadCore};
use crate::modules::Highway;
use crate::QaError;
use std::borrow::Borrow;
use tch::nn;

/// # Linear QA head
/// Fully connected output layers on top of the encoder representations:
/// dropout, optional pair of highway blocks, then the task projection.
/// Classification tasks pool the first (CLS) position.
pub struct LinearQAHead {
    core: TaskHeadCore,
    highway: Option<(Highway, Highway)>,
}

impl LinearQAHead {
    /// Build a new `LinearQAHead`
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the head
    /// * `config` - `QAHeadConfig` object defining the head layout
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rust_subjqa::heads::{HeadKind, LinearQAHead, QAHeadConfig};
    /// use tch::{nn, Device};
    ///
    /// # fn main() -> Result<(), rust_subjqa::QaError> {
    /// let vs = nn::VarStore::new(Device::Cpu);
    /// let mut config = QAHeadConfig::new(HeadKind::Linear, 768);
    /// config.multitask = true;
    /// config.n_aux_tasks = Some(1);
    /// let head = LinearQAHead::new(vs.root() / "qa_head", &config)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new<'p, P>(p: P, config: &QAHeadConfig) -> Result<LinearQAHead, QaError>
    where
        P: Borrow<nn::Path<'p>>,
    {
        if config.head != HeadKind::Linear {
            return Err(QaError::InvalidConfigurationError(format!(
                "Linear QA head built from a {:?} configuration",
                config.head
            )));
        }
        let p = p.borrow();
        let layout = config.layout()?;
        let highway = if config.highway_connection {
            Some((
                Highway::new(p / "highway_1", config.hidden_size),
                Highway::new(p / "highway_2", config.hidden_size),
            ))
        } else {
            None
        };
        Ok(LinearQAHead {
            core: TaskHeadCore::new(p, config, layout),
            highway,
        })
    }

    pub fn layout(&self) -> &HeadLayout {
        self.core.layout()
    }

    /// Forward pass through the head
    ///
    /// # Arguments
    ///
    /// * `task` - `TaskSelector` choosing the logits to produce
    /// * `input` - `HeadInput` wrapping the encoder output and optional auxiliary inputs
    /// * `train` - boolean flag to turn on/off the dropout layers. Should be set to false for inference.
    pub fn forward_t(
        &self,
        task: TaskSelector,
        input: &HeadInput,
        train: bool,
    ) -> Result<HeadOutput, QaError> {
        let representation = input
            .encoder_output
            .hidden_state
            .apply_t(&self.core.qa_dropout, train);
        let representation = match &self.highway {
            Some((highway_1, highway_2)) => highway_2.forward(&highway_1.forward(&representation)),
            None => representation,
        };
        let pooled = representation.select(1, 0);
        self.core.forward_t(
            task,
            &representation,
            &pooled,
            input,
            LastLayers::BeforeFinal,
            train,
        )
    }
}
