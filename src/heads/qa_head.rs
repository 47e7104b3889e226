use crate::heads::config::{HeadKind, HeadLayout, QAHeadConfig};
use crate::heads::linear::LinearQAHead;
use crate::heads::output::{HeadInput, HeadOutput, TaskSelector};
use crate::heads::recurrent::RecurrentQAHead;
use crate::QaError;
use std::borrow::Borrow;
use tch::nn;

/// # Task head selected by configuration
pub enum QAHead {
    Linear(LinearQAHead),
    Recurrent(RecurrentQAHead),
}

impl QAHead {
    /// Builds the head named by `config.head`.
    pub fn new<'p, P>(p: P, config: &QAHeadConfig) -> Result<QAHead, QaError>
    where
        P: Borrow<nn::Path<'p>>,
    {
        Ok(match config.head {
            HeadKind::Linear => QAHead::Linear(LinearQAHead::new(p, config)?),
            HeadKind::Recurrent => QAHead::Recurrent(RecurrentQAHead::new(p, config)?),
        })
    }

    pub fn layout(&self) -> &HeadLayout {
        match self {
            QAHead::Linear(head) => head.layout(),
            QAHead::Recurrent(head) => head.layout(),
        }
    }

    pub fn forward_t(
        &self,
        task: TaskSelector,
        input: &HeadInput,
        train: bool,
    ) -> Result<HeadOutput, QaError> {
        match self {
            QAHead::Linear(head) => head.forward_t(task, input, train),
            QAHead::Recurrent(head) => head.forward_t(task, input, train),
        }
    }
}
