use crate::training::config::QaType;
use std::convert::TryFrom;
use crate::QaError;
use tch::{Device, Kind, Tensor};

/// # Tokenized question answering batch
/// Every tensor shares the batch dimension; token-level tensors also share the sequence dimension.
/// Auxiliary labels are optional and only required by the objectives that read them.
pub struct QABatch {
    /// Token ids of shape (*batch size*, *sequence_length*)
    pub input_ids: Tensor,
    /// Attention mask of shape (*batch size*, *sequence_length*)
    pub attention_mask: Tensor,
    /// Segment ids of shape (*batch size*, *sequence_length*)
    pub token_type_ids: Tensor,
    /// True (unpadded) sequence lengths of shape (*batch size*)
    pub input_lengths: Tensor,
    /// Gold answer start token positions of shape (*batch size*)
    pub start_positions: Tensor,
    /// Gold answer end token positions of shape (*batch size*)
    pub end_positions: Tensor,
    /// Subjectivity label of the answer (binary, or question-answer type class)
    pub answer_subjectivity: Option<Tensor>,
    /// Subjectivity label of the question (binary, or question-answer type class)
    pub question_subjectivity: Option<Tensor>,
    pub domain_labels: Option<Tensor>,
    /// Source dataset of every example (0: SQuAD, 1: SubjQA)
    pub dataset_labels: Option<Tensor>,
}

fn check_batch_dim(name: &str, tensor: &Tensor, batch_size: i64) -> Result<(), QaError> {
    if tensor.size() != [batch_size] {
        return Err(QaError::ValueError(format!(
            "Expected {} of shape [{}], got {:?}",
            name,
            batch_size,
            tensor.size()
        )));
    }
    Ok(())
}

impl QABatch {
    /// Build a new `QABatch`, validating the tensor shapes
    pub fn new(
        input_ids: Tensor,
        attention_mask: Tensor,
        token_type_ids: Tensor,
        input_lengths: Tensor,
        start_positions: Tensor,
        end_positions: Tensor,
    ) -> Result<QABatch, QaError> {
        let (batch_size, _) = input_ids.size2()?;
        for (name, tensor) in [
            ("attention mask", &attention_mask),
            ("token type ids", &token_type_ids),
        ] {
            if tensor.size() != input_ids.size() {
                return Err(QaError::ValueError(format!(
                    "Expected {} of shape {:?}, got {:?}",
                    name,
                    input_ids.size(),
                    tensor.size()
                )));
            }
        }
        check_batch_dim("input lengths", &input_lengths, batch_size)?;
        check_batch_dim("start positions", &start_positions, batch_size)?;
        check_batch_dim("end positions", &end_positions, batch_size)?;

        Ok(QABatch {
            input_ids,
            attention_mask,
            token_type_ids,
            input_lengths,
            start_positions,
            end_positions,
            answer_subjectivity: None,
            question_subjectivity: None,
            domain_labels: None,
            dataset_labels: None,
        })
    }

    pub fn with_subjectivity_labels(
        mut self,
        answer_subjectivity: Tensor,
        question_subjectivity: Tensor,
    ) -> Result<QABatch, QaError> {
        check_batch_dim("answer subjectivity labels", &answer_subjectivity, self.batch_size())?;
        check_batch_dim(
            "question subjectivity labels",
            &question_subjectivity,
            self.batch_size(),
        )?;
        self.answer_subjectivity = Some(answer_subjectivity);
        self.question_subjectivity = Some(question_subjectivity);
        Ok(self)
    }

    pub fn with_domain_labels(mut self, domain_labels: Tensor) -> Result<QABatch, QaError> {
        check_batch_dim("domain labels", &domain_labels, self.batch_size())?;
        self.domain_labels = Some(domain_labels);
        Ok(self)
    }

    pub fn with_dataset_labels(mut self, dataset_labels: Tensor) -> Result<QABatch, QaError> {
        check_batch_dim("dataset labels", &dataset_labels, self.batch_size())?;
        self.dataset_labels = Some(dataset_labels);
        Ok(self)
    }

    pub fn batch_size(&self) -> i64 {
        self.input_ids.size()[0]
    }

    pub fn sequence_length(&self) -> i64 {
        self.input_ids.size()[1]
    }

    /// Subjectivity labels feeding the auxiliary objective
    pub fn subjectivity_labels(&self, qa_type: QaType) -> Result<&Tensor, QaError> {
        let labels = match qa_type {
            QaType::Question => self.question_subjectivity.as_ref(),
            QaType::Answer => self.answer_subjectivity.as_ref(),
        };
        labels.ok_or_else(|| missing_labels(&format!("{:?} subjectivity", qa_type)))
    }

    pub fn domain_labels(&self) -> Result<&Tensor, QaError> {
        self.domain_labels
            .as_ref()
            .ok_or_else(|| missing_labels("domain"))
    }

    pub fn dataset_labels(&self) -> Result<&Tensor, QaError> {
        self.dataset_labels
            .as_ref()
            .ok_or_else(|| missing_labels("dataset"))
    }

    fn map_tensors<F>(&self, f: F) -> QABatch
    where
        F: Fn(&Tensor) -> Tensor,
    {
        QABatch {
            input_ids: f(&self.input_ids),
            attention_mask: f(&self.attention_mask),
            token_type_ids: f(&self.token_type_ids),
            input_lengths: f(&self.input_lengths),
            start_positions: f(&self.start_positions),
            end_positions: f(&self.end_positions),
            answer_subjectivity: self.answer_subjectivity.as_ref().map(&f),
            question_subjectivity: self.question_subjectivity.as_ref().map(&f),
            domain_labels: self.domain_labels.as_ref().map(&f),
            dataset_labels: self.dataset_labels.as_ref().map(&f),
        }
    }

    pub fn to_device(&self, device: Device) -> QABatch {
        self.map_tensors(|tensor| tensor.to_device(device))
    }

    /// Reorders the examples by decreasing true sequence length.
    /// The sort is stable: examples of equal length keep their original order.
    pub fn sort_by_length(&self) -> Result<QABatch, QaError> {
        let lengths = Vec::<i64>::try_from(
            &self
                .input_lengths
                .to_kind(Kind::Int64)
                .to_device(Device::Cpu),
        )?;
        let mut order: Vec<i64> = (0..lengths.len() as i64).collect();
        order.sort_by_key(|&index| std::cmp::Reverse(lengths[index as usize]));
        let index = Tensor::from_slice(&order).to_device(self.input_ids.device());
        Ok(self.map_tensors(|tensor| tensor.index_select(0, &index.to_device(tensor.device()))))
    }
}

fn missing_labels(name: &str) -> QaError {
    QaError::ValueError(format!("Batch does not contain {} labels", name))
}
