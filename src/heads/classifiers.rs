use crate::common::layers::{xavier_linear, Dropout};
use crate::heads::config::{HeadLayout, SubjectivityLabels};
use std::borrow::Borrow;
use tch::{nn, Tensor};

/// Logits of the subjectivity classifier
pub enum SubjectivityLogits {
    /// One logit per example for the answer and one for the question, each of shape (*batch size*)
    Binary { answer: Tensor, question: Tensor },
    /// Question-answer type logits of shape (*batch size*, *n_qa_type_labels*)
    MultiWay(Tensor),
}

/// Two-layer residual transform shared by every auxiliary classifier:
/// `dropout(x + fc_2(relu(dropout(fc_1(x)))))`
struct ResidualBlock {
    fc_1: nn::Linear,
    fc_2: nn::Linear,
    dropout: Dropout,
}

impl ResidualBlock {
    fn new<'p, P>(p: P, name: &str, hidden_size: i64, dropout_prob: f64) -> ResidualBlock
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        ResidualBlock {
            fc_1: xavier_linear(p / format!("fc_{}_1", name), hidden_size, hidden_size),
            fc_2: xavier_linear(p / format!("fc_{}_2", name), hidden_size, hidden_size),
            dropout: Dropout::new(dropout_prob),
        }
    }

    fn forward_t(&self, pooled: &Tensor, train: bool) -> Tensor {
        let residual = pooled
            .apply(&self.fc_1)
            .apply_t(&self.dropout, train)
            .relu()
            .apply(&self.fc_2);
        (pooled + residual).apply_t(&self.dropout, train)
    }
}

enum SubjectivityProjection {
    Binary {
        answer: nn::Linear,
        question: nn::Linear,
    },
    MultiWay(nn::Linear),
}

pub(crate) struct SubjectivityClassifier {
    block: ResidualBlock,
    projection: SubjectivityProjection,
}

impl SubjectivityClassifier {
    fn new<'p, P>(
        p: P,
        labels: SubjectivityLabels,
        hidden_size: i64,
        dropout_prob: f64,
    ) -> SubjectivityClassifier
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let projection = match labels {
            SubjectivityLabels::Binary => SubjectivityProjection::Binary {
                answer: xavier_linear(p / "fc_sbj_a", hidden_size, 1),
                question: xavier_linear(p / "fc_sbj_q", hidden_size, 1),
            },
            SubjectivityLabels::MultiWay(n_labels) => {
                SubjectivityProjection::MultiWay(xavier_linear(p / "fc_sbj_q", hidden_size, n_labels))
            }
        };
        SubjectivityClassifier {
            block: ResidualBlock::new(p, "sbj", hidden_size, dropout_prob),
            projection,
        }
    }

    pub(crate) fn forward_t(&self, pooled: &Tensor, train: bool) -> SubjectivityLogits {
        let hidden = self.block.forward_t(pooled, train);
        match &self.projection {
            SubjectivityProjection::Binary { answer, question } => SubjectivityLogits::Binary {
                answer: hidden.apply(answer).squeeze_dim(-1),
                question: hidden.apply(question).squeeze_dim(-1),
            },
            SubjectivityProjection::MultiWay(projection) => {
                SubjectivityLogits::MultiWay(hidden.apply(projection))
            }
        }
    }
}

/// Residual block followed by a single projection (domain: `n_domain_labels` outputs, dataset: 1 output)
pub(crate) struct ProjectionClassifier {
    block: ResidualBlock,
    projection: nn::Linear,
}

impl ProjectionClassifier {
    fn new<'p, P>(
        p: P,
        name: &str,
        hidden_size: i64,
        n_outputs: i64,
        dropout_prob: f64,
    ) -> ProjectionClassifier
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        ProjectionClassifier {
            block: ResidualBlock::new(p, name, hidden_size, dropout_prob),
            projection: xavier_linear(p / format!("fc_{}_3", name), hidden_size, n_outputs),
        }
    }

    pub(crate) fn forward_t(&self, pooled: &Tensor, train: bool) -> Tensor {
        self.block.forward_t(pooled, train).apply(&self.projection)
    }
}

/// Auxiliary classifiers instantiated for a [`HeadLayout`]
pub(crate) struct AuxiliaryClassifiers {
    subjectivity: Option<SubjectivityClassifier>,
    domain: Option<ProjectionClassifier>,
    dataset: Option<ProjectionClassifier>,
}

impl AuxiliaryClassifiers {
    pub(crate) fn new<'p, P>(
        p: P,
        layout: &HeadLayout,
        hidden_size: i64,
        dropout_prob: f64,
    ) -> AuxiliaryClassifiers
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let subjectivity = layout
            .subjectivity_labels()
            .map(|labels| SubjectivityClassifier::new(p, labels, hidden_size, dropout_prob));
        let domain = layout.n_domain_labels().map(|n_domain_labels| {
            ProjectionClassifier::new(p, "domain", hidden_size, n_domain_labels, dropout_prob)
        });
        let dataset = if layout.has_dataset_classifier() {
            Some(ProjectionClassifier::new(
                p,
                "ds",
                hidden_size,
                1,
                dropout_prob,
            ))
        } else {
            None
        };
        AuxiliaryClassifiers {
            subjectivity,
            domain,
            dataset,
        }
    }

    pub(crate) fn subjectivity(&self) -> Option<&SubjectivityClassifier> {
        self.subjectivity.as_ref()
    }

    pub(crate) fn domain(&self) -> Option<&ProjectionClassifier> {
        self.domain.as_ref()
    }

    /// Dataset classifier: 1 logit, squeezed to (*batch size*) by the caller
    pub(crate) fn dataset(&self) -> Option<&ProjectionClassifier> {
        self.dataset.as_ref()
    }
}
