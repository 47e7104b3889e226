//! # Task heads
//!
//! Output layers turning encoder representations into span logits and auxiliary classification
//! logits. Two architectures are available:
//! - [`LinearQAHead`]: fully connected layers on top of the encoder
//! - [`RecurrentQAHead`]: a bidirectional LSTM / GRU re-encoder before the fully connected layers
//!
//! Which auxiliary classifiers are built is decided once, at construction, by resolving the
//! [`QAHeadConfig`] into a [`HeadLayout`]:
//!
//! | task | auxiliary tasks | layout |
//! |---|---|---|
//! | `QA` | none | `SingleTask` |
//! | `QA` | 1 | `Subjectivity` |
//! | `QA` | 2 | `SubjectivityDomain`, or `SubjectivityDataset` when dataset-agnostic |
//! | `Sbj_Classification` | - | `SubjectivityClassification` |
//! | `Domain_Classification` | - | `DomainClassification` |
//! | `all` | - | `Sequential` |
//!
//! Under adversarial training the domain and dataset classifiers (and the subjectivity
//! classifier unless the head is dataset- or review-agnostic) read their input through a
//! gradient reversal layer.

mod classifiers;
mod config;
mod linear;
mod output;
mod qa_head;
mod recurrent;
mod shared;

pub use classifiers::SubjectivityLogits;
pub use config::{
    Adversary, AuxiliaryObjectives, HeadKind, HeadLayout, QAHeadConfig, SubjectivityLabels,
    TaskKind,
};
pub use linear::LinearQAHead;
pub use output::{
    AuxiliaryHiddenStates, HeadInput, HeadOutput, HiddenStateRequest, TaskLogits, TaskSelector,
};
pub use qa_head::QAHead;
pub use recurrent::RecurrentQAHead;
