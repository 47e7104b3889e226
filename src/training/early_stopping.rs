use crate::training::config::DatasetKind;

/// # Early stopping on validation scores
/// Training stops as soon as both the validation F1 and exact-match decrease relative to the
/// previous epoch. Only runs fine-tuned on SQuAD are eligible.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    enabled: bool,
    previous: Option<(f64, f64)>,
}

impl EarlyStopping {
    pub fn new(enabled: bool, dataset: DatasetKind) -> EarlyStopping {
        EarlyStopping {
            enabled: enabled && dataset == DatasetKind::SQuAD,
            previous: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records the validation scores of an epoch and returns whether training should stop.
    pub fn should_stop(&mut self, exact_match: f64, f1: f64) -> bool {
        let stop = self.enabled
            && self.previous.map_or(false, |(previous_exact_match, previous_f1)| {
                exact_match < previous_exact_match && f1 < previous_f1
            });
        self.previous = Some((exact_match, f1));
        stop
    }
}
