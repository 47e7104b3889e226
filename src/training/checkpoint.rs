use crate::QaError;
use std::fs;
use std::path::{Path, PathBuf};
use tch::nn;

/// # Best-model checkpointing
/// Model parameters are written to `<model_dir>/<model_name>` on the first epoch and whenever the
/// validation exact-match strictly exceeds the best value seen so far.
pub struct CheckpointManager {
    path: PathBuf,
    best_exact_match: Option<f64>,
}

impl CheckpointManager {
    /// Creates the model directory if needed
    pub fn new<P: AsRef<Path>>(model_dir: P, model_name: &str) -> Result<CheckpointManager, QaError> {
        fs::create_dir_all(model_dir.as_ref())?;
        Ok(CheckpointManager {
            path: model_dir.as_ref().join(model_name),
            best_exact_match: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn best_exact_match(&self) -> Option<f64> {
        self.best_exact_match
    }

    pub fn is_improvement(&self, epoch: usize, exact_match: f64) -> bool {
        epoch == 0
            || self
                .best_exact_match
                .map_or(true, |best_exact_match| exact_match > best_exact_match)
    }

    /// Saves the parameters if the epoch qualifies. Returns whether a checkpoint was written.
    pub fn update(
        &mut self,
        vs: &nn::VarStore,
        epoch: usize,
        exact_match: f64,
    ) -> Result<bool, QaError> {
        if !self.is_improvement(epoch, exact_match) {
            return Ok(false);
        }
        vs.save(&self.path)?;
        self.best_exact_match = Some(exact_match);
        Ok(true)
    }

    /// Restores the best parameters into `vs`
    pub fn load(&self, vs: &mut nn::VarStore) -> Result<(), QaError> {
        if !self.path.is_file() {
            return Err(QaError::IOError(format!(
                "No checkpoint found at {}",
                self.path.display()
            )));
        }
        vs.load(&self.path)?;
        Ok(())
    }
}
