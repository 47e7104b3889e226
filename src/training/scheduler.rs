use tch::nn;

/// # Linear warmup and decay learning rate schedule
/// The learning rate grows linearly from 0 to the base rate over `warmup_steps`, then decreases
/// linearly to 0 at `total_steps`.
#[derive(Debug, Clone)]
pub struct LinearWarmupScheduler {
    base_learning_rate: f64,
    warmup_steps: usize,
    total_steps: usize,
    current_step: usize,
}

impl LinearWarmupScheduler {
    /// Creates the schedule and sets the initial learning rate of the optimizer.
    pub fn new(
        optimizer: &mut nn::Optimizer,
        base_learning_rate: f64,
        warmup_steps: usize,
        total_steps: usize,
    ) -> LinearWarmupScheduler {
        let scheduler = LinearWarmupScheduler {
            base_learning_rate,
            warmup_steps,
            total_steps,
            current_step: 0,
        };
        optimizer.set_lr(scheduler.learning_rate());
        scheduler
    }

    /// Learning rate at the current step
    pub fn learning_rate(&self) -> f64 {
        let step = self.current_step as f64;
        let factor = if self.current_step < self.warmup_steps {
            step / self.warmup_steps.max(1) as f64
        } else {
            let remaining = self.total_steps.saturating_sub(self.current_step) as f64;
            let decay_steps = self.total_steps.saturating_sub(self.warmup_steps).max(1) as f64;
            remaining / decay_steps
        };
        self.base_learning_rate * factor
    }

    /// Advances the schedule by one optimizer step.
    pub fn step(&mut self, optimizer: &mut nn::Optimizer) -> f64 {
        self.current_step += 1;
        let learning_rate = self.learning_rate();
        optimizer.set_lr(learning_rate);
        learning_rate
    }
}
