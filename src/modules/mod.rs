//! # Building blocks shared by the task heads
//!
//! - [`GradientReversal`]: identity forward, negated gradient backward (adversarial training)
//! - [`Highway`]: gated residual transform controlling information flow
//! - [`RecurrentEncoder`]: stacked bidirectional LSTM/GRU over true sequence lengths

mod gradient_reversal;
mod highway;
mod recurrent;

pub use gradient_reversal::{grad_reverse, GradientReversal};
pub use highway::Highway;
pub use recurrent::{select_last_valid, RecurrentCell, RecurrentEncoder, RecurrentState};
