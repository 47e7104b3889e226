use crate::common::layers::xavier_linear;
use std::borrow::Borrow;
use tch::{nn, Tensor};

/// # Highway block
/// Learned convex combination of a non-linear transform of the input and the input itself:
/// `gate * relu(W_t x + b_t) + (1 - gate) * x` with `gate = sigmoid(W_g x + b_g)`.
/// Applied independently at every token position, the output has the input dimension.
#[derive(Debug)]
pub struct Highway {
    transform: nn::Linear,
    gate: nn::Linear,
}

impl Highway {
    pub fn new<'p, P>(p: P, size: i64) -> Highway
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        Highway {
            transform: xavier_linear(p / "transform", size, size),
            gate: xavier_linear(p / "gate", size, size),
        }
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        let gate = input.apply(&self.gate).sigmoid();
        let transformed = input.apply(&self.transform).relu();
        &gate * transformed + (gate.ones_like() - &gate) * input
    }
}
