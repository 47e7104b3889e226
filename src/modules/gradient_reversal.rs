use tch::Tensor;

/// # Gradient reversal layer
/// Identity on the forward pass, multiplies the incoming gradient by `-lambda` on the backward pass.
/// Placed between the shared representation and an auxiliary classifier, it pushes the shared
/// representation to become *worse* at predicting the auxiliary label (domain, dataset or
/// question-answer type invariance).
///
/// libtorch does not expose custom autograd functions through tch, the reversal is expressed with
/// detached branches instead: `x.detach() + (r - r.detach())` with `r = -lambda * x`. The second
/// term is exactly zero in value and carries the `-lambda` gradient.
#[derive(Debug, Clone, Copy)]
pub struct GradientReversal {
    lambda: f64,
}

impl Default for GradientReversal {
    fn default() -> Self {
        GradientReversal { lambda: 1.0 }
    }
}

impl GradientReversal {
    pub fn new(lambda: f64) -> GradientReversal {
        GradientReversal { lambda }
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn forward(&self, input: &Tensor) -> Tensor {
        let reversed = input * (-self.lambda);
        input.detach() + (&reversed - reversed.detach())
    }
}

/// Gradient reversal with a unit scale.
pub fn grad_reverse(input: &Tensor) -> Tensor {
    GradientReversal::default().forward(input)
}
