//! Class-weighted sigmoid cross-entropy on per-pixel logits.

use burn::tensor::activation::relu;
use burn::tensor::{backend::Backend, Bool, Tensor};

/// Mean weighted cross-entropy over every element.
///
/// Per element, with logit `x`, target `z` and `q = pos_weight`:
/// `(1 - z) * x + (1 + (q - 1) * z) * (log1p(exp(-|x|)) + max(-x, 0))`,
/// which equals `q * z * -log(sigmoid(x)) + (1 - z) * -log(1 - sigmoid(x))`
/// without overflowing for large `|x|`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedCrossEntropy {
    pub pos_weight: f64,
}

impl WeightedCrossEntropy {
    pub fn new(pos_weight: f64) -> Self {
        Self { pos_weight }
    }

    pub fn forward<B: Backend, const D: usize>(
        &self,
        logits: Tensor<B, D>,
        targets: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        let log_weight = targets.clone().mul_scalar(self.pos_weight - 1.0).add_scalar(1.0);
        let softplus_neg = logits.clone().abs().neg().exp().log1p() + relu(logits.clone().neg());
        let per_element = targets.neg().add_scalar(1.0) * logits + log_weight * softplus_neg;
        per_element.mean()
    }
}

/// Foreground wherever the logit is positive.
pub fn predicted_labels<B: Backend, const D: usize>(logits: Tensor<B, D>) -> Tensor<B, D, Bool> {
    logits.greater_elem(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn scalar(t: Tensor<B, 1>) -> f32 {
        t.into_data().to_vec::<f32>().unwrap()[0]
    }

    fn naive(x: f32, z: f32, q: f32) -> f32 {
        let s = 1.0 / (1.0 + (-x).exp());
        -(q * z * s.ln() + (1.0 - z) * (1.0 - s).ln())
    }

    #[test]
    fn matches_naive_formula() {
        let device = Default::default();
        let xs = [-3.0f32, -0.5, 0.0, 0.7, 2.5];
        let zs = [1.0f32, 0.0, 1.0, 0.0, 1.0];
        for q in [1.0f32, 3.0, 0.25] {
            let loss = WeightedCrossEntropy::new(q as f64).forward(
                Tensor::<B, 1>::from_floats(xs, &device),
                Tensor::<B, 1>::from_floats(zs, &device),
            );
            let expected: f32 =
                xs.iter().zip(zs).map(|(&x, z)| naive(x, z, q)).sum::<f32>() / xs.len() as f32;
            assert!((scalar(loss) - expected).abs() < 1e-5, "pos_weight {q}");
        }
    }

    #[test]
    fn stays_finite_for_extreme_logits() {
        let device = Default::default();
        let loss = WeightedCrossEntropy::new(2.0).forward(
            Tensor::<B, 1>::from_floats([-500.0, 500.0], &device),
            Tensor::<B, 1>::from_floats([1.0, 0.0], &device),
        );
        let value = scalar(loss);
        assert!(value.is_finite());
        // 2 * 500 for the positive, 500 for the negative.
        assert!((value - 750.0).abs() < 1e-2);
    }

    #[test]
    fn positive_logits_predict_foreground() {
        let device = Default::default();
        let labels = predicted_labels(Tensor::<B, 1>::from_floats([-1.0, 0.0, 0.5], &device));
        assert_eq!(
            labels.into_data().to_vec::<bool>().unwrap(),
            vec![false, false, true]
        );
    }
}
