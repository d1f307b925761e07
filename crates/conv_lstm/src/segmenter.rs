//! Per-pixel segmentation network built on a 2-D ConvLSTM cell.
//!
//! The cell is stepped `steps` times over the same image, refining its state,
//! and a 1x1 convolution head maps the final output to one logit per pixel.
//!
//! Shapes:
//! - images: `[B, H, W, D]`
//! - logits: `[B, H, W]`

use burn::module::{Module, Param};
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::cell::{ConvLstmCell, ConvLstmConfig};
use crate::conv::{conv_same, init_bias, init_kernel};
use crate::error::{CellError, CellResult};
use crate::spatial::SpatialTensor;

const HEAD_KERNEL: [usize; 2] = [1, 1];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecurrentSegmenterConfig {
    pub hidden_channels: usize,
    /// Square kernel edge for the cell convolution.
    pub kernel_size: usize,
    pub steps: usize,
    pub skip_connection: bool,
    pub forget_bias: f64,
}

impl Default for RecurrentSegmenterConfig {
    fn default() -> Self {
        Self {
            hidden_channels: 8,
            kernel_size: 3,
            steps: 2,
            skip_connection: false,
            forget_bias: 1.0,
        }
    }
}

impl RecurrentSegmenterConfig {
    pub fn init<B: Backend>(
        &self,
        height: usize,
        width: usize,
        depth: usize,
        device: &B::Device,
    ) -> CellResult<RecurrentSegmenter<B>> {
        if self.steps == 0 {
            return Err(CellError::ZeroDimension { what: "steps" });
        }
        let cell = ConvLstmConfig::new(
            vec![height, width, depth],
            self.hidden_channels,
            vec![self.kernel_size, self.kernel_size],
        )
        .with_skip_connection(self.skip_connection)
        .with_forget_bias(self.forget_bias)
        .with_name("segmenter_cell")
        .init(device)?;

        let head_kernel = init_kernel(&HEAD_KERNEL, cell.output_size(), 1, device);
        let head_bias = init_bias(1, 0.0, device);
        Ok(RecurrentSegmenter {
            cell,
            head_kernel,
            head_bias,
            steps: self.steps,
        })
    }
}

#[derive(Module, Debug)]
pub struct RecurrentSegmenter<B: Backend> {
    cell: ConvLstmCell<B>,
    head_kernel: Param<Tensor<B, 2>>,
    head_bias: Param<Tensor<B, 1>>,
    steps: usize,
}

impl<B: Backend> RecurrentSegmenter<B> {
    pub fn cell(&self) -> &ConvLstmCell<B> {
        &self.cell
    }

    /// Per-pixel logits; positive means foreground.
    pub fn forward(&self, images: Tensor<B, 4>) -> CellResult<Tensor<B, 3>> {
        let [batch, height, width, _] = images.dims();
        let device = images.device();
        let input = SpatialTensor::Plane(images);

        let mut state = self.cell.zero_state(batch, &device);
        let mut output = state.hidden.clone();
        for _ in 0..self.steps {
            let (step_output, next) = self.cell.forward(input.clone(), state)?;
            output = step_output;
            state = next;
        }

        let logits = conv_same(
            vec![output],
            &HEAD_KERNEL,
            self.head_kernel.val(),
            Some(self.head_bias.val()),
        )?;
        let found = logits.rank();
        let logits = logits
            .into_plane()
            .ok_or(CellError::RankMismatch { expected: 4, found })?;
        Ok(logits.reshape([batch, height, width]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn forward_produces_one_logit_per_pixel() {
        let device = Default::default();
        let model = RecurrentSegmenterConfig::default()
            .init::<B>(6, 5, 3, &device)
            .unwrap();
        let images = Tensor::<B, 4>::ones([2, 6, 5, 3], &device);
        let logits = model.forward(images).unwrap();
        assert_eq!(logits.dims(), [2, 6, 5]);
    }

    #[test]
    fn skip_connection_widens_head_input() {
        let device = Default::default();
        let cfg = RecurrentSegmenterConfig {
            skip_connection: true,
            hidden_channels: 4,
            ..Default::default()
        };
        let model = cfg.init::<B>(4, 4, 3, &device).unwrap();
        assert_eq!(model.cell().output_size(), 7);
        let logits = model
            .forward(Tensor::<B, 4>::zeros([1, 4, 4, 3], &device))
            .unwrap();
        assert_eq!(logits.dims(), [1, 4, 4]);
    }

    #[test]
    fn zero_steps_rejected() {
        let cfg = RecurrentSegmenterConfig {
            steps: 0,
            ..Default::default()
        };
        let err = cfg.init::<B>(4, 4, 1, &Default::default()).unwrap_err();
        assert_eq!(err, CellError::ZeroDimension { what: "steps" });
    }
}
