//! Convolutional LSTM cell (Shi et al., <https://arxiv.org/abs/1506.04214>).
//!
//! Shapes (channels-last, batch first):
//! - input: `[B, *spatial, input_channels]`
//! - state: `(cell, hidden)`, each `[B, *spatial, output_size]`
//! - output: `[B, *spatial, output_size]`
//!
//! `output_size` is `output_channels`, plus `input_channels` when the skip
//! connection is enabled. Convolutions always run with stride 1, so a skip
//! connection never needs resampling.

use burn::module::{Ignored, Module, Param};
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::conv::{conv_same, init_bias, init_kernel};
use crate::error::{CellError, CellResult};
use crate::spatial::{SpatialRank, SpatialTensor};

/// Number of gate pre-activations produced by the shared convolution.
const GATES: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvLstmConfig {
    /// Spatial dims followed by the channel count, batch excluded.
    pub input_shape: Vec<usize>,
    pub output_channels: usize,
    /// One entry per spatial axis (1, 2 or 3).
    pub kernel_shape: Vec<usize>,
    pub use_bias: bool,
    /// Concatenate the raw input onto the gated output.
    pub skip_connection: bool,
    /// Added to the forget gate before the sigmoid; not learned.
    pub forget_bias: f64,
    pub name: String,
}

impl ConvLstmConfig {
    pub fn new(input_shape: Vec<usize>, output_channels: usize, kernel_shape: Vec<usize>) -> Self {
        Self {
            input_shape,
            output_channels,
            kernel_shape,
            use_bias: true,
            skip_connection: false,
            forget_bias: 1.0,
            name: "conv_lstm_cell".to_string(),
        }
    }

    pub fn with_use_bias(mut self, use_bias: bool) -> Self {
        self.use_bias = use_bias;
        self
    }

    pub fn with_skip_connection(mut self, skip_connection: bool) -> Self {
        self.skip_connection = skip_connection;
        self
    }

    pub fn with_forget_bias(mut self, forget_bias: f64) -> Self {
        self.forget_bias = forget_bias;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Check the configuration and return the convolution dimensionality it selects.
    pub fn validate(&self) -> CellResult<SpatialRank> {
        let rank = SpatialRank::from_kernel_len(self.kernel_shape.len())?;
        if self.input_shape.len() != rank.dims() + 1 {
            return Err(CellError::InputShapeMismatch {
                input_shape: self.input_shape.clone(),
                spatial_rank: rank.dims(),
            });
        }
        if self.input_shape.contains(&0) {
            return Err(CellError::ZeroDimension {
                what: "input shape",
            });
        }
        if self.kernel_shape.contains(&0) {
            return Err(CellError::ZeroDimension {
                what: "kernel size",
            });
        }
        if self.output_channels == 0 {
            return Err(CellError::ZeroDimension {
                what: "output channels",
            });
        }
        Ok(rank)
    }

    pub fn input_channels(&self) -> usize {
        self.input_shape.last().copied().unwrap_or(0)
    }

    /// Channel count of the output and hidden state.
    pub fn output_size(&self) -> usize {
        if self.skip_connection {
            self.output_channels + self.input_channels()
        } else {
            self.output_channels
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> CellResult<ConvLstmCell<B>> {
        let rank = self.validate()?;
        let depth = self.input_channels() + self.output_size();
        let gate_channels = GATES * self.output_channels;
        let kernel = init_kernel(&self.kernel_shape, depth, gate_channels, device);
        let bias = self
            .use_bias
            .then(|| init_bias(gate_channels, 0.0, device));

        Ok(ConvLstmCell {
            kernel,
            bias,
            rank: Ignored(rank),
            config: Ignored(self.clone()),
        })
    }
}

/// Memory and hidden tensors carried between steps.
#[derive(Debug, Clone)]
pub struct CellState<B: Backend> {
    pub cell: SpatialTensor<B>,
    pub hidden: SpatialTensor<B>,
}

#[derive(Module, Debug)]
pub struct ConvLstmCell<B: Backend> {
    kernel: Param<Tensor<B, 2>>,
    bias: Option<Param<Tensor<B, 1>>>,
    rank: Ignored<SpatialRank>,
    pub config: Ignored<ConvLstmConfig>,
}

impl<B: Backend> ConvLstmCell<B> {
    pub fn spatial_rank(&self) -> SpatialRank {
        self.rank.0
    }

    pub fn output_size(&self) -> usize {
        self.config.0.output_size()
    }

    /// Zero-filled state for `batch` sequences.
    pub fn zero_state(&self, batch: usize, device: &B::Device) -> CellState<B> {
        // input_shape length matches the rank, checked in `ConvLstmConfig::validate`.
        let s = &self.config.0.input_shape;
        let c = self.output_size();
        let zeros = || match self.rank.0 {
            SpatialRank::One => SpatialTensor::Line(Tensor::zeros([batch, s[0], c], device)),
            SpatialRank::Two => {
                SpatialTensor::Plane(Tensor::zeros([batch, s[0], s[1], c], device))
            }
            SpatialRank::Three => {
                SpatialTensor::Volume(Tensor::zeros([batch, s[0], s[1], s[2], c], device))
            }
        };
        CellState {
            cell: zeros(),
            hidden: zeros(),
        }
    }

    /// One recurrence step. Returns `(output, new_state)`; the new hidden state is the output.
    pub fn forward(
        &self,
        input: SpatialTensor<B>,
        state: CellState<B>,
    ) -> CellResult<(SpatialTensor<B>, CellState<B>)> {
        let config = &self.config.0;
        let out = config.output_channels;
        self.check_state(&input, &state)?;

        let CellState { cell, hidden } = state;
        let cell = if cell.channels() > out {
            cell.narrow_channels(0, out)
        } else {
            cell
        };

        let gates = conv_same(
            vec![input.clone(), hidden],
            &config.kernel_shape,
            self.kernel.val(),
            self.bias.as_ref().map(|b| b.val()),
        )?;
        let mut gates = gates.chunk_channels(GATES).into_iter();
        let (Some(input_gate), Some(new_input), Some(forget_gate), Some(output_gate)) =
            (gates.next(), gates.next(), gates.next(), gates.next())
        else {
            return Err(CellError::ChannelMismatch {
                expected: GATES * out,
                found: 0,
            });
        };

        let retained = forget_gate
            .add_scalar(config.forget_bias)
            .sigmoid()
            .mul(cell)?;
        let admitted = input_gate.sigmoid().mul(new_input.tanh())?;
        let new_cell = retained.add(admitted)?;

        let mut output = new_cell.clone().tanh().mul(output_gate.sigmoid())?;
        if config.skip_connection {
            output = SpatialTensor::concat_channels(vec![output, input])?;
        }

        let state = CellState {
            cell: new_cell,
            hidden: output.clone(),
        };
        Ok((output, state))
    }

    fn check_state(&self, input: &SpatialTensor<B>, state: &CellState<B>) -> CellResult<()> {
        let config = &self.config.0;
        let expected = self.rank.0.tensor_rank();
        for found in [input.rank(), state.cell.rank(), state.hidden.rank()] {
            if found != expected {
                return Err(CellError::RankMismatch { expected, found });
            }
        }
        if input.channels() != config.input_channels() {
            return Err(CellError::ChannelMismatch {
                expected: config.input_channels(),
                found: input.channels(),
            });
        }

        let input_dims = input.dims();
        let leading = &input_dims[..input_dims.len() - 1];
        for (name, tensor) in [("cell", &state.cell), ("hidden", &state.hidden)] {
            let dims = tensor.dims();
            if &dims[..dims.len() - 1] != leading {
                return Err(CellError::StateMismatch(format!(
                    "{name} dims {dims:?} do not match input dims {input_dims:?}"
                )));
            }
        }
        if state.hidden.channels() != self.output_size() {
            return Err(CellError::StateMismatch(format!(
                "hidden has {} channels, cell emits {}",
                state.hidden.channels(),
                self.output_size()
            )));
        }
        if state.cell.channels() < config.output_channels {
            return Err(CellError::StateMismatch(format!(
                "cell memory has {} channels, needs at least {}",
                state.cell.channels(),
                config.output_channels
            )));
        }
        Ok(())
    }
}
