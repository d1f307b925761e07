//! Convolutional LSTM building blocks for Burn.
//!
//! - `ConvLstmCell`: one recurrence step mixing same-padded convolution with
//!   LSTM gating, over 1-D, 2-D or 3-D channels-last inputs.
//! - `conv_same`: the shared convolution, exposed for heads and custom cells.
//! - `RecurrentSegmenter`: a per-pixel segmentation network stepping the cell
//!   over a single image.
//!
//! These are pure Burn modules; the `training` crate wires them into a
//! train/predict harness.

pub mod cell;
pub mod conv;
pub mod error;
pub mod segmenter;
pub mod spatial;

pub use cell::{CellState, ConvLstmCell, ConvLstmConfig};
pub use conv::conv_same;
pub use error::{CellError, CellResult};
pub use segmenter::{RecurrentSegmenter, RecurrentSegmenterConfig};
pub use spatial::{SpatialRank, SpatialTensor};

pub mod prelude {
    pub use super::{
        CellError, CellState, ConvLstmCell, ConvLstmConfig, RecurrentSegmenter,
        RecurrentSegmenterConfig, SpatialRank, SpatialTensor,
    };
}
