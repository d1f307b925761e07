//! Configuration errors raised while building or running cells.

use thiserror::Error;

pub type CellResult<T> = Result<T, CellError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    #[error("kernel shape must have 1, 2 or 3 dimensions, got {len}")]
    InvalidKernelRank { len: usize },
    #[error("input shape {input_shape:?} does not fit a {spatial_rank}-D kernel (expected {spatial_rank} spatial dims + channels)")]
    InputShapeMismatch {
        input_shape: Vec<usize>,
        spatial_rank: usize,
    },
    #[error("{what} must be positive")]
    ZeroDimension { what: &'static str },
    #[error("conv expects rank 3, 4 or 5 tensors, got rank {rank}")]
    UnsupportedRank { rank: usize },
    #[error("conv expects all inputs to share a rank: expected {expected}, found {found}")]
    RankMismatch { expected: usize, found: usize },
    #[error("conv requires at least one input tensor")]
    NoInputs,
    #[error("channel mismatch: expected {expected}, found {found}")]
    ChannelMismatch { expected: usize, found: usize },
    #[error("state does not match cell: {0}")]
    StateMismatch(String),
}
