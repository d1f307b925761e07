//! Rank-erased, channels-last tensors for 1-D, 2-D and 3-D convolutions.
//!
//! Layouts:
//! - `Line`: `[batch, x, channels]`
//! - `Plane`: `[batch, h, w, channels]`
//! - `Volume`: `[batch, d, h, w, channels]`

use burn::tensor::activation::sigmoid;
use burn::tensor::{backend::Backend, Tensor, TensorData};
use serde::{Deserialize, Serialize};

use crate::error::{CellError, CellResult};

/// Number of spatial axes a convolution runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpatialRank {
    One,
    Two,
    Three,
}

impl SpatialRank {
    pub fn from_kernel_len(len: usize) -> CellResult<Self> {
        match len {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            _ => Err(CellError::InvalidKernelRank { len }),
        }
    }

    pub fn from_tensor_rank(rank: usize) -> CellResult<Self> {
        match rank {
            3 => Ok(Self::One),
            4 => Ok(Self::Two),
            5 => Ok(Self::Three),
            _ => Err(CellError::UnsupportedRank { rank }),
        }
    }

    pub fn dims(self) -> usize {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    /// Full tensor rank including batch and channel axes.
    pub fn tensor_rank(self) -> usize {
        self.dims() + 2
    }
}

#[derive(Debug, Clone)]
pub enum SpatialTensor<B: Backend> {
    Line(Tensor<B, 3>),
    Plane(Tensor<B, 4>),
    Volume(Tensor<B, 5>),
}

macro_rules! map_spatial {
    ($value:expr, |$t:ident| $body:expr) => {
        match $value {
            SpatialTensor::Line($t) => SpatialTensor::Line($body),
            SpatialTensor::Plane($t) => SpatialTensor::Plane($body),
            SpatialTensor::Volume($t) => SpatialTensor::Volume($body),
        }
    };
}

macro_rules! zip_spatial {
    ($lhs:expr, $rhs:expr, |$a:ident, $b:ident| $body:expr) => {
        match ($lhs, $rhs) {
            (SpatialTensor::Line($a), SpatialTensor::Line($b)) => Ok(SpatialTensor::Line($body)),
            (SpatialTensor::Plane($a), SpatialTensor::Plane($b)) => Ok(SpatialTensor::Plane($body)),
            (SpatialTensor::Volume($a), SpatialTensor::Volume($b)) => {
                Ok(SpatialTensor::Volume($body))
            }
            (lhs, rhs) => Err(CellError::RankMismatch {
                expected: lhs.rank(),
                found: rhs.rank(),
            }),
        }
    };
}

impl<B: Backend> SpatialTensor<B> {
    /// Wrap raw data, picking the layout from its rank.
    pub fn from_data(data: TensorData, device: &B::Device) -> CellResult<Self> {
        Ok(match SpatialRank::from_tensor_rank(data.shape.len())? {
            SpatialRank::One => Self::Line(Tensor::from_data(data, device)),
            SpatialRank::Two => Self::Plane(Tensor::from_data(data, device)),
            SpatialRank::Three => Self::Volume(Tensor::from_data(data, device)),
        })
    }

    pub fn zeros(shape: &[usize], device: &B::Device) -> CellResult<Self> {
        Ok(match SpatialRank::from_tensor_rank(shape.len())? {
            SpatialRank::One => Self::Line(Tensor::zeros([shape[0], shape[1], shape[2]], device)),
            SpatialRank::Two => Self::Plane(Tensor::zeros(
                [shape[0], shape[1], shape[2], shape[3]],
                device,
            )),
            SpatialRank::Three => Self::Volume(Tensor::zeros(
                [shape[0], shape[1], shape[2], shape[3], shape[4]],
                device,
            )),
        })
    }

    pub fn spatial_rank(&self) -> SpatialRank {
        match self {
            Self::Line(_) => SpatialRank::One,
            Self::Plane(_) => SpatialRank::Two,
            Self::Volume(_) => SpatialRank::Three,
        }
    }

    pub fn rank(&self) -> usize {
        self.spatial_rank().tensor_rank()
    }

    pub fn dims(&self) -> Vec<usize> {
        match self {
            Self::Line(t) => t.dims().to_vec(),
            Self::Plane(t) => t.dims().to_vec(),
            Self::Volume(t) => t.dims().to_vec(),
        }
    }

    pub fn channels(&self) -> usize {
        self.dims().last().copied().unwrap_or(0)
    }

    pub fn device(&self) -> B::Device {
        match self {
            Self::Line(t) => t.device(),
            Self::Plane(t) => t.device(),
            Self::Volume(t) => t.device(),
        }
    }

    pub fn into_data(self) -> TensorData {
        match self {
            Self::Line(t) => t.into_data(),
            Self::Plane(t) => t.into_data(),
            Self::Volume(t) => t.into_data(),
        }
    }

    pub fn sigmoid(self) -> Self {
        map_spatial!(self, |t| sigmoid(t))
    }

    pub fn tanh(self) -> Self {
        map_spatial!(self, |t| t.tanh())
    }

    pub fn add_scalar(self, value: f64) -> Self {
        map_spatial!(self, |t| t.add_scalar(value))
    }

    pub fn add(self, other: Self) -> CellResult<Self> {
        zip_spatial!(self, other, |a, b| a + b)
    }

    pub fn mul(self, other: Self) -> CellResult<Self> {
        zip_spatial!(self, other, |a, b| a * b)
    }

    /// Keep `len` channels starting at `start`.
    pub fn narrow_channels(self, start: usize, len: usize) -> Self {
        let axis = self.rank() - 1;
        map_spatial!(self, |t| t.narrow(axis, start, len))
    }

    /// Split into `parts` equal slices along the channel axis, in order.
    pub fn chunk_channels(self, parts: usize) -> Vec<Self> {
        let axis = self.rank() - 1;
        match self {
            Self::Line(t) => t.chunk(parts, axis).into_iter().map(Self::Line).collect(),
            Self::Plane(t) => t.chunk(parts, axis).into_iter().map(Self::Plane).collect(),
            Self::Volume(t) => t.chunk(parts, axis).into_iter().map(Self::Volume).collect(),
        }
    }

    /// Concatenate along the channel axis. All parts must share a rank.
    pub fn concat_channels(parts: Vec<Self>) -> CellResult<Self> {
        let first = parts.first().ok_or(CellError::NoInputs)?;
        let spatial = first.spatial_rank();
        let expected = spatial.tensor_rank();
        if let Some(odd) = parts.iter().find(|part| part.rank() != expected) {
            return Err(CellError::RankMismatch {
                expected,
                found: odd.rank(),
            });
        }
        if parts.len() == 1 {
            return parts.into_iter().next().ok_or(CellError::NoInputs);
        }

        let axis = expected - 1;
        Ok(match spatial {
            SpatialRank::One => Self::Line(Tensor::cat(
                parts.into_iter().filter_map(Self::into_line).collect(),
                axis,
            )),
            SpatialRank::Two => Self::Plane(Tensor::cat(
                parts.into_iter().filter_map(Self::into_plane).collect(),
                axis,
            )),
            SpatialRank::Three => Self::Volume(Tensor::cat(
                parts.into_iter().filter_map(Self::into_volume).collect(),
                axis,
            )),
        })
    }

    pub fn into_line(self) -> Option<Tensor<B, 3>> {
        match self {
            Self::Line(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_plane(self) -> Option<Tensor<B, 4>> {
        match self {
            Self::Plane(t) => Some(t),
            _ => None,
        }
    }

    pub fn into_volume(self) -> Option<Tensor<B, 5>> {
        match self {
            Self::Volume(t) => Some(t),
            _ => None,
        }
    }
}
