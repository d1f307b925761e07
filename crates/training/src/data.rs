//! Host-side image and label arrays fed to the harness.
//!
//! Layouts (row-major):
//! - images: `[count, height, width, depth]`, f32
//! - labels: `[count, height, width]`, bool

use burn::tensor::{backend::Backend, Tensor, TensorData};
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// Input image geometry, batch excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageGeometry {
    pub height: usize,
    pub width: usize,
    pub depth: usize,
}

impl ImageGeometry {
    pub fn new(height: usize, width: usize, depth: usize) -> Self {
        Self {
            height,
            width,
            depth,
        }
    }

    pub fn pixels(&self) -> usize {
        self.height * self.width
    }

    pub fn image_len(&self) -> usize {
        self.pixels() * self.depth
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageArray {
    pub data: Vec<f32>,
    pub count: usize,
    pub geometry: ImageGeometry,
}

impl ImageArray {
    pub fn new(data: Vec<f32>, count: usize, geometry: ImageGeometry) -> HarnessResult<Self> {
        if data.len() != count * geometry.image_len() {
            return Err(HarnessError::ShapeMismatch {
                what: "image buffer",
                expected: vec![count * geometry.image_len()],
                found: vec![data.len()],
            });
        }
        Ok(Self {
            data,
            count,
            geometry,
        })
    }

    pub fn shape(&self) -> [usize; 4] {
        [
            self.count,
            self.geometry.height,
            self.geometry.width,
            self.geometry.depth,
        ]
    }

    pub fn image(&self, index: usize) -> &[f32] {
        let len = self.geometry.image_len();
        &self.data[index * len..(index + 1) * len]
    }

    /// Copy the selected images, in order, into a `[k, h, w, d]` tensor.
    pub fn gather<B: Backend>(&self, indices: &[usize], device: &B::Device) -> HarnessResult<Tensor<B, 4>> {
        let mut buf = Vec::with_capacity(indices.len() * self.geometry.image_len());
        for &index in indices {
            check_index(index, self.count)?;
            buf.extend_from_slice(self.image(index));
        }
        let g = self.geometry;
        Ok(Tensor::from_data(
            TensorData::new(buf, [indices.len(), g.height, g.width, g.depth]),
            device,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelArray {
    pub data: Vec<bool>,
    pub count: usize,
    pub height: usize,
    pub width: usize,
}

impl LabelArray {
    pub fn new(data: Vec<bool>, count: usize, height: usize, width: usize) -> HarnessResult<Self> {
        if data.len() != count * height * width {
            return Err(HarnessError::ShapeMismatch {
                what: "label buffer",
                expected: vec![count * height * width],
                found: vec![data.len()],
            });
        }
        Ok(Self {
            data,
            count,
            height,
            width,
        })
    }

    pub fn shape(&self) -> [usize; 3] {
        [self.count, self.height, self.width]
    }

    pub fn map(&self, index: usize) -> &[bool] {
        let len = self.height * self.width;
        &self.data[index * len..(index + 1) * len]
    }

    /// Selected maps as a `[k, h, w]` float tensor of 0.0 / 1.0 targets.
    pub fn gather<B: Backend>(&self, indices: &[usize], device: &B::Device) -> HarnessResult<Tensor<B, 3>> {
        let mut buf = Vec::with_capacity(indices.len() * self.height * self.width);
        for &index in indices {
            check_index(index, self.count)?;
            buf.extend(self.map(index).iter().map(|&v| if v { 1.0f32 } else { 0.0 }));
        }
        Ok(Tensor::from_data(
            TensorData::new(buf, [indices.len(), self.height, self.width]),
            device,
        ))
    }
}

fn check_index(index: usize, len: usize) -> HarnessResult<()> {
    if index >= len {
        return Err(HarnessError::IndexOutOfRange { index, len });
    }
    Ok(())
}
