#![allow(dead_code)]

use std::path::Path;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use conv_lstm::RecurrentSegmenterConfig;
use training::{HarnessConfig, ImageArray, ImageGeometry, LabelArray, ModelHarness, SegmenterBuilder};

pub type B = Autodiff<NdArray<f32>>;
pub type Harness = ModelHarness<B, SegmenterBuilder>;

pub const GEOMETRY: ImageGeometry = ImageGeometry {
    height: 4,
    width: 5,
    depth: 2,
};

pub fn harness_config(log_dir: &Path) -> HarnessConfig {
    HarnessConfig {
        height: GEOMETRY.height,
        width: GEOMETRY.width,
        depth: GEOMETRY.depth,
        pos_weight: 2.0,
        rate: 1e-2,
        batch_size: 2,
        epochs: 1,
        log_path: log_dir.to_path_buf(),
        seed: Some(5),
        ..Default::default()
    }
}

pub fn small_network(hidden_channels: usize) -> RecurrentSegmenterConfig {
    RecurrentSegmenterConfig {
        hidden_channels,
        kernel_size: 3,
        steps: 2,
        ..Default::default()
    }
}

pub fn ready_harness(log_dir: &Path, hidden_channels: usize) -> Harness {
    let mut harness = ModelHarness::new(
        harness_config(log_dir),
        SegmenterBuilder::new(small_network(hidden_channels)),
        Default::default(),
    );
    harness.configure().unwrap();
    harness.reset().unwrap();
    harness
}

/// Images whose first channel is bright exactly where the mask is set.
pub fn synthetic(count: usize) -> (ImageArray, LabelArray) {
    let g = GEOMETRY;
    let mut images = Vec::with_capacity(count * g.image_len());
    let mut labels = Vec::with_capacity(count * g.pixels());
    for n in 0..count {
        for y in 0..g.height {
            for x in 0..g.width {
                let on = (x + y + n) % 3 == 0;
                images.push(if on { 1.0 } else { 0.0 });
                images.push(0.25 * n as f32);
                labels.push(on);
            }
        }
    }
    (
        ImageArray::new(images, count, g).unwrap(),
        LabelArray::new(labels, count, g.height, g.width).unwrap(),
    )
}
