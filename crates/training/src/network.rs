//! Default network topology: the recurrent ConvLSTM segmenter.

use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use conv_lstm::{RecurrentSegmenter, RecurrentSegmenterConfig};

use crate::data::ImageGeometry;
use crate::error::HarnessResult;
use crate::harness::{NetworkBuilder, SegmentationNetwork};

impl<B: Backend> SegmentationNetwork<B> for RecurrentSegmenter<B> {
    fn forward(&self, images: Tensor<B, 4>) -> HarnessResult<Tensor<B, 3>> {
        Ok(RecurrentSegmenter::forward(self, images)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmenterBuilder {
    pub config: RecurrentSegmenterConfig,
}

impl SegmenterBuilder {
    pub fn new(config: RecurrentSegmenterConfig) -> Self {
        Self { config }
    }
}

impl<B: AutodiffBackend> NetworkBuilder<B> for SegmenterBuilder {
    type Network = RecurrentSegmenter<B>;

    fn build_network(
        &self,
        geometry: ImageGeometry,
        device: &B::Device,
    ) -> HarnessResult<Self::Network> {
        Ok(self
            .config
            .init(geometry.height, geometry.width, geometry.depth, device)?)
    }
}
