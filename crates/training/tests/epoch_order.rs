mod common;

use std::sync::{Arc, Mutex};

use burn::module::{Ignored, Module, Param};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use common::harness_config;
use training::{
    HarnessError, HarnessResult, ImageArray, ImageGeometry, LabelArray, ModelHarness,
    NetworkBuilder, SegmentationNetwork,
};

type Seen = Arc<Mutex<Vec<usize>>>;

/// Scales its input; records the sample id stored in each image's only pixel.
#[derive(Module, Debug)]
struct RecordingNetwork<B: Backend> {
    scale: Param<Tensor<B, 1>>,
    seen: Ignored<Seen>,
}

impl<B: Backend> SegmentationNetwork<B> for RecordingNetwork<B> {
    fn forward(&self, images: Tensor<B, 4>) -> HarnessResult<Tensor<B, 3>> {
        let [batch, height, width, _] = images.dims();
        let ids = images
            .clone()
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| HarnessError::Data(format!("{e:?}")))?;
        self.seen
            .0
            .lock()
            .unwrap()
            .extend(ids.into_iter().map(|v| v as usize));
        Ok(images.reshape([batch, height, width]) * self.scale.val().reshape([1, 1, 1]))
    }
}

struct RecordingBuilder {
    seen: Seen,
}

impl<A: AutodiffBackend> NetworkBuilder<A> for RecordingBuilder {
    type Network = RecordingNetwork<A>;

    fn build_network(
        &self,
        _geometry: ImageGeometry,
        device: &A::Device,
    ) -> HarnessResult<Self::Network> {
        Ok(RecordingNetwork {
            scale: Param::from_tensor(Tensor::ones([1], device)),
            seen: Ignored(self.seen.clone()),
        })
    }
}

const COUNT: usize = 8;

fn id_images() -> (ImageArray, LabelArray) {
    let geometry = ImageGeometry::new(1, 1, 1);
    let images = ImageArray::new((0..COUNT).map(|i| i as f32).collect(), COUNT, geometry).unwrap();
    let labels = LabelArray::new((0..COUNT).map(|i| i % 2 == 0).collect(), COUNT, 1, 1).unwrap();
    (images, labels)
}

fn drain(seen: &Seen) -> Vec<usize> {
    std::mem::take(&mut *seen.lock().unwrap())
}

#[test]
fn seeded_calls_keep_drawing_fresh_permutations() {
    let logs = tempfile::tempdir().unwrap();
    let seen: Seen = Arc::default();
    let mut config = harness_config(logs.path());
    config.height = 1;
    config.width = 1;
    config.depth = 1;
    config.seed = Some(5);
    let mut harness: ModelHarness<common::B, RecordingBuilder> = ModelHarness::new(
        config,
        RecordingBuilder { seen: seen.clone() },
        Default::default(),
    );
    harness.configure().unwrap();
    harness.reset().unwrap();
    let (images, labels) = id_images();

    harness.train(&images, &labels, None, Some(1), Some(1)).unwrap();
    let first = drain(&seen);
    harness.train(&images, &labels, None, Some(1), Some(1)).unwrap();
    let second = drain(&seen);

    for order in [&first, &second] {
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..COUNT).collect::<Vec<_>>());
    }
    assert_ne!(first, second);

    // Reset reseeds the shuffle, so the sequence replays.
    harness.reset().unwrap();
    harness.train(&images, &labels, None, Some(1), Some(1)).unwrap();
    assert_eq!(drain(&seen), first);
}
