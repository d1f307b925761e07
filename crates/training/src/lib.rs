#![recursion_limit = "256"]

pub mod config;
pub mod data;
pub mod dataset;
pub mod error;
pub mod harness;
pub mod logging;
pub mod loss;
pub mod network;
pub mod schedule;
pub mod snapshot;
pub mod summary;
pub mod util;

pub use config::{HarnessConfig, TrainingConfig};
pub use data::{ImageArray, ImageGeometry, LabelArray};
pub use dataset::{load_dataset, save_masks, Dataset};
pub use error::{HarnessError, HarnessResult};
pub use harness::{
    GraphPlan, ModelHarness, NetworkBuilder, SegmentationNetwork, TrainReport, LOSS_TAG,
};
pub use loss::{predicted_labels, WeightedCrossEntropy};
pub use network::SegmenterBuilder;
pub use snapshot::SnapshotIndex;
pub use summary::{read_summaries, SummaryRecord, SummaryWriter};
pub use util::{run_predict, run_train, PredictArgs, TrainArgs};

/// Backend alias for training/prediction (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
