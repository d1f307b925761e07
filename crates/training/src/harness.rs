//! Train/predict harness around a pluggable segmentation network.
//!
//! Lifecycle:
//! 1. `configure()` fixes the static plan: image geometry, loss, optimizer settings.
//! 2. `reset()` builds fresh parameters, optimizer state and step counter for that plan.
//!
//! `train`, `predict`, `save` and `load` refuse to run until both phases have
//! completed. Calls take `&mut self` where they mutate state, so a harness
//! serves one operation at a time.

use std::fs;
use std::path::Path;

use burn::module::{AutodiffModule, Module};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::record::Recorder;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::Tensor;
use rand::rngs::StdRng;

use crate::config::HarnessConfig;
use crate::data::{ImageArray, ImageGeometry, LabelArray};
use crate::error::{HarnessError, HarnessResult};
use crate::loss::{predicted_labels, WeightedCrossEntropy};
use crate::schedule::{shuffle_rng, EpochSchedule};
use crate::snapshot::{self, SnapshotIndex};
use crate::summary::SummaryWriter;

/// Summary tag for the per-batch mean loss.
pub const LOSS_TAG: &str = "x_entropy_mean";
const LOG_EVERY_BATCHES: usize = 10;

/// Maps a batch of images `[B, H, W, D]` to per-pixel logits `[B, H, W]`.
pub trait SegmentationNetwork<B: Backend> {
    fn forward(&self, images: Tensor<B, 4>) -> HarnessResult<Tensor<B, 3>>;
}

/// Supplies the network topology; everything else is fixed by the harness.
pub trait NetworkBuilder<B: AutodiffBackend> {
    type Network: AutodiffModule<B> + SegmentationNetwork<B>;

    /// Build a network with freshly initialised parameters.
    fn build_network(
        &self,
        geometry: ImageGeometry,
        device: &B::Device,
    ) -> HarnessResult<Self::Network>;
}

/// Static part of the model, produced by `configure()`.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphPlan {
    pub geometry: ImageGeometry,
    pub loss: WeightedCrossEntropy,
    pub rate: f64,
    pub epsilon: f32,
}

type AdamOptimizer<B, M> = OptimizerAdaptor<Adam, M, B>;

/// Realized parameters, optimizer moments, shuffle RNG and the global step,
/// produced by `reset()`.
struct ExecutionState<B: AutodiffBackend, M: AutodiffModule<B>> {
    network: M,
    optimizer: AdamOptimizer<B, M>,
    rng: StdRng,
    step: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainReport {
    pub epochs: usize,
    pub batches: usize,
    pub final_step: u64,
    /// Mean batch loss over the last epoch; `None` when no batch ran.
    pub last_epoch_loss: Option<f32>,
}

pub struct ModelHarness<B: AutodiffBackend, N: NetworkBuilder<B>> {
    config: HarnessConfig,
    builder: N,
    device: B::Device,
    plan: Option<GraphPlan>,
    state: Option<ExecutionState<B, N::Network>>,
}

impl<B, N> ModelHarness<B, N>
where
    B: AutodiffBackend,
    N: NetworkBuilder<B>,
    <N::Network as AutodiffModule<B>>::InnerModule: SegmentationNetwork<B::InnerBackend>,
{
    pub fn new(config: HarnessConfig, builder: N, device: B::Device) -> Self {
        Self {
            config,
            builder,
            device,
            plan: None,
            state: None,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn plan(&self) -> Option<&GraphPlan> {
        self.plan.as_ref()
    }

    /// True once both `configure()` and `reset()` have run.
    pub fn is_ready(&self) -> bool {
        self.plan.is_some() && self.state.is_some()
    }

    pub fn step(&self) -> HarnessResult<u64> {
        Ok(self.ready()?.1.step)
    }

    pub fn network(&self) -> HarnessResult<&N::Network> {
        Ok(&self.ready()?.1.network)
    }

    /// Build the static plan. Calling it again keeps the existing plan.
    pub fn configure(&mut self) -> HarnessResult<&GraphPlan> {
        if self.plan.is_none() {
            self.config.validate()?;
            let plan = GraphPlan {
                geometry: self.config.geometry(),
                loss: WeightedCrossEntropy::new(self.config.pos_weight),
                rate: self.config.rate,
                epsilon: self.config.epsilon,
            };
            log::debug!("configured harness: {plan:?}");
            self.plan = Some(plan);
        }
        self.plan.as_ref().ok_or(HarnessError::NotConfigured)
    }

    /// Discard any realized parameters and start from fresh initial values.
    pub fn reset(&mut self) -> HarnessResult<()> {
        let plan = self.plan.as_ref().ok_or(HarnessError::NotConfigured)?;
        if let Some(seed) = self.config.seed {
            B::seed(seed);
        }
        self.state = None;

        let network = self.builder.build_network(plan.geometry, &self.device)?;
        let optimizer = AdamConfig::new().with_epsilon(plan.epsilon).init();
        log::debug!(
            "execution state reset with {} parameters",
            network.num_params()
        );
        self.state = Some(ExecutionState {
            network,
            optimizer,
            rng: shuffle_rng(self.config.seed),
            step: 0,
        });
        Ok(())
    }

    /// Train over `indices` (all samples by default) with one optimizer step per batch.
    ///
    /// The index set is reshuffled at the start of every epoch. Any error aborts
    /// the call; parameter updates from completed batches are kept.
    pub fn train(
        &mut self,
        images: &ImageArray,
        labels: &LabelArray,
        indices: Option<&[usize]>,
        epochs: Option<usize>,
        batch_size: Option<usize>,
    ) -> HarnessResult<TrainReport> {
        let plan = self.plan.clone().ok_or(HarnessError::NotConfigured)?;
        let state = self.state.as_mut().ok_or(HarnessError::NotReady)?;
        check_images(&plan.geometry, images)?;
        check_labels(&plan.geometry, images.count, labels)?;

        let indices = select_indices(indices, images.count)?;
        let epochs = epochs.unwrap_or(self.config.epochs);
        let batch_size = batch_size.unwrap_or(self.config.batch_size);
        if batch_size == 0 {
            return Err(HarnessError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }

        let mut writer = SummaryWriter::create(&self.config.log_path)?;
        let mut schedule = EpochSchedule::new(indices, batch_size, &mut state.rng);
        log::info!(
            "training on {} samples for {epochs} epochs ({} batches of up to {batch_size})",
            schedule.len(),
            schedule.batches_per_epoch()
        );

        let mut report = TrainReport::default();
        for epoch in 0..epochs {
            log::info!("epoch {}/{epochs}", epoch + 1);
            let mut losses = Vec::with_capacity(schedule.batches_per_epoch());

            for (i, batch) in schedule.next_epoch().iter().enumerate() {
                let inputs = images.gather::<B>(batch, &self.device)?;
                let targets = labels.gather::<B>(batch, &self.device)?;
                let logits = state.network.forward(inputs)?;
                if logits.dims() != targets.dims() {
                    return Err(HarnessError::ShapeMismatch {
                        what: "logits",
                        expected: targets.dims().to_vec(),
                        found: logits.dims().to_vec(),
                    });
                }

                let loss = plan.loss.forward(logits, targets);
                let loss_value = scalar(loss.clone().detach())?;
                let grads = GradientsParams::from_grads(loss.backward(), &state.network);
                state.network = state
                    .optimizer
                    .step(plan.rate, state.network.clone(), grads);
                state.step += 1;

                writer.add_scalar(LOSS_TAG, loss_value, state.step)?;
                if (i + 1) % LOG_EVERY_BATCHES == 0 {
                    log::info!("batch {}: loss={loss_value:.4}", i + 1);
                }
                losses.push(loss_value);
            }

            report.batches += losses.len();
            report.last_epoch_loss = if losses.is_empty() {
                None
            } else {
                Some(losses.iter().sum::<f32>() / losses.len() as f32)
            };
            if let Some(avg) = report.last_epoch_loss {
                log::info!("epoch {}: avg loss {avg:.4}", epoch + 1);
            }
            report.epochs += 1;
        }
        report.final_step = state.step;
        writer.close()?;
        Ok(report)
    }

    /// Threshold each selected image's logits at zero, one image at a time.
    ///
    /// Returns `[indices.len(), height, width]` labels in the order of `indices`.
    pub fn predict(
        &self,
        images: &ImageArray,
        indices: Option<&[usize]>,
    ) -> HarnessResult<LabelArray> {
        let (plan, state) = self.ready()?;
        check_images(&plan.geometry, images)?;
        let indices = select_indices(indices, images.count)?;
        let g = plan.geometry;

        let network = state.network.valid();
        let mut data = Vec::with_capacity(indices.len() * g.pixels());
        log::info!("predicting {} images", indices.len());
        for &index in &indices {
            let image = images.gather::<B::InnerBackend>(&[index], &self.device)?;
            let logits = network.forward(image)?;
            if logits.dims() != [1, g.height, g.width] {
                return Err(HarnessError::ShapeMismatch {
                    what: "logits",
                    expected: vec![1, g.height, g.width],
                    found: logits.dims().to_vec(),
                });
            }
            let labels = predicted_labels(logits)
                .into_data()
                .to_vec::<bool>()
                .map_err(|e| HarnessError::Data(format!("{e:?}")))?;
            data.extend(labels);
        }
        LabelArray::new(data, indices.len(), g.height, g.width)
    }

    /// Write network parameters, optimizer moments and the index into `dir`.
    pub fn save(&self, dir: &Path) -> HarnessResult<()> {
        let (plan, state) = self.ready()?;
        fs::create_dir_all(dir).map_err(|e| HarnessError::io(dir, e))?;
        let recorder = snapshot::recorder();

        let model_path = snapshot::model_path(dir);
        state
            .network
            .clone()
            .save_file(model_path.clone(), &recorder)
            .map_err(|e| HarnessError::record(&model_path, e))?;

        let optimizer_path = snapshot::optimizer_path(dir);
        Recorder::<B>::record(&recorder, state.optimizer.to_record(), optimizer_path.clone())
            .map_err(|e| HarnessError::record(&optimizer_path, e))?;

        snapshot::write_index(
            dir,
            &SnapshotIndex {
                step: state.step,
                geometry: plan.geometry,
                parameters: snapshot::parameter_shapes(&state.network),
            },
        )?;
        log::info!("saved snapshot at step {} to {}", state.step, dir.display());
        Ok(())
    }

    /// Replace parameters, optimizer moments and step with a snapshot from `dir`.
    ///
    /// Every stored parameter shape must equal the current network's.
    pub fn load(&mut self, dir: &Path) -> HarnessResult<()> {
        let epsilon = self.plan.as_ref().ok_or(HarnessError::NotConfigured)?.epsilon;
        let state = self.state.as_mut().ok_or(HarnessError::NotReady)?;
        let expected = snapshot::parameter_shapes(&state.network);
        let index = snapshot::read_index(dir)?;
        snapshot::check_shapes(&expected, &index.parameters)?;

        let recorder = snapshot::recorder();
        let model_path = snapshot::model_path(dir);
        let network = state
            .network
            .clone()
            .load_file(model_path.clone(), &recorder, &self.device)
            .map_err(|e| HarnessError::record(&model_path, e))?;
        snapshot::check_shapes(&expected, &snapshot::parameter_shapes(&network))?;

        let optimizer_path = snapshot::optimizer_path(dir);
        let record = Recorder::<B>::load(&recorder, optimizer_path.clone(), &self.device)
            .map_err(|e| HarnessError::record(&optimizer_path, e))?;
        let optimizer = AdamConfig::new().with_epsilon(epsilon).init().load_record(record);

        state.network = network;
        state.optimizer = optimizer;
        state.step = index.step;
        log::info!("loaded snapshot at step {} from {}", index.step, dir.display());
        Ok(())
    }

    fn ready(&self) -> HarnessResult<(&GraphPlan, &ExecutionState<B, N::Network>)> {
        let plan = self.plan.as_ref().ok_or(HarnessError::NotConfigured)?;
        let state = self.state.as_ref().ok_or(HarnessError::NotReady)?;
        Ok((plan, state))
    }
}

fn check_images(geometry: &ImageGeometry, images: &ImageArray) -> HarnessResult<()> {
    if images.geometry != *geometry {
        return Err(HarnessError::ShapeMismatch {
            what: "images",
            expected: vec![images.count, geometry.height, geometry.width, geometry.depth],
            found: images.shape().to_vec(),
        });
    }
    Ok(())
}

fn check_labels(geometry: &ImageGeometry, count: usize, labels: &LabelArray) -> HarnessResult<()> {
    let expected = [count, geometry.height, geometry.width];
    if labels.shape() != expected {
        return Err(HarnessError::ShapeMismatch {
            what: "labels",
            expected: expected.to_vec(),
            found: labels.shape().to_vec(),
        });
    }
    Ok(())
}

fn select_indices(indices: Option<&[usize]>, count: usize) -> HarnessResult<Vec<usize>> {
    match indices {
        None => Ok((0..count).collect()),
        Some(indices) => {
            if let Some(&index) = indices.iter().find(|&&i| i >= count) {
                return Err(HarnessError::IndexOutOfRange { index, len: count });
            }
            Ok(indices.to_vec())
        }
    }
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> HarnessResult<f32> {
    tensor
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| HarnessError::Data(format!("{e:?}")))?
        .first()
        .copied()
        .ok_or_else(|| HarnessError::Data("empty loss tensor".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_indices_defaults_to_all() {
        assert_eq!(select_indices(None, 3).unwrap(), vec![0, 1, 2]);
        assert_eq!(select_indices(Some(&[2, 0]), 3).unwrap(), vec![2, 0]);
        assert!(matches!(
            select_indices(Some(&[3]), 3),
            Err(HarnessError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn label_shape_must_follow_images() {
        let geometry = ImageGeometry::new(2, 2, 1);
        let labels = LabelArray::new(vec![false; 4], 1, 2, 2).unwrap();
        assert!(check_labels(&geometry, 1, &labels).is_ok());
        assert!(matches!(
            check_labels(&geometry, 2, &labels),
            Err(HarnessError::ShapeMismatch { what: "labels", .. })
        ));
    }
}
