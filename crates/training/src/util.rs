use std::path::{Path, PathBuf};

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;
use clap::{Parser, ValueEnum};

use crate::config::TrainingConfig;
use crate::dataset::{load_dataset, load_unlabeled, save_masks};
use crate::harness::ModelHarness;
use crate::network::SegmenterBuilder;
use crate::TrainBackend;

pub type ADBackend = Autodiff<TrainBackend>;
pub type SegmenterHarness = ModelHarness<ADBackend, SegmenterBuilder>;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum BackendKind {
    NdArray,
    Wgpu,
}

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train the ConvLSTM segmenter on a PNG dataset")]
pub struct TrainArgs {
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// TOML config with [harness] and [network] sections (defaults to $TRAINING_CONFIG or training.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Dataset root containing images/ and masks/.
    #[arg(long, default_value = "assets/datasets/segmentation")]
    pub dataset_root: PathBuf,
    /// Snapshot directory to write.
    #[arg(long, default_value = "checkpoints/segmenter")]
    pub checkpoint_out: PathBuf,
    /// Snapshot directory to resume from before training.
    #[arg(long)]
    pub resume: Option<PathBuf>,
    /// Number of epochs (overrides config).
    #[arg(long)]
    pub epochs: Option<usize>,
    /// Batch size (overrides config).
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Learning rate (overrides config).
    #[arg(long)]
    pub lr: Option<f64>,
    /// Positive-class loss weight (overrides config).
    #[arg(long)]
    pub pos_weight: Option<f64>,
    /// Summary directory (overrides config).
    #[arg(long)]
    pub log_path: Option<PathBuf>,
    /// Seed for parameter init and shuffling (overrides config).
    #[arg(long)]
    pub seed: Option<u64>,
}

#[derive(Parser, Debug)]
#[command(name = "predict", about = "Predict segmentation masks with a trained snapshot")]
pub struct PredictArgs {
    /// Backend to use (ndarray or wgpu if enabled).
    #[arg(long, value_enum, default_value_t = BackendKind::NdArray)]
    pub backend: BackendKind,
    /// TOML config; must describe the same network as the snapshot.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Dataset root containing images/.
    #[arg(long, default_value = "assets/datasets/segmentation")]
    pub dataset_root: PathBuf,
    /// Snapshot directory to load.
    #[arg(long, default_value = "checkpoints/segmenter")]
    pub checkpoint: PathBuf,
    /// Directory receiving predicted mask PNGs.
    #[arg(long, default_value = "predictions")]
    pub output: PathBuf,
}

pub fn validate_backend_choice(kind: BackendKind) -> anyhow::Result<()> {
    let built_wgpu = cfg!(feature = "backend-wgpu");
    match (kind, built_wgpu) {
        (BackendKind::Wgpu, false) => {
            anyhow::bail!("backend-wgpu feature not enabled; rebuild with --features backend-wgpu or choose ndarray backend")
        }
        (BackendKind::NdArray, true) => {
            log::warn!("built with backend-wgpu; the WGPU backend is used despite --backend ndarray");
        }
        _ => {}
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TrainingConfig> {
    let cfg = match path {
        Some(path) => TrainingConfig::from_path(path)?,
        None => TrainingConfig::load()?,
    };
    Ok(cfg)
}

fn build_harness(cfg: TrainingConfig) -> anyhow::Result<SegmenterHarness> {
    let device = <ADBackend as Backend>::Device::default();
    let mut harness = ModelHarness::new(cfg.harness, SegmenterBuilder::new(cfg.network), device);
    harness.configure()?;
    harness.reset()?;
    Ok(harness)
}

pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.backend)?;

    let mut cfg = load_config(args.config.as_deref())?;
    if let Some(epochs) = args.epochs {
        cfg.harness.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        cfg.harness.batch_size = batch_size;
    }
    if let Some(lr) = args.lr {
        cfg.harness.rate = lr;
    }
    if let Some(pos_weight) = args.pos_weight {
        cfg.harness.pos_weight = pos_weight;
    }
    if let Some(log_path) = args.log_path.clone() {
        cfg.harness.log_path = log_path;
    }
    if args.seed.is_some() {
        cfg.harness.seed = args.seed;
    }

    let dataset = load_dataset(&args.dataset_root, cfg.harness.geometry())?;
    if dataset.is_empty() {
        anyhow::bail!(
            "no images found under {}",
            args.dataset_root.join(crate::dataset::IMAGES_DIR).display()
        );
    }

    let mut harness = build_harness(cfg)?;
    if let Some(resume) = &args.resume {
        harness.load(resume)?;
        log::info!("resumed from {} at step {}", resume.display(), harness.step()?);
    }

    let report = harness.train(&dataset.images, &dataset.labels, None, None, None)?;
    harness.save(&args.checkpoint_out)?;
    log::info!(
        "trained {} epochs ({} batches), final step {}, last epoch loss {:?}; saved to {}",
        report.epochs,
        report.batches,
        report.final_step,
        report.last_epoch_loss,
        args.checkpoint_out.display()
    );
    Ok(())
}

pub fn run_predict(args: PredictArgs) -> anyhow::Result<()> {
    validate_backend_choice(args.backend)?;

    let cfg = load_config(args.config.as_deref())?;
    let (names, images) = load_unlabeled(&args.dataset_root, cfg.harness.geometry())?;
    let mut harness = build_harness(cfg)?;
    harness.load(&args.checkpoint)?;

    let labels = harness.predict(&images, None)?;
    save_masks(&args.output, &names, &labels)?;
    log::info!("wrote {} masks to {}", names.len(), args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_args_parse_overrides() {
        let args = TrainArgs::parse_from([
            "train",
            "--dataset-root",
            "data",
            "--epochs",
            "3",
            "--lr",
            "0.01",
        ]);
        assert_eq!(args.dataset_root, PathBuf::from("data"));
        assert_eq!(args.epochs, Some(3));
        assert_eq!(args.lr, Some(0.01));
        assert!(args.batch_size.is_none());
    }

    #[test]
    fn wgpu_requires_feature() {
        let result = validate_backend_choice(BackendKind::Wgpu);
        assert_eq!(result.is_ok(), cfg!(feature = "backend-wgpu"));
    }
}
