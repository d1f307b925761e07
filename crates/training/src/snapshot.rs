//! Snapshot layout and parameter-shape bookkeeping.
//!
//! A snapshot directory holds:
//! - `model.bin`: network record (`BinFileRecorder`, full precision)
//! - `optimizer.bin`: Adam moment record
//! - `model.json`: index with the global step, image geometry and the ordered
//!   parameter shapes of the network that wrote it

use std::fs;
use std::path::{Path, PathBuf};

use burn::module::{Module, ModuleVisitor, ParamId};
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::data::ImageGeometry;
use crate::error::{HarnessError, HarnessResult};

/// Record base names; the recorder appends `.bin`.
pub const MODEL_RECORD: &str = "model";
pub const OPTIMIZER_RECORD: &str = "optimizer";
pub const INDEX_FILE: &str = "model.json";

pub type SnapshotRecorder = BinFileRecorder<FullPrecisionSettings>;

pub fn recorder() -> SnapshotRecorder {
    BinFileRecorder::<FullPrecisionSettings>::new()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotIndex {
    pub step: u64,
    pub geometry: ImageGeometry,
    pub parameters: Vec<Vec<usize>>,
}

pub fn model_path(dir: &Path) -> PathBuf {
    dir.join(MODEL_RECORD)
}

pub fn optimizer_path(dir: &Path) -> PathBuf {
    dir.join(OPTIMIZER_RECORD)
}

pub fn write_index(dir: &Path, index: &SnapshotIndex) -> HarnessResult<()> {
    let path = dir.join(INDEX_FILE);
    let json = serde_json::to_vec_pretty(index).map_err(|source| HarnessError::Json {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json).map_err(|e| HarnessError::io(&path, e))
}

pub fn read_index(dir: &Path) -> HarnessResult<SnapshotIndex> {
    let path = dir.join(INDEX_FILE);
    let raw = fs::read(&path).map_err(|e| HarnessError::io(&path, e))?;
    serde_json::from_slice(&raw).map_err(|source| HarnessError::Json { path, source })
}

struct ShapeCollector {
    shapes: Vec<Vec<usize>>,
}

impl<B: Backend> ModuleVisitor<B> for ShapeCollector {
    fn visit_float<const D: usize>(&mut self, _id: ParamId, tensor: &Tensor<B, D>) {
        self.shapes.push(tensor.dims().to_vec());
    }
}

/// Shapes of every float parameter, in module visit order.
pub fn parameter_shapes<B: Backend, M: Module<B>>(module: &M) -> Vec<Vec<usize>> {
    let mut collector = ShapeCollector { shapes: Vec::new() };
    module.visit(&mut collector);
    collector.shapes
}

/// Fail on the first parameter whose stored shape differs from the network's.
pub fn check_shapes(expected: &[Vec<usize>], found: &[Vec<usize>]) -> HarnessResult<()> {
    if expected.len() != found.len() {
        return Err(HarnessError::SnapshotParamCount {
            expected: expected.len(),
            found: found.len(),
        });
    }
    for (index, (e, f)) in expected.iter().zip(found).enumerate() {
        if e != f {
            return Err(HarnessError::SnapshotShapeMismatch {
                index,
                expected: e.clone(),
                found: f.clone(),
            });
        }
    }
    Ok(())
}
