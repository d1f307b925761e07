//! Same-padded, stride-1 convolution over channels-last spatial tensors.
//!
//! Weights are kept flattened as `[out_channels, in_channels * prod(kernel)]`
//! and reshaped to Burn's `[out, in, k..]` layout at call time, so one parameter
//! type serves 1-D, 2-D and 3-D kernels.

use burn::module::Param;
use burn::nn::Initializer;
use burn::tensor::module::{conv1d, conv2d, conv3d};
use burn::tensor::ops::ConvOptions;
use burn::tensor::{backend::Backend, Tensor};

use crate::error::{CellError, CellResult};
use crate::spatial::SpatialTensor;

/// Glorot-uniform kernel for `kernel_shape` mapping `in_channels` to `out_channels`.
pub fn init_kernel<B: Backend>(
    kernel_shape: &[usize],
    in_channels: usize,
    out_channels: usize,
    device: &B::Device,
) -> Param<Tensor<B, 2>> {
    let receptive: usize = kernel_shape.iter().product();
    Initializer::XavierUniform { gain: 1.0 }.init_with(
        [out_channels, in_channels * receptive],
        Some(in_channels * receptive),
        Some(out_channels * receptive),
        device,
    )
}

pub fn init_bias<B: Backend>(
    out_channels: usize,
    start: f64,
    device: &B::Device,
) -> Param<Tensor<B, 1>> {
    Initializer::Constant { value: start }.init([out_channels], device)
}

/// Convolve `inputs` (concatenated along channels) with `weight`, keeping spatial size.
pub fn conv_same<B: Backend>(
    inputs: Vec<SpatialTensor<B>>,
    kernel_shape: &[usize],
    weight: Tensor<B, 2>,
    bias: Option<Tensor<B, 1>>,
) -> CellResult<SpatialTensor<B>> {
    let input = SpatialTensor::concat_channels(inputs)?;
    if kernel_shape.len() != input.spatial_rank().dims() {
        return Err(CellError::RankMismatch {
            expected: kernel_shape.len() + 2,
            found: input.rank(),
        });
    }
    if kernel_shape.contains(&0) {
        return Err(CellError::ZeroDimension {
            what: "kernel size",
        });
    }

    let [out_channels, flat] = weight.dims();
    let receptive: usize = kernel_shape.iter().product();
    let depth = input.channels();
    if depth * receptive != flat {
        return Err(CellError::ChannelMismatch {
            expected: flat / receptive,
            found: depth,
        });
    }

    Ok(match input {
        SpatialTensor::Line(x) => {
            let w = weight.reshape([out_channels, depth, kernel_shape[0]]);
            let x = pad_same(x.permute([0, 2, 1]), kernel_shape);
            let y = conv1d(x, w, bias, ConvOptions::new([1], [0], [1], 1));
            SpatialTensor::Line(y.permute([0, 2, 1]))
        }
        SpatialTensor::Plane(x) => {
            let w = weight.reshape([out_channels, depth, kernel_shape[0], kernel_shape[1]]);
            let x = pad_same(x.permute([0, 3, 1, 2]), kernel_shape);
            let y = conv2d(x, w, bias, ConvOptions::new([1, 1], [0, 0], [1, 1], 1));
            SpatialTensor::Plane(y.permute([0, 2, 3, 1]))
        }
        SpatialTensor::Volume(x) => {
            let w = weight.reshape([
                out_channels,
                depth,
                kernel_shape[0],
                kernel_shape[1],
                kernel_shape[2],
            ]);
            let x = pad_same(x.permute([0, 4, 1, 2, 3]), kernel_shape);
            let y = conv3d(
                x,
                w,
                bias,
                ConvOptions::new([1, 1, 1], [0, 0, 0], [1, 1, 1], 1),
            );
            SpatialTensor::Volume(y.permute([0, 2, 3, 4, 1]))
        }
    })
}

/// Zero-pad the spatial axes of a channels-first tensor the way "SAME" padding
/// does: `k - 1` in total per axis, the smaller half first.
fn pad_same<B: Backend, const D: usize>(mut x: Tensor<B, D>, kernel_shape: &[usize]) -> Tensor<B, D> {
    for (offset, &k) in kernel_shape.iter().enumerate() {
        let total = k - 1;
        let before = total / 2;
        x = pad_axis(x, offset + 2, before, total - before);
    }
    x
}

fn pad_axis<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    axis: usize,
    before: usize,
    after: usize,
) -> Tensor<B, D> {
    if before == 0 && after == 0 {
        return x;
    }
    let device = x.device();
    let dims = x.dims();
    let zeros = |len: usize| {
        let mut shape = dims;
        shape[axis] = len;
        Tensor::<B, D>::zeros(shape, &device)
    };

    let mut parts = Vec::with_capacity(3);
    if before > 0 {
        parts.push(zeros(before));
    }
    parts.push(x);
    if after > 0 {
        parts.push(zeros(after));
    }
    Tensor::cat(parts, axis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn ones_weight(out: usize, flat: usize) -> Tensor<B, 2> {
        Tensor::ones([out, flat], &Default::default())
    }

    #[test]
    fn same_padding_keeps_spatial_dims() {
        let device = Default::default();
        for kernel in [[1usize, 1], [2, 2], [3, 3], [4, 1]] {
            let x = SpatialTensor::<B>::zeros(&[2, 5, 6, 3], &device).unwrap();
            let receptive = kernel[0] * kernel[1];
            let y = conv_same(vec![x], &kernel, ones_weight(7, 3 * receptive), None).unwrap();
            assert_eq!(y.dims(), vec![2, 5, 6, 7], "kernel {kernel:?}");
        }
    }

    #[test]
    fn box_kernel_sums_neighbourhood() {
        let device = Default::default();
        // 1-D input [1, 4, 1] = 1,2,3,4 with a width-3 box kernel.
        let x = SpatialTensor::<B>::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 4.0], [1, 4, 1]),
            &device,
        )
        .unwrap();
        let y = conv_same(vec![x], &[3], ones_weight(1, 3), None).unwrap();
        let values = y.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![3.0, 6.0, 9.0, 7.0]);
    }

    #[test]
    fn bias_is_added_per_output_channel() {
        let device = Default::default();
        let x = SpatialTensor::<B>::zeros(&[1, 2, 2, 1], &device).unwrap();
        let bias = Tensor::<B, 1>::from_floats([0.5, -1.0], &device);
        let y = conv_same(vec![x], &[1, 1], ones_weight(2, 1), Some(bias)).unwrap();
        let values = y.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.5, -1.0, 0.5, -1.0, 0.5, -1.0, 0.5, -1.0]);
    }

    #[test]
    fn multiple_inputs_are_concatenated() {
        let device = Default::default();
        let a = SpatialTensor::<B>::zeros(&[1, 3, 2, 2, 2], &device).unwrap();
        let b = SpatialTensor::<B>::zeros(&[1, 3, 2, 2, 4], &device).unwrap();
        let y = conv_same(vec![a, b], &[1, 3, 3], ones_weight(5, 6 * 9), None).unwrap();
        assert_eq!(y.dims(), vec![1, 3, 2, 2, 5]);
    }

    #[test]
    fn mismatched_input_ranks_fail() {
        let device = Default::default();
        let plane = SpatialTensor::<B>::zeros(&[1, 2, 2, 1], &device).unwrap();
        let volume = SpatialTensor::<B>::zeros(&[1, 2, 2, 2, 1], &device).unwrap();
        let err = conv_same(vec![plane, volume], &[1, 1], ones_weight(1, 2), None).unwrap_err();
        assert_eq!(
            err,
            CellError::RankMismatch {
                expected: 4,
                found: 5
            }
        );
    }

    #[test]
    fn kernel_rank_must_match_input() {
        let device = Default::default();
        let plane = SpatialTensor::<B>::zeros(&[1, 2, 2, 1], &device).unwrap();
        let err = conv_same(vec![plane], &[1], ones_weight(1, 1), None).unwrap_err();
        assert!(matches!(err, CellError::RankMismatch { .. }));
    }

    #[test]
    fn depth_must_match_weight() {
        let device = Default::default();
        let plane = SpatialTensor::<B>::zeros(&[1, 2, 2, 3], &device).unwrap();
        let err = conv_same(vec![plane], &[1, 1], ones_weight(1, 2), None).unwrap_err();
        assert_eq!(
            err,
            CellError::ChannelMismatch {
                expected: 2,
                found: 3
            }
        );
    }

    #[test]
    fn no_inputs_fail() {
        let err = conv_same::<B>(Vec::new(), &[1], ones_weight(1, 1), None).unwrap_err();
        assert_eq!(err, CellError::NoInputs);
    }
}
