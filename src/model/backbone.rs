//! MobileNetV3-Small feature extractor
//!
//! The ImageNet layout of MobileNetV3-Small without its classification top:
//! input rescaling, a stride-2 stem, eleven inverted-residual blocks and the
//! final 1x1 expansion to 576 channels. Convolutions pad TensorFlow-style
//! ("same" with the extra row/column at the bottom/right) so pretrained
//! weights converted from the reference model line up exactly.
//!
//! Pretrained weights are a Burn record produced offline and loaded with
//! [`MobileNetV3Small::load_pretrained`].

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    record::CompactRecorder,
    tensor::{backend::Backend, ElementConversion, Tensor},
};
use tracing::info;

use crate::utils::error::SpoofError;

const BN_EPSILON: f64 = 1e-3;
/// Keras momentum 0.999 expressed as Burn's update weight
const BN_MOMENTUM: f64 = 0.001;

/// One inverted-residual stage: (kernel, expanded channels, out channels, squeeze-excite, hard-swish, stride)
#[derive(Debug, Clone, Copy)]
pub struct BlockSpec {
    pub kernel: usize,
    pub expanded: usize,
    pub out: usize,
    pub squeeze_excite: bool,
    pub hard_swish: bool,
    pub stride: usize,
}

const fn block(kernel: usize, expanded: usize, out: usize, se: bool, hs: bool, stride: usize) -> BlockSpec {
    BlockSpec {
        kernel,
        expanded,
        out,
        squeeze_excite: se,
        hard_swish: hs,
        stride,
    }
}

/// MobileNetV3-Small block table (alpha = 1.0)
pub const SMALL_BLOCKS: [BlockSpec; 11] = [
    block(3, 16, 16, true, false, 2),
    block(3, 72, 24, false, false, 2),
    block(3, 88, 24, false, false, 1),
    block(5, 96, 40, true, true, 2),
    block(5, 240, 40, true, true, 1),
    block(5, 240, 40, true, true, 1),
    block(5, 120, 48, true, true, 1),
    block(5, 144, 48, true, true, 1),
    block(5, 288, 96, true, true, 2),
    block(5, 576, 96, true, true, 1),
    block(5, 576, 96, true, true, 1),
];

pub const STEM_CHANNELS: usize = 16;
pub const FEATURE_CHANNELS: usize = 576;

/// Round to the nearest multiple of 8, never dropping more than 10%
pub fn make_divisible(value: f64) -> usize {
    let divisor = 8usize;
    let mut new_value = divisor.max(((value + divisor as f64 / 2.0) as usize / divisor) * divisor);
    if (new_value as f64) < 0.9 * value {
        new_value += divisor;
    }
    new_value
}

pub fn relu6<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clamp(0.0, 6.0)
}

pub fn hard_sigmoid<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    relu6(x.add_scalar(3.0)).div_scalar(6.0)
}

pub fn hard_swish<B: Backend, const D: usize>(x: Tensor<B, D>) -> Tensor<B, D> {
    x.clone() * hard_sigmoid(x)
}

fn activate<B: Backend>(x: Tensor<B, 4>, hard: bool) -> Tensor<B, 4> {
    if hard {
        hard_swish(x)
    } else {
        burn::tensor::activation::relu(x)
    }
}

/// TensorFlow "same" padding: the odd pixel goes after, not before
fn pad_same<B: Backend>(x: Tensor<B, 4>, kernel: usize, stride: usize) -> Tensor<B, 4> {
    let [_, _, height, width] = x.dims();
    let total = |size: usize| {
        let out = size.div_ceil(stride);
        ((out - 1) * stride + kernel).saturating_sub(size)
    };
    let (th, tw) = (total(height), total(width));
    if th == 0 && tw == 0 {
        return x;
    }
    let (top, left) = (th / 2, tw / 2);
    x.pad((left, tw - left, top, th - top), 0.0f32.elem::<B::FloatElem>())
}

/// Convolution + batch norm, padded "same"
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    kernel: usize,
    stride: usize,
}

impl<B: Backend> ConvBn<B> {
    fn new(
        in_channels: usize,
        out_channels: usize,
        kernel: usize,
        stride: usize,
        groups: usize,
        device: &B::Device,
    ) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel, kernel])
            .with_stride([stride, stride])
            .with_groups(groups)
            .with_padding(PaddingConfig2d::Valid)
            .with_bias(false)
            .init(device);
        let bn = BatchNormConfig::new(out_channels)
            .with_epsilon(BN_EPSILON)
            .with_momentum(BN_MOMENTUM)
            .init(device);
        Self { conv, bn, kernel, stride }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = pad_same(x, self.kernel, self.stride);
        self.bn.forward(self.conv.forward(x))
    }
}

/// Squeeze-and-excite gate
#[derive(Module, Debug)]
pub struct SqueezeExcite<B: Backend> {
    pub pool: AdaptiveAvgPool2d,
    pub reduce: Conv2d<B>,
    pub expand: Conv2d<B>,
}

impl<B: Backend> SqueezeExcite<B> {
    fn new(channels: usize, device: &B::Device) -> Self {
        let squeezed = make_divisible(channels as f64 * 0.25);
        Self {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            reduce: Conv2dConfig::new([channels, squeezed], [1, 1]).init(device),
            expand: Conv2dConfig::new([squeezed, channels], [1, 1]).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let gate = self.pool.forward(x.clone());
        let gate = burn::tensor::activation::relu(self.reduce.forward(gate));
        let gate = hard_sigmoid(self.expand.forward(gate));
        x * gate
    }
}

/// Expand (1x1) -> depthwise -> optional squeeze-excite -> project (1x1)
#[derive(Module, Debug)]
pub struct InvertedResidual<B: Backend> {
    pub expand: Option<ConvBn<B>>,
    pub depthwise: ConvBn<B>,
    pub squeeze_excite: Option<SqueezeExcite<B>>,
    pub project: ConvBn<B>,
    hard_swish: bool,
    residual: bool,
}

impl<B: Backend> InvertedResidual<B> {
    fn new(in_channels: usize, spec: &BlockSpec, device: &B::Device) -> Self {
        let expand = (spec.expanded != in_channels)
            .then(|| ConvBn::new(in_channels, spec.expanded, 1, 1, 1, device));
        let depthwise = ConvBn::new(
            spec.expanded,
            spec.expanded,
            spec.kernel,
            spec.stride,
            spec.expanded,
            device,
        );
        let squeeze_excite = spec
            .squeeze_excite
            .then(|| SqueezeExcite::new(spec.expanded, device));
        let project = ConvBn::new(spec.expanded, spec.out, 1, 1, 1, device);

        Self {
            expand,
            depthwise,
            squeeze_excite,
            project,
            hard_swish: spec.hard_swish,
            residual: spec.stride == 1 && in_channels == spec.out,
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input.clone();
        if let Some(expand) = &self.expand {
            x = activate(expand.forward(x), self.hard_swish);
        }
        x = activate(self.depthwise.forward(x), self.hard_swish);
        if let Some(se) = &self.squeeze_excite {
            x = se.forward(x);
        }
        x = self.project.forward(x);

        if self.residual {
            x + input
        } else {
            x
        }
    }
}

#[derive(Config, Debug)]
pub struct MobileNetV3SmallConfig {
    /// Fold the `x / 127.5 - 1` input scaling into the model
    #[config(default = "true")]
    pub include_preprocessing: bool,
}

impl MobileNetV3SmallConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MobileNetV3Small<B> {
        let stem = ConvBn::new(3, STEM_CHANNELS, 3, 2, 1, device);

        let mut blocks = Vec::with_capacity(SMALL_BLOCKS.len());
        let mut channels = STEM_CHANNELS;
        for spec in &SMALL_BLOCKS {
            blocks.push(InvertedResidual::new(channels, spec, device));
            channels = spec.out;
        }

        let head = ConvBn::new(channels, FEATURE_CHANNELS, 1, 1, 1, device);

        MobileNetV3Small {
            stem,
            blocks,
            head,
            include_preprocessing: self.include_preprocessing,
        }
    }
}

/// MobileNetV3-Small without its classification top
#[derive(Module, Debug)]
pub struct MobileNetV3Small<B: Backend> {
    pub stem: ConvBn<B>,
    pub blocks: Vec<InvertedResidual<B>>,
    pub head: ConvBn<B>,
    include_preprocessing: bool,
}

impl<B: Backend> MobileNetV3Small<B> {
    /// Load weights from a `CompactRecorder` file
    pub fn load_pretrained(self, path: &Path, device: &B::Device) -> crate::utils::error::Result<Self> {
        if !path.exists() {
            return Err(SpoofError::Model(format!(
                "Pretrained backbone weights not found at {:?}",
                path
            )));
        }
        let model = self
            .load_file(path.to_path_buf(), &CompactRecorder::new(), device)
            .map_err(|e| SpoofError::Model(format!("Failed to load backbone weights {:?}: {}", path, e)))?;
        info!("Loaded pretrained backbone weights from {:?}", path);
        Ok(model)
    }

    pub fn out_channels(&self) -> usize {
        FEATURE_CHANNELS
    }

    /// `[batch, 3, H, W]` pixels in `[0, 255]` -> `[batch, 576, H/32, W/32]` features
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = if self.include_preprocessing {
            x.div_scalar(127.5).sub_scalar(1.0)
        } else {
            x
        };

        let mut x = hard_swish(self.stem.forward(x));
        for block in &self.blocks {
            x = block.forward(x);
        }
        hard_swish(self.head.forward(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_make_divisible() {
        assert_eq!(make_divisible(4.0), 8);
        assert_eq!(make_divisible(24.0), 24);
        assert_eq!(make_divisible(60.0), 64);
        assert_eq!(make_divisible(30.0), 32);
        assert_eq!(make_divisible(36.0), 40);
        assert_eq!(make_divisible(144.0), 144);
    }

    #[test]
    fn test_hard_swish_values() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 1>::from_floats([-4.0, 0.0, 1.0, 4.0], &device);
        let y = hard_swish(x).into_data().to_vec::<f32>().unwrap();
        assert_eq!(y[0], 0.0);
        assert_eq!(y[1], 0.0);
        assert!((y[2] - 4.0 / 6.0).abs() < 1e-6);
        assert_eq!(y[3], 4.0);
    }

    #[test]
    fn test_pad_same_stride_two_is_bottom_right_heavy() {
        let device = Default::default();
        let x = Tensor::<TestBackend, 4>::ones([1, 1, 4, 4], &device);
        let padded = pad_same(x, 3, 2);
        assert_eq!(padded.dims(), [1, 1, 5, 5]);
        let data = padded.into_data().to_vec::<f32>().unwrap();
        // Top-left kept, bottom-right padded with zero
        assert_eq!(data[0], 1.0);
        assert_eq!(data[24], 0.0);
    }

    #[test]
    fn test_block_layout() {
        let device = Default::default();
        let model = MobileNetV3SmallConfig::new().init::<TestBackend>(&device);

        assert_eq!(model.blocks.len(), 11);
        assert!(model.blocks[0].expand.is_none());
        assert!(model.blocks[1].expand.is_some());
        assert!(model.blocks[1].squeeze_excite.is_none());
        assert!(model.blocks[2].residual);
        assert!(!model.blocks[3].residual);
        assert!(model.blocks[6].expand.is_some());
    }

    #[test]
    fn test_feature_shape() {
        let device = Default::default();
        let model = MobileNetV3SmallConfig::new().init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::ones([2, 3, 64, 64], &device).mul_scalar(128.0);

        let features = model.forward(x);
        assert_eq!(features.dims(), [2, FEATURE_CHANNELS, 2, 2]);
    }

    #[test]
    fn test_missing_pretrained_file_is_an_error() {
        let device = Default::default();
        let model = MobileNetV3SmallConfig::new().init::<TestBackend>(&device);
        let result = model.load_pretrained(Path::new("/no/such/weights.mpk"), &device);
        assert!(matches!(result, Err(SpoofError::Model(_))));
    }

    #[test]
    fn test_pretrained_round_trip() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backbone.mpk");

        let model = MobileNetV3SmallConfig::new().init::<TestBackend>(&device);
        model
            .clone()
            .save_file(path.clone(), &CompactRecorder::new())
            .unwrap();

        let loaded = MobileNetV3SmallConfig::new()
            .init::<TestBackend>(&device)
            .load_pretrained(&path, &device)
            .unwrap();

        // Compact records are half precision
        let saved = model.stem.conv.weight.val().into_data().to_vec::<f32>().unwrap();
        let restored = loaded.stem.conv.weight.val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(saved.len(), restored.len());
        for (a, b) in saved.iter().zip(restored.iter()) {
            assert!((a - b).abs() <= 1e-3 * a.abs().max(1.0), "{} vs {}", a, b);
        }
    }
}
