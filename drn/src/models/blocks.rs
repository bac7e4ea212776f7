//! Residual building blocks for DRN backbones.
//!
//! Basic and Bottleneck blocks carry a per-stage dilation pair so receptive
//! field can grow without further downsampling, and an optional residual add
//! (disabled in the tail groups of the C variant).

use core::f64::consts::SQRT_2;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use crate::config::BlockKind;

/// Weight initializer shared by every convolution in the network:
/// zero-mean normal with std = sqrt(2 / (kh * kw * out_channels)).
pub(crate) fn conv_initializer() -> Initializer {
    Initializer::KaimingNormal {
        gain: SQRT_2,
        fan_out_only: true,
    }
}

/// 3x3 convolution with padding matching the dilation, bias-free.
pub(crate) fn conv3x3_config(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    dilation: usize,
) -> Conv2dConfig {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(dilation, dilation))
        .with_dilation([dilation, dilation])
        .with_bias(false)
        .with_initializer(conv_initializer())
}

/// 1x1 convolution, bias-free.
pub(crate) fn conv1x1_config(in_channels: usize, out_channels: usize, stride: usize) -> Conv2dConfig {
    Conv2dConfig::new([in_channels, out_channels], [1, 1])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(0, 0))
        .with_bias(false)
        .with_initializer(conv_initializer())
}

#[derive(Module, Debug)]
pub enum ResidualBlock<B: Backend> {
    /// A basic residual block.
    Basic(BasicBlock<B>),
    /// A bottleneck residual block.
    Bottleneck(Bottleneck<B>),
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Basic(block) => block.forward(input),
            Self::Bottleneck(block) => block.forward(input),
        }
    }

    /// Create a new block of the given topology.
    pub fn new(
        kind: &BlockKind,
        in_channels: usize,
        planes: usize,
        stride: usize,
        dilation: [usize; 2],
        residual: bool,
        device: &Device<B>,
    ) -> Self {
        match kind {
            BlockKind::Basic => Self::Basic(BasicBlock::new(
                in_channels,
                planes,
                stride,
                dilation,
                residual,
                device,
            )),
            BlockKind::Bottleneck => Self::Bottleneck(Bottleneck::new(
                in_channels,
                planes,
                stride,
                dilation,
                residual,
                device,
            )),
        }
    }

    /// The dilation applied by each internal 3x3 stage.
    #[cfg(test)]
    pub(crate) fn stage_dilations(&self) -> [usize; 2] {
        match self {
            Self::Basic(block) => [block.conv1.dilation[0], block.conv2.dilation[0]],
            // The bottleneck has a single 3x3 stage; both entries report it.
            Self::Bottleneck(block) => [block.conv2.dilation[0], block.conv2.dilation[0]],
        }
    }
}

/// DRN basic residual block: two dilated 3x3 stages.
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
    residual: bool,
}

impl<B: Backend> BasicBlock<B> {
    /// Output channels = planes * EXPANSION.
    pub const EXPANSION: usize = 1;

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = input.clone();

        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);

        let out = if self.residual {
            match &self.downsample {
                Some(downsample) => out + downsample.forward(identity),
                None => out + identity,
            }
        } else {
            out
        };

        self.relu.forward(out)
    }

    /// Create a new BasicBlock.
    pub fn new(
        in_channels: usize,
        planes: usize,
        stride: usize,
        dilation: [usize; 2],
        residual: bool,
        device: &Device<B>,
    ) -> Self {
        let conv1 = conv3x3_config(in_channels, planes, stride, dilation[0]).init(device);
        let bn1 = BatchNormConfig::new(planes).init(device);
        let conv2 = conv3x3_config(planes, planes, 1, dilation[1]).init(device);
        let bn2 = BatchNormConfig::new(planes).init(device);

        let out_channels = planes * Self::EXPANSION;
        let downsample = (residual && (stride != 1 || in_channels != out_channels))
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1,
            bn1,
            relu: Relu::new(),
            conv2,
            bn2,
            downsample,
            residual,
        }
    }
}

/// DRN bottleneck residual block: 1x1 reduce, dilated 3x3, 1x1 expand.
///
/// The dilation pair's second entry drives the single 3x3 stage, matching the
/// published architecture.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv3: Conv2d<B>,
    bn3: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
    residual: bool,
}

impl<B: Backend> Bottleneck<B> {
    /// Output channels = planes * EXPANSION.
    pub const EXPANSION: usize = 4;

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = input.clone();

        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);
        let out = self.relu.forward(out);
        let out = self.conv3.forward(out);
        let out = self.bn3.forward(out);

        let out = if self.residual {
            match &self.downsample {
                Some(downsample) => out + downsample.forward(identity),
                None => out + identity,
            }
        } else {
            out
        };

        self.relu.forward(out)
    }

    /// Create a new Bottleneck.
    pub fn new(
        in_channels: usize,
        planes: usize,
        stride: usize,
        dilation: [usize; 2],
        residual: bool,
        device: &Device<B>,
    ) -> Self {
        let conv1 = conv1x1_config(in_channels, planes, 1).init(device);
        let bn1 = BatchNormConfig::new(planes).init(device);
        let conv2 = conv3x3_config(planes, planes, stride, dilation[1]).init(device);
        let bn2 = BatchNormConfig::new(planes).init(device);
        let out_channels = planes * Self::EXPANSION;
        let conv3 = conv1x1_config(planes, out_channels, 1).init(device);
        let bn3 = BatchNormConfig::new(out_channels).init(device);

        let downsample = (residual && (stride != 1 || in_channels != out_channels))
            .then(|| Downsample::new(in_channels, out_channels, stride, device));

        Self {
            conv1,
            bn1,
            relu: Relu::new(),
            conv2,
            bn2,
            conv3,
            bn3,
            downsample,
            residual,
        }
    }
}

/// Projection shortcut: 1x1 conv adjusting stride and channel count, plus BN.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        self.bn.forward(out)
    }

    /// Create a new Downsample.
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &Device<B>) -> Self {
        let conv = conv1x1_config(in_channels, out_channels, stride).init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self { conv, bn }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, module::Param};

    type TestBackend = NdArray<f32>;

    #[test]
    fn basic_block_output_channels() {
        let device = Default::default();
        let block = BasicBlock::<TestBackend>::new(16, 32, 2, [1, 1], true, &device);

        let input = Tensor::random([1, 16, 32, 32], burn::tensor::Distribution::Default, &device);
        let output = block.forward(input);

        assert_eq!(output.dims(), [1, 32, 16, 16]);
    }

    #[test]
    fn bottleneck_output_channels_expansion() {
        let device = Default::default();
        let block = Bottleneck::<TestBackend>::new(64, 32, 1, [2, 2], true, &device);

        let input = Tensor::random([1, 64, 16, 16], burn::tensor::Distribution::Default, &device);
        let output = block.forward(input);

        assert_eq!(output.dims(), [1, 32 * Bottleneck::<TestBackend>::EXPANSION, 16, 16]);
    }

    #[test]
    fn identity_shortcut_when_shape_preserved() {
        let device = Default::default();
        let block = BasicBlock::<TestBackend>::new(32, 32, 1, [2, 2], true, &device);
        assert!(block.downsample.is_none());

        let block = BasicBlock::<TestBackend>::new(16, 32, 1, [1, 1], true, &device);
        assert!(block.downsample.is_some());
    }

    #[test]
    fn non_residual_block_ignores_input() {
        let device = Default::default();
        let mut block = BasicBlock::<TestBackend>::new(8, 8, 1, [2, 2], false, &device);
        block.conv1.weight = Param::from_tensor(block.conv1.weight.val().zeros_like());
        block.conv2.weight = Param::from_tensor(block.conv2.weight.val().zeros_like());

        let input: Tensor<TestBackend, 4> =
            Tensor::random([1, 8, 8, 8], burn::tensor::Distribution::Default, &device) + 1.0;
        let output = block.forward(input.clone());

        // With zeroed transform weights and no residual add, the output collapses
        // to zero instead of being forced back to the input.
        assert_eq!(output.clone().abs().max().into_scalar(), 0.0);
        assert!(input.abs().max().into_scalar() > 0.0);
    }
}
