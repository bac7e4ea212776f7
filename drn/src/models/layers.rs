//! Layer-group builders for DRN backbones.
//!
//! A layer group stacks blocks under a shared dilation regime. The residual
//! builder implements the progressive-dilation policy: when a group opens a new
//! dilation level, its first block ramps in with half the requested dilation on
//! the first stage, avoiding an abrupt receptive-field jump.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use super::blocks::{conv3x3_config, conv_initializer, ResidualBlock};
use crate::{
    config::BlockKind,
    error::{DrnError, DrnResult},
};

/// An ordered group of residual blocks sharing a dilation regime.
#[derive(Module, Debug)]
pub struct ResidualLayer<B: Backend> {
    blocks: Vec<ResidualBlock<B>>,
    out_channels: usize,
}

impl<B: Backend> ResidualLayer<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut out = input;
        for block in &self.blocks {
            out = block.forward(out);
        }
        out
    }

    /// Build a layer group under the progressive-dilation policy.
    ///
    /// The first block takes the given stride and, when it changes shape,
    /// carries the projection shortcut. With dilation 1 both stages of the
    /// first block use dilation (1, 1); otherwise `new_level` selects between
    /// the (dilation/2, dilation) ramp-in and the flat (dilation, dilation)
    /// pair. All subsequent blocks use (dilation, dilation).
    ///
    /// # Errors
    ///
    /// Returns `DrnError::InvalidDilation` if `dilation` is neither 1 nor even.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: &BlockKind,
        num_blocks: usize,
        in_channels: usize,
        planes: usize,
        stride: usize,
        dilation: usize,
        new_level: bool,
        residual: bool,
        device: &Device<B>,
    ) -> DrnResult<Self> {
        if dilation != 1 && dilation % 2 != 0 {
            return Err(DrnError::InvalidDilation { dilation });
        }

        let first_dilation = if dilation == 1 {
            [1, 1]
        } else if new_level {
            [dilation / 2, dilation]
        } else {
            [dilation, dilation]
        };

        let out_channels = planes * kind.expansion();
        let mut blocks = Vec::with_capacity(num_blocks);
        blocks.push(ResidualBlock::new(
            kind,
            in_channels,
            planes,
            stride,
            first_dilation,
            residual,
            device,
        ));
        for _ in 1..num_blocks {
            blocks.push(ResidualBlock::new(
                kind,
                out_channels,
                planes,
                1,
                [dilation, dilation],
                residual,
                device,
            ));
        }

        Ok(Self {
            blocks,
            out_channels,
        })
    }

    /// Build a layer group without the ramp-in policy (DRN-A style): the first
    /// block always uses dilation (1, 1), the rest (dilation, dilation).
    pub fn new_flat(
        kind: &BlockKind,
        num_blocks: usize,
        in_channels: usize,
        planes: usize,
        stride: usize,
        dilation: usize,
        device: &Device<B>,
    ) -> Self {
        let out_channels = planes * kind.expansion();
        let mut blocks = Vec::with_capacity(num_blocks);
        blocks.push(ResidualBlock::new(
            kind,
            in_channels,
            planes,
            stride,
            [1, 1],
            true,
            device,
        ));
        for _ in 1..num_blocks {
            blocks.push(ResidualBlock::new(
                kind,
                out_channels,
                planes,
                1,
                [dilation, dilation],
                true,
                device,
            ));
        }

        Self {
            blocks,
            out_channels,
        }
    }

    /// Output channel count of the group: planes * block expansion.
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    #[cfg(test)]
    pub(crate) fn blocks(&self) -> &[ResidualBlock<B>] {
        &self.blocks
    }
}

/// A convolution + batch-norm + ReLU stage.
#[derive(Module, Debug)]
pub struct ConvBnRelu<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> ConvBnRelu<B> {
    pub fn init(
        conv2d_config: Conv2dConfig,
        batch_norm_config: BatchNormConfig,
        device: &Device<B>,
    ) -> Self {
        let conv = conv2d_config.init(device);
        let bn = batch_norm_config.init(device);
        let relu = Relu::new();
        Self { conv, bn, relu }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }
}

/// A plain stack of dilated 3x3 convolution stages with no shortcut, used for
/// the early and tail groups of the D/E variants.
#[derive(Module, Debug)]
pub struct ConvLayer<B: Backend> {
    convs: Vec<ConvBnRelu<B>>,
    out_channels: usize,
}

impl<B: Backend> ConvLayer<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut out = input;
        for conv in &self.convs {
            out = conv.forward(out);
        }
        out
    }

    /// Create a new ConvLayer. Only the first stage takes the stride.
    pub fn new(
        num_convs: usize,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        dilation: usize,
        device: &Device<B>,
    ) -> Self {
        let convs = (0..num_convs)
            .map(|i| {
                let input = if i == 0 { in_channels } else { out_channels };
                let stride = if i == 0 { stride } else { 1 };
                ConvBnRelu::init(
                    conv3x3_config(input, out_channels, stride, dilation),
                    BatchNormConfig::new(out_channels),
                    device,
                )
            })
            .collect();

        Self {
            convs,
            out_channels,
        }
    }

    /// Output channel count of the group.
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

/// The stem shared by every DRN variant: 7x7 conv + BN + ReLU.
#[derive(Module, Debug)]
pub struct ConvStem<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> ConvStem<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv.forward(input);
        let out = self.bn.forward(out);
        self.relu.forward(out)
    }

    /// Create a new ConvStem.
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &Device<B>) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [7, 7])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .with_initializer(conv_initializer())
            .init(device);
        let bn = BatchNormConfig::new(out_channels).init(device);

        Self {
            conv,
            bn,
            relu: Relu::new(),
        }
    }
}

/// A layer group that is either a residual group or a plain convolution stack.
#[derive(Module, Debug)]
pub enum LayerGroup<B: Backend> {
    Residual(ResidualLayer<B>),
    Conv(ConvLayer<B>),
}

impl<B: Backend> LayerGroup<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Residual(layer) => layer.forward(input),
            Self::Conv(layer) => layer.forward(input),
        }
    }

    pub fn out_channels(&self) -> usize {
        match self {
            Self::Residual(layer) => layer.out_channels(),
            Self::Conv(layer) => layer.out_channels(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn group_output_channels_follow_expansion() {
        let device = Default::default();
        let basic = ResidualLayer::<TestBackend>::new(
            &BlockKind::Basic,
            2,
            16,
            32,
            2,
            1,
            true,
            true,
            &device,
        )
        .unwrap();
        assert_eq!(basic.out_channels(), 32);

        let bottleneck = ResidualLayer::<TestBackend>::new(
            &BlockKind::Bottleneck,
            2,
            16,
            32,
            2,
            1,
            true,
            true,
            &device,
        )
        .unwrap();
        assert_eq!(bottleneck.out_channels(), 128);

        let input = Tensor::random([1, 16, 16, 16], burn::tensor::Distribution::Default, &device);
        assert_eq!(bottleneck.forward(input).dims(), [1, 128, 8, 8]);
    }

    #[test]
    fn dilation_one_uses_unit_stages() {
        let device = Default::default();
        let layer = ResidualLayer::<TestBackend>::new(
            &BlockKind::Basic,
            2,
            16,
            16,
            1,
            1,
            true,
            true,
            &device,
        )
        .unwrap();

        for block in layer.blocks() {
            assert_eq!(block.stage_dilations(), [1, 1]);
        }
    }

    #[test]
    fn new_level_ramps_in_first_block() {
        let device = Default::default();
        let layer = ResidualLayer::<TestBackend>::new(
            &BlockKind::Basic,
            3,
            16,
            16,
            1,
            4,
            true,
            true,
            &device,
        )
        .unwrap();

        let blocks = layer.blocks();
        assert_eq!(blocks[0].stage_dilations(), [2, 4]);
        assert_eq!(blocks[1].stage_dilations(), [4, 4]);
        assert_eq!(blocks[2].stage_dilations(), [4, 4]);
    }

    #[test]
    fn continued_level_keeps_full_dilation() {
        let device = Default::default();
        let layer = ResidualLayer::<TestBackend>::new(
            &BlockKind::Basic,
            2,
            16,
            16,
            1,
            2,
            false,
            true,
            &device,
        )
        .unwrap();

        for block in layer.blocks() {
            assert_eq!(block.stage_dilations(), [2, 2]);
        }
    }

    #[test]
    fn odd_dilation_is_rejected() {
        let device = Default::default();
        let result = ResidualLayer::<TestBackend>::new(
            &BlockKind::Basic,
            2,
            16,
            16,
            1,
            3,
            true,
            true,
            &device,
        );

        match result {
            Err(DrnError::InvalidDilation { dilation }) => assert_eq!(dilation, 3),
            _ => panic!("Expected InvalidDilation error"),
        }
    }

    #[test]
    fn conv_layer_strides_only_first_stage() {
        let device = Default::default();
        let layer = ConvLayer::<TestBackend>::new(2, 16, 32, 2, 1, &device);

        let input = Tensor::random([1, 16, 32, 32], burn::tensor::Distribution::Default, &device);
        assert_eq!(layer.forward(input).dims(), [1, 32, 16, 16]);
    }

    #[test]
    fn dilated_layers_preserve_resolution() {
        let device = Default::default();
        let layer = ResidualLayer::<TestBackend>::new(
            &BlockKind::Basic,
            2,
            16,
            16,
            1,
            2,
            false,
            true,
            &device,
        )
        .unwrap();

        let input = Tensor::random([1, 16, 28, 28], burn::tensor::Distribution::Default, &device);
        assert_eq!(layer.forward(input).dims(), [1, 16, 28, 28]);
    }
}
