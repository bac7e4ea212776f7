//! Dense semantic segmentation on top of a DRN backbone.
//!
//! The backbone runs headless at 1/8 resolution, a 1x1 convolution maps its
//! features to per-class logits, and an upsampling stage restores the input
//! resolution.

use burn::{
    module::Param,
    nn::conv::{Conv2d, Conv2dConfig},
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

use super::{
    blocks::conv_initializer,
    drn::{Drn, DrnA},
    upsample::BilinearUpsample,
};
use crate::{
    config::{DrnAConfig, DrnConfig, DrnSegConfig, ModelName, UpsampleMode},
    error::DrnResult,
};

/// The DRN backbones remove 3 octaves of resolution; the segmentation head
/// restores them.
const DOWNSAMPLE_FACTOR: usize = 8;

/// A headless DRN feature extractor of either family.
#[derive(Module, Debug)]
pub enum SegBackbone<B: Backend> {
    Drn(Drn<B>),
    DrnA(DrnA<B>),
}

impl<B: Backend> SegBackbone<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Drn(model) => model.forward_features(input),
            Self::DrnA(model) => model.forward_features(input),
        }
    }

    pub fn out_channels(&self) -> usize {
        match self {
            Self::Drn(model) => model.out_channels(),
            Self::DrnA(model) => model.out_channels(),
        }
    }
}

/// Builds the named preset as a headless feature extractor.
pub fn build_seg_backbone<B: Backend>(
    model: &ModelName,
    device: &Device<B>,
) -> DrnResult<SegBackbone<B>> {
    let backbone = match model {
        ModelName::DrnA18 => {
            SegBackbone::DrnA(DrnAConfig::drn_a_18().with_num_classes(None).init(device)?)
        }
        ModelName::DrnA50 => {
            SegBackbone::DrnA(DrnAConfig::drn_a_50().with_num_classes(None).init(device)?)
        }
        ModelName::DrnC26 => {
            SegBackbone::Drn(DrnConfig::drn_c_26().with_num_classes(None).init(device)?)
        }
        ModelName::DrnC42 => {
            SegBackbone::Drn(DrnConfig::drn_c_42().with_num_classes(None).init(device)?)
        }
        ModelName::DrnD22 => {
            SegBackbone::Drn(DrnConfig::drn_d_22().with_num_classes(None).init(device)?)
        }
        ModelName::DrnD38 => {
            SegBackbone::Drn(DrnConfig::drn_d_38().with_num_classes(None).init(device)?)
        }
        ModelName::DrnD54 => {
            SegBackbone::Drn(DrnConfig::drn_d_54().with_num_classes(None).init(device)?)
        }
        ModelName::DrnE22 => {
            SegBackbone::Drn(DrnConfig::drn_e_22().with_num_classes(None).init(device)?)
        }
    };
    Ok(backbone)
}

/// Bilinear interpolation by a fixed integer factor, no learned parameters.
#[derive(Module, Clone, Debug)]
pub struct ScaleUpsample {
    scale: usize,
}

impl ScaleUpsample {
    pub fn new(scale: usize) -> Self {
        Self { scale }
    }

    pub fn forward<B: Backend>(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, height, width] = input.dims();
        interpolate(
            input,
            [height * self.scale, width * self.scale],
            InterpolateOptions::new(InterpolateMode::Bilinear),
        )
    }
}

/// The upsampling stage of the segmentation head.
#[derive(Module, Debug)]
pub enum Upsampler<B: Backend> {
    /// Frozen transposed convolution with an exact bilinear kernel.
    Fixed(BilinearUpsample<B>),
    /// Direct bilinear interpolation.
    Interpolate(ScaleUpsample),
}

impl<B: Backend> Upsampler<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            Self::Fixed(up) => up.forward(input),
            Self::Interpolate(up) => up.forward(input),
        }
    }
}

impl DrnSegConfig {
    /// Initializes a `DrnSeg` model with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DrnResult<DrnSeg<B>> {
        self.validate()?;

        let base = build_seg_backbone(&self.model, device)?;

        let mut seg = Conv2dConfig::new([base.out_channels(), self.num_classes], [1, 1])
            .with_initializer(conv_initializer())
            .init(device);
        // Class logits start unbiased.
        seg.bias = seg
            .bias
            .map(|bias| Param::from_tensor(bias.val().zeros_like()));

        let up = match self.upsample {
            UpsampleMode::Deconvolution => Upsampler::Fixed(BilinearUpsample::new(
                self.num_classes,
                DOWNSAMPLE_FACTOR,
                device,
            )),
            UpsampleMode::Interpolation => {
                Upsampler::Interpolate(ScaleUpsample::new(DOWNSAMPLE_FACTOR))
            }
        };

        Ok(DrnSeg { base, seg, up })
    }
}

/// Dense semantic segmentation model: DRN backbone, 1x1 class projection,
/// bilinear upsampling back to input resolution.
#[derive(Module, Debug)]
pub struct DrnSeg<B: Backend> {
    base: SegBackbone<B>,
    seg: Conv2d<B>,
    up: Upsampler<B>,
}

impl<B: Backend> DrnSeg<B> {
    /// Maps an `[N, 3, H, W]` image batch to `[N, num_classes, H, W]` logits.
    /// Input height and width must be multiples of 8.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let features = self.base.forward(input);
        let logits = self.seg.forward(features);
        self.up.forward(logits)
    }

    /// Per-class logits at backbone resolution, before upsampling.
    pub fn forward_logits(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let features = self.base.forward(input);
        self.seg.forward(features)
    }

    /// Parameter count excluding the frozen upsampling kernel.
    pub fn num_trainable_params(&self) -> usize {
        self.base.num_params() + self.seg.num_params()
    }
}
