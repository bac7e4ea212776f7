//! Dilated residual network backbones.
//!
//! The C/D/E variants share one skeleton: a 7x7 stem, two early groups
//! (residual for C, plain convolution stacks for D/E), four dilated residual
//! groups, optional non-residual tail groups, and for E a terminal inception
//! module. Spatial resolution drops by 8 in total; the deeper groups hold it
//! there and grow receptive field through dilation instead.
//!
//! The variant tag is resolved once at construction into a concrete module
//! graph; the forward path never branches on it.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
};

use super::{
    blocks::conv_initializer,
    inception::ResInception,
    layers::{ConvLayer, ConvStem, LayerGroup, ResidualLayer},
};
use crate::{
    config::{Arch, BlockKind, DrnAConfig, DrnConfig, OutputMode},
    error::{DrnError, DrnResult},
};

/// The classifier output: class scores or a dense per-pixel logit map.
#[derive(Debug, Clone)]
pub enum DrnOutput<B: Backend> {
    /// Pooled class scores of shape `[N, num_classes]`.
    Scores(Tensor<B, 2>),
    /// Dense class-logit map of shape `[N, num_classes, H', W']`.
    Map(Tensor<B, 4>),
}

/// Global average pooling followed by a 1x1 classifier convolution.
#[derive(Module, Debug)]
pub struct PooledHead<B: Backend> {
    pool: AdaptiveAvgPool2d,
    fc: Conv2d<B>,
}

impl<B: Backend> PooledHead<B> {
    fn new(in_channels: usize, num_classes: usize, device: &Device<B>) -> Self {
        let pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc = classifier_conv(in_channels, num_classes, device);
        Self { pool, fc }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let out = self.pool.forward(input);
        let out = self.fc.forward(out);
        out.flatten(1, 3)
    }
}

/// The classifier head attached to the last layer group.
#[derive(Module, Debug)]
pub enum ClassifierHead<B: Backend> {
    /// Classification mode: pool, classify, flatten.
    Pooled(PooledHead<B>),
    /// Dense mode: per-pixel 1x1 classifier, spatial dims preserved.
    Dense(Conv2d<B>),
}

/// 1x1 classifier convolution with bias.
fn classifier_conv<B: Backend>(
    in_channels: usize,
    num_classes: usize,
    device: &Device<B>,
) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, num_classes], [1, 1])
        .with_padding(PaddingConfig2d::Explicit(0, 0))
        .with_initializer(conv_initializer())
        .init(device)
}

impl DrnConfig {
    /// Initializes a `Drn` backbone with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DrnResult<Drn<B>> {
        self.validate()?;

        let ch = &self.channels;
        let stem = ConvStem::new(3, ch[0], 1, device);

        let (layer1, layer2) = match self.arch {
            Arch::C => {
                let layer1 = ResidualLayer::new(
                    &BlockKind::Basic,
                    self.layers[0],
                    ch[0],
                    ch[0],
                    1,
                    1,
                    true,
                    true,
                    device,
                )?;
                let layer2 = ResidualLayer::new(
                    &BlockKind::Basic,
                    self.layers[1],
                    layer1.out_channels(),
                    ch[1],
                    2,
                    1,
                    true,
                    true,
                    device,
                )?;
                (LayerGroup::Residual(layer1), LayerGroup::Residual(layer2))
            }
            Arch::D | Arch::E => {
                let layer1 = ConvLayer::new(self.layers[0], ch[0], ch[0], 1, 1, device);
                let layer2 = ConvLayer::new(self.layers[1], ch[0], ch[1], 2, 1, device);
                (LayerGroup::Conv(layer1), LayerGroup::Conv(layer2))
            }
        };

        let layer3 = ResidualLayer::new(
            &self.block,
            self.layers[2],
            layer2.out_channels(),
            ch[2],
            2,
            1,
            true,
            true,
            device,
        )?;
        let layer4 = ResidualLayer::new(
            &self.block,
            self.layers[3],
            layer3.out_channels(),
            ch[3],
            2,
            1,
            true,
            true,
            device,
        )?;
        let layer5 = ResidualLayer::new(
            &self.block,
            self.layers[4],
            layer4.out_channels(),
            ch[4],
            1,
            2,
            false,
            true,
            device,
        )?;

        let mut out_dim = layer5.out_channels();
        let layer6 = if self.layers[5] == 0 {
            None
        } else {
            let layer = ResidualLayer::new(
                &self.block,
                self.layers[5],
                out_dim,
                ch[5],
                1,
                4,
                false,
                true,
                device,
            )?;
            out_dim = layer.out_channels();
            Some(layer)
        };

        let layer7 = if self.layers[6] == 0 {
            None
        } else {
            let layer = self.tail_group(self.layers[6], out_dim, ch[6], 2, device)?;
            out_dim = layer.out_channels();
            Some(layer)
        };
        let layer8 = if self.layers[7] == 0 {
            None
        } else {
            let layer = self.tail_group(self.layers[7], out_dim, ch[7], 1, device)?;
            out_dim = layer.out_channels();
            Some(layer)
        };

        let layer9 = match self.arch {
            Arch::E => Some(ResInception::new(out_dim, 1, device)),
            Arch::C | Arch::D => None,
        };

        let head = match self.num_classes {
            Some(num_classes) => Some(match self.output {
                OutputMode::Classification => {
                    ClassifierHead::Pooled(PooledHead::new(out_dim, num_classes, device))
                }
                OutputMode::Dense => {
                    ClassifierHead::Dense(classifier_conv(out_dim, num_classes, device))
                }
            }),
            None => None,
        };

        Ok(Drn {
            stem,
            layer1,
            layer2,
            layer3,
            layer4,
            layer5,
            layer6,
            layer7,
            layer8,
            layer9,
            head,
            out_dim,
        })
    }

    /// Builds one of the non-residual tail groups (layer7/layer8): basic blocks
    /// without the residual add for C, a plain convolution stack for D/E.
    fn tail_group<B: Backend>(
        &self,
        num_blocks: usize,
        in_channels: usize,
        out_channels: usize,
        dilation: usize,
        device: &Device<B>,
    ) -> DrnResult<LayerGroup<B>> {
        match self.arch {
            Arch::C => Ok(LayerGroup::Residual(ResidualLayer::new(
                &BlockKind::Basic,
                num_blocks,
                in_channels,
                out_channels,
                1,
                dilation,
                false,
                false,
                device,
            )?)),
            Arch::D | Arch::E => Ok(LayerGroup::Conv(ConvLayer::new(
                num_blocks,
                in_channels,
                out_channels,
                1,
                dilation,
                device,
            ))),
        }
    }
}

/// A C/D/E-variant dilated residual network.
#[derive(Module, Debug)]
pub struct Drn<B: Backend> {
    stem: ConvStem<B>,
    layer1: LayerGroup<B>,
    layer2: LayerGroup<B>,
    layer3: ResidualLayer<B>,
    layer4: ResidualLayer<B>,
    layer5: ResidualLayer<B>,
    layer6: Option<ResidualLayer<B>>,
    layer7: Option<LayerGroup<B>>,
    layer8: Option<LayerGroup<B>>,
    layer9: Option<ResInception<B>>,
    head: Option<ClassifierHead<B>>,
    out_dim: usize,
}

impl<B: Backend> Drn<B> {
    /// Runs the classifier over the input image.
    ///
    /// # Errors
    ///
    /// Returns `DrnError::MissingClassifier` if the model was built headless.
    pub fn forward(&self, input: Tensor<B, 4>) -> DrnResult<DrnOutput<B>> {
        let (features, _) = self.run(input, false);
        self.classify(features)
    }

    /// Like [`Self::forward`], additionally returning every layer group's
    /// output as an ordered list of multi-scale features.
    pub fn forward_with_middle(
        &self,
        input: Tensor<B, 4>,
    ) -> DrnResult<(DrnOutput<B>, Vec<Tensor<B, 4>>)> {
        let (features, middle) = self.run(input, true);
        Ok((self.classify(features)?, middle))
    }

    /// Runs the feature extractor only, returning the final feature map.
    pub fn forward_features(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.run(input, false).0
    }

    /// Channel count of the final feature map.
    pub fn out_channels(&self) -> usize {
        self.out_dim
    }

    fn classify(&self, features: Tensor<B, 4>) -> DrnResult<DrnOutput<B>> {
        match &self.head {
            Some(ClassifierHead::Pooled(head)) => Ok(DrnOutput::Scores(head.forward(features))),
            Some(ClassifierHead::Dense(fc)) => Ok(DrnOutput::Map(fc.forward(features))),
            None => Err(DrnError::MissingClassifier),
        }
    }

    fn run(&self, input: Tensor<B, 4>, collect: bool) -> (Tensor<B, 4>, Vec<Tensor<B, 4>>) {
        let mut middle = Vec::new();
        let push = |x: &Tensor<B, 4>, middle: &mut Vec<Tensor<B, 4>>| {
            if collect {
                middle.push(x.clone());
            }
        };

        let x = self.stem.forward(input);

        let x = self.layer1.forward(x);
        push(&x, &mut middle);
        let x = self.layer2.forward(x);
        push(&x, &mut middle);
        let x = self.layer3.forward(x);
        push(&x, &mut middle);
        let x = self.layer4.forward(x);
        push(&x, &mut middle);
        let x = self.layer5.forward(x);
        push(&x, &mut middle);

        let x = match &self.layer6 {
            Some(layer) => {
                let x = layer.forward(x);
                push(&x, &mut middle);
                x
            }
            None => x,
        };
        let x = match &self.layer7 {
            Some(layer) => {
                let x = layer.forward(x);
                push(&x, &mut middle);
                x
            }
            None => x,
        };
        let x = match &self.layer8 {
            Some(layer) => {
                let x = layer.forward(x);
                push(&x, &mut middle);
                x
            }
            None => x,
        };
        let x = match &self.layer9 {
            Some(layer) => {
                let x = layer.forward(x);
                push(&x, &mut middle);
                x
            }
            None => x,
        };

        (x, middle)
    }
}

/// Global average pooling followed by a linear classifier (DRN-A head).
#[derive(Module, Debug)]
pub struct PooledLinear<B: Backend> {
    pool: AdaptiveAvgPool2d,
    fc: Linear<B>,
}

impl<B: Backend> PooledLinear<B> {
    fn new(in_channels: usize, num_classes: usize, device: &Device<B>) -> Self {
        let pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let fc = LinearConfig::new(in_channels, num_classes).init(device);
        Self { pool, fc }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let out = self.pool.forward(input);
        self.fc.forward(out.flatten(1, 3))
    }
}

impl DrnAConfig {
    /// Initializes a `DrnA` backbone with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> DrnResult<DrnA<B>> {
        self.validate()?;

        let stem = ConvStem::new(3, 64, 2, device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let layer1 =
            ResidualLayer::new_flat(&self.block, self.layers[0], 64, 64, 1, 1, device);
        let layer2 = ResidualLayer::new_flat(
            &self.block,
            self.layers[1],
            layer1.out_channels(),
            128,
            2,
            1,
            device,
        );
        // The last two groups keep stride 1 and dilate instead.
        let layer3 = ResidualLayer::new_flat(
            &self.block,
            self.layers[2],
            layer2.out_channels(),
            256,
            1,
            2,
            device,
        );
        let layer4 = ResidualLayer::new_flat(
            &self.block,
            self.layers[3],
            layer3.out_channels(),
            512,
            1,
            4,
            device,
        );

        let out_dim = layer4.out_channels();
        let head = self
            .num_classes
            .map(|num_classes| PooledLinear::new(out_dim, num_classes, device));

        Ok(DrnA {
            stem,
            maxpool,
            layer1,
            layer2,
            layer3,
            layer4,
            head,
            out_dim,
        })
    }
}

/// A DRN-A backbone: a ResNet whose last two groups dilate instead of striding.
#[derive(Module, Debug)]
pub struct DrnA<B: Backend> {
    stem: ConvStem<B>,
    maxpool: MaxPool2d,
    layer1: ResidualLayer<B>,
    layer2: ResidualLayer<B>,
    layer3: ResidualLayer<B>,
    layer4: ResidualLayer<B>,
    head: Option<PooledLinear<B>>,
    out_dim: usize,
}

impl<B: Backend> DrnA<B> {
    /// Runs the classifier over the input image.
    ///
    /// # Errors
    ///
    /// Returns `DrnError::MissingClassifier` if the model was built headless.
    pub fn forward(&self, input: Tensor<B, 4>) -> DrnResult<Tensor<B, 2>> {
        let features = self.forward_features(input);
        match &self.head {
            Some(head) => Ok(head.forward(features)),
            None => Err(DrnError::MissingClassifier),
        }
    }

    /// Runs the feature extractor only, returning the final feature map.
    pub fn forward_features(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.stem.forward(input);
        let x = self.maxpool.forward(x);
        let x = self.layer1.forward(x);
        let x = self.layer2.forward(x);
        let x = self.layer3.forward(x);
        self.layer4.forward(x)
    }

    /// Channel count of the final feature map.
    pub fn out_channels(&self) -> usize {
        self.out_dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn classification_mode_yields_class_scores() {
        let device = Default::default();
        let model = DrnConfig::drn_d_22()
            .with_num_classes(Some(10))
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::random([1, 3, 224, 224], burn::tensor::Distribution::Default, &device);
        match model.forward(input).unwrap() {
            DrnOutput::Scores(scores) => assert_eq!(scores.dims(), [1, 10]),
            DrnOutput::Map(_) => panic!("Expected pooled scores"),
        }
    }

    #[test]
    fn dense_mode_preserves_spatial_dims() {
        let device = Default::default();
        let model = DrnConfig::drn_d_22()
            .with_num_classes(Some(19))
            .with_output(OutputMode::Dense)
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::random([1, 3, 224, 224], burn::tensor::Distribution::Default, &device);
        match model.forward(input).unwrap() {
            // Total downsampling factor is fixed at 8 regardless of class count.
            DrnOutput::Map(map) => assert_eq!(map.dims(), [1, 19, 28, 28]),
            DrnOutput::Scores(_) => panic!("Expected a dense map"),
        }
    }

    #[test]
    fn middle_features_cover_every_present_group() {
        let device = Default::default();
        let model = DrnConfig::drn_d_22()
            .with_num_classes(Some(4))
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::random([1, 3, 64, 64], burn::tensor::Distribution::Default, &device);
        let (_, middle) = model.forward_with_middle(input).unwrap();

        // drn_d_22 has all eight groups configured.
        assert_eq!(middle.len(), 8);
        assert_eq!(middle[0].dims(), [1, 16, 64, 64]);
        assert_eq!(middle[7].dims(), [1, 512, 8, 8]);
    }

    #[test]
    fn zero_count_groups_are_omitted() {
        let device = Default::default();
        let config = DrnConfig::new(Arch::D, BlockKind::Basic, [1, 1, 2, 2, 2, 0, 0, 0]);
        let model = config
            .with_num_classes(Some(4))
            .init::<TestBackend>(&device)
            .unwrap();

        assert!(model.layer6.is_none());
        assert!(model.layer7.is_none());
        assert!(model.layer8.is_none());

        let input = Tensor::random([1, 3, 64, 64], burn::tensor::Distribution::Default, &device);
        let (_, middle) = model.forward_with_middle(input).unwrap();
        assert_eq!(middle.len(), 5);
    }

    #[test]
    fn variant_e_appends_inception_module() {
        let device = Default::default();
        let model = DrnConfig::drn_e_22()
            .with_num_classes(Some(4))
            .init::<TestBackend>(&device)
            .unwrap();
        assert!(model.layer9.is_some());

        let model = DrnConfig::drn_d_22()
            .with_num_classes(Some(4))
            .init::<TestBackend>(&device)
            .unwrap();
        assert!(model.layer9.is_none());
    }

    #[test]
    fn variant_c_forward_shapes() {
        let device = Default::default();
        let model = DrnConfig::drn_c_26()
            .with_num_classes(Some(7))
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::random([1, 3, 64, 64], burn::tensor::Distribution::Default, &device);
        match model.forward(input).unwrap() {
            DrnOutput::Scores(scores) => assert_eq!(scores.dims(), [1, 7]),
            DrnOutput::Map(_) => panic!("Expected pooled scores"),
        }
    }

    #[test]
    fn headless_model_rejects_forward() {
        let device = Default::default();
        let model = DrnConfig::drn_d_22()
            .with_num_classes(None)
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::random([1, 3, 64, 64], burn::tensor::Distribution::Default, &device);
        match model.forward(input.clone()) {
            Err(DrnError::MissingClassifier) => {}
            _ => panic!("Expected MissingClassifier error"),
        }

        // Feature extraction still works; 512 channels at 1/8 resolution.
        assert_eq!(model.forward_features(input).dims(), [1, 512, 8, 8]);
    }

    #[test]
    fn drn_a_classification_shapes() {
        let device = Default::default();
        let model = DrnAConfig::drn_a_18()
            .with_num_classes(Some(10))
            .init::<TestBackend>(&device)
            .unwrap();

        let input = Tensor::random([1, 3, 224, 224], burn::tensor::Distribution::Default, &device);
        assert_eq!(model.forward(input.clone()).unwrap().dims(), [1, 10]);
        // Dilation holds the final two groups at 1/8 resolution.
        assert_eq!(model.forward_features(input).dims(), [1, 512, 28, 28]);
    }
}
