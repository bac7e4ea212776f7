//! Residual inception module appended after the last layer group of the E
//! variant. Four parallel branches are concatenated back to the input width so
//! the residual add needs no projection at stride 1.

use burn::{
    nn::{
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use super::{
    blocks::{conv1x1_config, conv3x3_config, Downsample},
    layers::ConvBnRelu,
};

/// Multi-branch residual inception block.
///
/// Branch widths are derived from the input: 1x1 -> in/4, 3x3 -> in/2,
/// double-3x3 -> in/8, pooled 1x1 -> in/8, so the concatenation preserves the
/// channel count.
#[derive(Module, Debug)]
pub struct ResInception<B: Backend> {
    b1: ConvBnRelu<B>,
    b2_reduce: ConvBnRelu<B>,
    b2: ConvBnRelu<B>,
    b3_reduce: ConvBnRelu<B>,
    b3_mid: ConvBnRelu<B>,
    b3: ConvBnRelu<B>,
    b4_pool: MaxPool2d,
    b4: ConvBnRelu<B>,
    downsample: Option<Downsample<B>>,
    relu: Relu,
}

impl<B: Backend> ResInception<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let y1 = self.b1.forward(input.clone());
        let y2 = self.b2.forward(self.b2_reduce.forward(input.clone()));
        let y3 = self
            .b3
            .forward(self.b3_mid.forward(self.b3_reduce.forward(input.clone())));
        let y4 = self.b4.forward(self.b4_pool.forward(input.clone()));

        let out = Tensor::cat(vec![y1, y2, y3, y4], 1);
        let out = match &self.downsample {
            Some(downsample) => out + downsample.forward(input),
            None => out + input,
        };
        self.relu.forward(out)
    }

    /// Create a new ResInception block.
    pub fn new(in_channels: usize, stride: usize, device: &Device<B>) -> Self {
        let n1x1 = in_channels / 4;
        let n3x3_reduce = in_channels / 4;
        let n3x3 = in_channels / 2;
        let n5x5_reduce = in_channels / 16;
        let n5x5 = in_channels / 8;
        let pool_planes = in_channels / 8;

        let b1 = ConvBnRelu::init(
            conv1x1_config(in_channels, n1x1, stride),
            BatchNormConfig::new(n1x1),
            device,
        );

        let b2_reduce = ConvBnRelu::init(
            conv1x1_config(in_channels, n3x3_reduce, stride),
            BatchNormConfig::new(n3x3_reduce),
            device,
        );
        let b2 = ConvBnRelu::init(
            conv3x3_config(n3x3_reduce, n3x3, 1, 1),
            BatchNormConfig::new(n3x3),
            device,
        );

        let b3_reduce = ConvBnRelu::init(
            conv1x1_config(in_channels, n5x5_reduce, stride),
            BatchNormConfig::new(n5x5_reduce),
            device,
        );
        let b3_mid = ConvBnRelu::init(
            conv3x3_config(n5x5_reduce, n5x5, 1, 1),
            BatchNormConfig::new(n5x5),
            device,
        );
        let b3 = ConvBnRelu::init(
            conv3x3_config(n5x5, n5x5, 1, 1),
            BatchNormConfig::new(n5x5),
            device,
        );

        let b4_pool = MaxPool2dConfig::new([3, 3])
            .with_strides([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();
        let b4 = ConvBnRelu::init(
            conv1x1_config(in_channels, pool_planes, 1),
            BatchNormConfig::new(pool_planes),
            device,
        );

        let downsample =
            (stride > 1).then(|| Downsample::new(in_channels, in_channels, stride, device));

        Self {
            b1,
            b2_reduce,
            b2,
            b3_reduce,
            b3_mid,
            b3,
            b4_pool,
            b4,
            downsample,
            relu: Relu::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn branches_concatenate_back_to_input_width() {
        let device = Default::default();
        let block = ResInception::<TestBackend>::new(64, 1, &device);

        let input = Tensor::random([1, 64, 14, 14], burn::tensor::Distribution::Default, &device);
        let output = block.forward(input);

        assert_eq!(output.dims(), [1, 64, 14, 14]);
    }
}
