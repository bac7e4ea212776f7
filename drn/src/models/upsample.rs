//! Fixed bilinear upsampling via a grouped transposed convolution.
//!
//! The kernel implements exact bilinear interpolation and is frozen at
//! construction; each class channel gets an identical, independent filter so
//! upsampling never mixes classes.

use burn::{
    module::{Module as _, Param},
    nn::conv::{ConvTranspose2d, ConvTranspose2dConfig},
    prelude::*,
};

/// Computes bilinear-interpolation weights of shape `[channels, 1, size, size]`.
///
/// The footprint is separable: with f = ceil(size / 2) and center
/// c = (2f - 1 - f mod 2) / (2f), weight(i, j) = (1 - |i/f - c|) * (1 - |j/f - c|).
/// It is built once as the outer product of the 1-D profile and replicated to
/// every channel, which guarantees the per-channel footprints are identical.
pub fn bilinear_kernel<B: Backend>(
    channels: usize,
    size: usize,
    device: &Device<B>,
) -> Tensor<B, 4> {
    let f = size.div_ceil(2);
    let c = (2 * f - 1 - f % 2) as f32 / (2 * f) as f32;

    let mut profile = vec![0.0f32; size];
    for (i, w) in profile.iter_mut().enumerate() {
        *w = 1.0 - (i as f32 / f as f32 - c).abs();
    }

    let profile = Tensor::<B, 1>::from_floats(profile.as_slice(), device).unsqueeze::<2>();
    let footprint = profile.clone().transpose().matmul(profile);

    footprint.unsqueeze::<4>().repeat(&[channels, 1, 1, 1])
}

/// Upsamples by a fixed integer factor with a frozen bilinear kernel.
///
/// The transposed convolution is grouped per channel (no cross-channel mixing)
/// and its weight takes no gradient, so a training step leaves it untouched.
#[derive(Module, Debug)]
pub struct BilinearUpsample<B: Backend> {
    conv: ConvTranspose2d<B>,
}

impl<B: Backend> BilinearUpsample<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.conv.forward(input)
    }

    /// Create a new BilinearUpsample for the given channel count and factor.
    pub fn new(channels: usize, factor: usize, device: &Device<B>) -> Self {
        let size = factor * 2;
        let mut conv = ConvTranspose2dConfig::new([channels, channels], [size, size])
            .with_stride([factor, factor])
            .with_padding([factor / 2, factor / 2])
            .with_groups(channels)
            .with_bias(false)
            .init(device);
        conv.weight = Param::from_tensor(bilinear_kernel(channels, size, device));

        Self {
            conv: conv.no_grad(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray<f32>;

    #[test]
    fn kernel_is_symmetric() {
        let device = Default::default();
        let size = 16;
        let kernel = bilinear_kernel::<TestBackend>(1, size, &device);

        let flipped = kernel.clone().flip([2, 3]);
        let diff = (kernel - flipped).abs().max().into_scalar();
        assert!(diff < 1e-7);
    }

    #[test]
    fn kernel_is_identical_across_channels() {
        let device = Default::default();
        let kernel = bilinear_kernel::<TestBackend>(4, 16, &device);

        let first = kernel.clone().slice([0..1]);
        for channel in 1..4 {
            let other = kernel.clone().slice([channel..channel + 1]);
            let diff = (first.clone() - other).abs().max().into_scalar();
            assert_eq!(diff, 0.0);
        }
    }

    #[test]
    fn upsamples_by_the_configured_factor() {
        let device = Default::default();
        let up = BilinearUpsample::<TestBackend>::new(3, 8, &device);

        let input = Tensor::random([1, 3, 28, 28], burn::tensor::Distribution::Default, &device);
        let output = up.forward(input);

        assert_eq!(output.dims(), [1, 3, 224, 224]);
    }

    #[test]
    fn kernel_takes_no_gradient() {
        let device = Default::default();
        let up = BilinearUpsample::<Autodiff<TestBackend>>::new(2, 8, &device);

        let input = Tensor::<Autodiff<TestBackend>, 4>::random(
            [1, 2, 8, 8],
            burn::tensor::Distribution::Default,
            &device,
        )
        .require_grad();
        let output = up.forward(input.clone());
        let grads = output.sum().backward();

        assert!(up.conv.weight.grad(&grads).is_none());
        assert!(input.grad(&grads).is_some());
    }
}
