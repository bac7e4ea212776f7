//! # Model Architectures
//!
//! DRN backbones and the segmentation model built on them:
//!
//! - `blocks`: Basic and Bottleneck residual blocks with per-stage dilation.
//! - `layers`: layer-group builders (residual, plain convolution, stem).
//! - `inception`: the residual inception module of the E variant.
//! - `drn`: the C/D/E and A backbone assemblies with their classifier heads.
//! - `upsample`: frozen bilinear upsampling via grouped transposed convolution.
//! - `segmentation`: the dense segmentation head.

pub mod blocks;
pub mod drn;
pub mod inception;
pub mod layers;
pub mod segmentation;
pub mod upsample;

pub use drn::{ClassifierHead, Drn, DrnA, DrnOutput};
pub use segmentation::{build_seg_backbone, DrnSeg, SegBackbone, Upsampler};
pub use upsample::{bilinear_kernel, BilinearUpsample};
