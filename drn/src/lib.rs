//! Dilated Residual Networks for image classification and dense semantic
//! segmentation, implemented with the Burn deep learning framework.
//!
//! The A/C/D/E architecture variants trade late-stage striding for dilation,
//! keeping the final feature map at 1/8 of the input resolution. `DrnSeg`
//! wraps any preset backbone with a 1x1 class projection and bilinear
//! upsampling for per-pixel prediction.

mod config;
mod error;
mod models;

#[cfg(test)]
mod tests;

pub use config::*;
pub use error::{DrnError, DrnResult};
pub use models::{
    bilinear_kernel, build_seg_backbone, BilinearUpsample, ClassifierHead, Drn, DrnA, DrnOutput,
    DrnSeg, SegBackbone, Upsampler,
};
