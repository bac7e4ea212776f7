//! Enumeration types for DRN configuration.

use burn::prelude::*;

use crate::error::{DrnError, DrnResult};

/// The DRN architecture family built by [`DrnConfig`](crate::config::DrnConfig).
///
/// The variants differ only in how the first two layer groups and the optional
/// tail groups (layer7/layer8) are built, and in whether a terminal inception
/// module is appended.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum Arch {
    /// Residual basic blocks in the early groups.
    C,
    /// Plain convolution stacks in the early groups.
    D,
    /// Like `D`, with a terminal multi-branch inception module.
    E,
}

/// The residual block topology used in the dilated layer groups.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum BlockKind {
    /// Two 3x3 convolution stages, expansion 1.
    Basic,
    /// 1x1 / 3x3 / 1x1 stages, expansion 4.
    Bottleneck,
}

impl BlockKind {
    /// Channel-expansion factor of the block: output channels = planes * expansion.
    #[must_use]
    pub const fn expansion(&self) -> usize {
        match self {
            Self::Basic => 1,
            Self::Bottleneck => 4,
        }
    }
}

/// The output mode of the classifier head.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum OutputMode {
    /// Global average pooling followed by a 1x1 classifier, flattened to `[N, C]`.
    Classification,
    /// 1x1 classifier applied per pixel, preserving spatial dims (`[N, C, H', W']`).
    Dense,
}

/// The upsampling stage used by the segmentation head.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum UpsampleMode {
    /// Grouped transposed convolution with a frozen bilinear kernel.
    Deconvolution,
    /// The tensor engine's bilinear interpolation primitive.
    Interpolation,
}

/// Named DRN model presets.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum ModelName {
    DrnA18,
    DrnA50,
    DrnC26,
    DrnC42,
    DrnD22,
    DrnD38,
    DrnD54,
    DrnE22,
}

impl ModelName {
    /// Resolves a model name string (e.g. `"drn_d_22"`) to a preset.
    ///
    /// # Errors
    ///
    /// Returns `DrnError::UnknownModel` if the name is not a known preset.
    pub fn parse(name: &str) -> DrnResult<Self> {
        match name {
            "drn_a_18" => Ok(Self::DrnA18),
            "drn_a_50" => Ok(Self::DrnA50),
            "drn_c_26" => Ok(Self::DrnC26),
            "drn_c_42" => Ok(Self::DrnC42),
            "drn_d_22" => Ok(Self::DrnD22),
            "drn_d_38" => Ok(Self::DrnD38),
            "drn_d_54" => Ok(Self::DrnD54),
            "drn_e_22" => Ok(Self::DrnE22),
            _ => Err(DrnError::UnknownModel {
                name: name.to_string(),
            }),
        }
    }
}
