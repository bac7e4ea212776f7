//! Core configuration structures for DRN models.
//!
//! The configs here describe architectures declaratively; the corresponding
//! `init` methods live next to the modules they build (see `models::drn` and
//! `models::segmentation`).

use burn::prelude::*;

use super::enums::*;
use crate::error::{DrnError, DrnResult};

/// Configuration for the C/D/E dilated residual network backbones.
///
/// `layers` gives the block count of each of the eight layer groups
/// (layer1..layer8); a count of 0 in the last three entries omits that group
/// entirely. `channels` is the per-group output channel schedule.
#[derive(Config, Debug)]
pub struct DrnConfig {
    /// The architecture variant.
    pub arch: Arch,
    /// The block topology used in the dilated groups (layer3..layer6).
    pub block: BlockKind,
    /// Block count per layer group.
    pub layers: [usize; 8],
    /// Output channel schedule per layer group.
    #[config(default = "[16, 32, 64, 128, 256, 512, 512, 512]")]
    pub channels: [usize; 8],
    /// Number of output classes; `None` builds a headless feature extractor.
    #[config(default = "Some(1000)")]
    pub num_classes: Option<usize>,
    /// The classifier output mode.
    #[config(default = "OutputMode::Classification")]
    pub output: OutputMode,
}

impl DrnConfig {
    /// DRN-C-26 preset.
    pub fn drn_c_26() -> Self {
        Self::new(Arch::C, BlockKind::Basic, [1, 1, 2, 2, 2, 2, 1, 1])
    }

    /// DRN-C-42 preset.
    pub fn drn_c_42() -> Self {
        Self::new(Arch::C, BlockKind::Basic, [1, 1, 3, 4, 6, 3, 1, 1])
    }

    /// DRN-D-22 preset.
    pub fn drn_d_22() -> Self {
        Self::new(Arch::D, BlockKind::Basic, [1, 1, 2, 2, 2, 2, 1, 1])
    }

    /// DRN-D-38 preset.
    pub fn drn_d_38() -> Self {
        Self::new(Arch::D, BlockKind::Basic, [1, 1, 3, 4, 6, 3, 1, 1])
    }

    /// DRN-D-54 preset.
    pub fn drn_d_54() -> Self {
        Self::new(Arch::D, BlockKind::Bottleneck, [1, 1, 3, 4, 6, 3, 1, 1])
    }

    /// DRN-E-22 preset.
    pub fn drn_e_22() -> Self {
        Self::new(Arch::E, BlockKind::Basic, [1, 1, 2, 2, 2, 2, 1, 1])
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `DrnError::InvalidConfiguration` if any validation rule is violated.
    pub fn validate(&self) -> DrnResult<()> {
        // layer1..layer5 are mandatory; only layer6..layer8 may be omitted.
        for (i, &count) in self.layers[..5].iter().enumerate() {
            if count == 0 {
                return Err(DrnError::InvalidConfiguration {
                    reason: format!("layer{} must have at least one block", i + 1),
                });
            }
        }

        if self.num_classes == Some(0) {
            return Err(DrnError::InvalidConfiguration {
                reason: "num_classes must be positive; use None for a headless model"
                    .to_string(),
            });
        }

        if self.output == OutputMode::Dense && self.num_classes.is_none() {
            return Err(DrnError::InvalidConfiguration {
                reason: "dense output mode requires num_classes".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration for the DRN-A backbone (a classic ResNet whose last two
/// groups trade striding for dilation).
#[derive(Config, Debug)]
pub struct DrnAConfig {
    /// The residual block topology.
    pub block: BlockKind,
    /// Block count per layer group.
    pub layers: [usize; 4],
    /// Number of output classes; `None` builds a headless feature extractor.
    #[config(default = "Some(1000)")]
    pub num_classes: Option<usize>,
}

impl DrnAConfig {
    /// DRN-A-18 preset.
    pub fn drn_a_18() -> Self {
        Self::new(BlockKind::Basic, [2, 2, 2, 2])
    }

    /// DRN-A-50 preset.
    pub fn drn_a_50() -> Self {
        Self::new(BlockKind::Bottleneck, [3, 4, 6, 3])
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `DrnError::InvalidConfiguration` if any validation rule is violated.
    pub fn validate(&self) -> DrnResult<()> {
        if self.layers.contains(&0) {
            return Err(DrnError::InvalidConfiguration {
                reason: "all four layer groups must have at least one block".to_string(),
            });
        }
        if self.num_classes == Some(0) {
            return Err(DrnError::InvalidConfiguration {
                reason: "num_classes must be positive; use None for a headless model"
                    .to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration for the `DrnSeg` segmentation model.
#[derive(Config, Debug)]
pub struct DrnSegConfig {
    /// The backbone model preset.
    pub model: ModelName,
    /// Number of segmentation classes.
    pub num_classes: usize,
    /// The upsampling stage to restore input resolution.
    #[config(default = "UpsampleMode::Deconvolution")]
    pub upsample: UpsampleMode,
}

impl DrnSegConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `DrnError::InvalidConfiguration` if `num_classes` is zero.
    pub fn validate(&self) -> DrnResult<()> {
        if self.num_classes == 0 {
            return Err(DrnError::InvalidConfiguration {
                reason: "num_classes must be positive".to_string(),
            });
        }
        Ok(())
    }
}
