//! Configuration module for DRN models.
//!
//! Organized into two submodules:
//! - `core`: the main configuration structures
//! - `enums`: the enumeration types used in configurations

pub mod core;
pub mod enums;

pub use core::{DrnAConfig, DrnConfig, DrnSegConfig};
pub use enums::{Arch, BlockKind, ModelName, OutputMode, UpsampleMode};
