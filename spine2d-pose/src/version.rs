//! Spine version whose pose semantics this crate reproduces.

/// Spine major version of the mixing and constraint rules.
pub const SPINE_MAJOR: u32 = 4;

/// Spine minor version of the mixing and constraint rules.
pub const SPINE_MINOR: u32 = 0;
