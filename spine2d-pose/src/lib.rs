//! Skeletal pose core with Spine 4.0 semantics.
//!
//! Bones form a transform graph, timelines key their local poses, constraints (IK, transform,
//! path) adjust world transforms, and [`AnimationState`] schedules and crossfades animations on
//! layered tracks. Loading and rendering are left to other crates; the data model derives
//! `serde` traits behind the `serde` feature.

#![forbid(unsafe_code)]

mod error;
mod model;
mod runtime;
mod version;

pub use error::*;
pub use model::*;
pub use runtime::*;
pub use version::*;


#[cfg(all(test, feature = "serde"))]
mod serde_tests;
