mod animation;
mod animation_state;
mod ik;
mod path_constraint;
mod skeleton;
mod transform_constraint;

pub use animation::*;
pub use animation_state::*;
pub use ik::IK_CHAIN_ITERATIONS;
pub use path_constraint::PathSample;
pub use skeleton::*;


#[cfg(test)]
mod animation_tests;

#[cfg(test)]
mod animation_state_tests;


#[cfg(test)]
mod transform_constraint_tests;

#[cfg(test)]
mod path_constraint_tests;
