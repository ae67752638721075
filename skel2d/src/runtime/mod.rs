mod animation;
mod animation_state;
mod physics;
mod skeleton;

pub use animation::*;
pub use animation_state::*;
pub use skeleton::*;




#[cfg(test)]
mod animation_state_tests;

#[cfg(test)]
mod animation_state_mixing_tests;
