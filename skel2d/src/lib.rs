//! Skeletal 2D animation runtime: bone hierarchies, animation mixing and batched rendering.
//!
//! The crate is renderer-agnostic. Texture creation is delegated to a [`TextureLoader`] and the
//! output of [`SkeletonRenderer::draw`] is plain vertex/index data grouped into batches.

#![forbid(unsafe_code)]

mod atlas;
mod builder;
mod convention;
mod error;
mod geometry;
mod model;
mod render;
mod runtime;
mod version;

#[cfg(feature = "json")]
pub mod json;

#[cfg(feature = "binary")]
pub mod binary;

pub use atlas::*;
pub use builder::*;
pub use convention::*;
pub use error::*;
pub use model::*;
pub use render::*;
pub use runtime::*;
pub use version::*;


#[cfg(test)]
mod builder_tests;

#[cfg(test)]
mod render_tests;
