//! MLIR text generation for traced graphs.
//!
//! A [`Graph`] is lowered node by node through an [`Emitter`], which tracks SSA
//! names, affine map aliases and weight blobs, into an [`MlirModule`].

mod emitter;
mod graph;
mod module;
mod resource;
mod scope;
mod ty;

pub mod node;

pub use emitter::*;
pub use graph::*;
pub use module::*;
pub use resource::*;
pub use scope::*;
pub use ty::*;
