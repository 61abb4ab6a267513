#[macro_use]
extern crate derive_new;

pub mod classify;
pub mod error;
pub mod export;
pub mod logger;
pub mod mlir;
pub mod model;
pub mod trace;
