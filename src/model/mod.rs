pub mod alexnet;
pub mod weights;

pub use alexnet::*;
pub use weights::*;
