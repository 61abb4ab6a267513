pub(crate) mod adaptive_avg_pool2d;
pub(crate) mod conv2d;
pub(crate) mod flatten;
pub(crate) mod linear;
pub(crate) mod max_pool2d;
pub(crate) mod relu;

#[cfg(test)]
pub(crate) mod test;

pub use adaptive_avg_pool2d::AdaptiveAvgPool2dNode;
pub use conv2d::Conv2dNode;
pub use flatten::FlattenNode;
pub use linear::LinearNode;
pub use max_pool2d::MaxPool2dNode;
pub use relu::ReluNode;

use super::{Constant, Emitter, Operand};
use crate::error::ExportError;

/// Lowering of one traced operation.
pub trait NodeCodegen: std::fmt::Debug {
    /// Values consumed by the operation, in operand order.
    fn inputs(&self) -> Vec<&Operand>;

    /// Value produced by the operation.
    fn output(&self) -> &Operand;

    /// Weights captured by the operation.
    fn constants(&self) -> Vec<&Constant> {
        vec![]
    }

    /// Emit the linalg-on-tensors form and return the SSA name of the result.
    fn linalg(&self, emitter: &mut Emitter) -> Result<String, ExportError>;

    /// Emit the torch dialect form and return the SSA name of the result.
    fn torch(&self, emitter: &mut Emitter) -> Result<String, ExportError>;

    fn into_node(self) -> Node;
}

#[derive(Debug, Clone)]
pub enum Node {
    Conv2d(Conv2dNode),
    Relu(ReluNode),
    MaxPool2d(MaxPool2dNode),
    AdaptiveAvgPool2d(AdaptiveAvgPool2dNode),
    Flatten(FlattenNode),
    Linear(LinearNode),
}

macro_rules! match_all {
    ($self:expr, $node:ident => $body:expr) => {{
        match $self {
            Node::Conv2d($node) => $body,
            Node::Relu($node) => $body,
            Node::MaxPool2d($node) => $body,
            Node::AdaptiveAvgPool2d($node) => $body,
            Node::Flatten($node) => $body,
            Node::Linear($node) => $body,
        }
    }};
}

impl Node {
    pub fn name(&self) -> &'static str {
        match self {
            Node::Conv2d(_) => "conv2d",
            Node::Relu(_) => "relu",
            Node::MaxPool2d(_) => "max_pool2d",
            Node::AdaptiveAvgPool2d(_) => "adaptive_avg_pool2d",
            Node::Flatten(_) => "flatten",
            Node::Linear(_) => "linear",
        }
    }
}

impl NodeCodegen for Node {
    fn inputs(&self) -> Vec<&Operand> {
        match_all!(self, node => node.inputs())
    }

    fn output(&self) -> &Operand {
        match_all!(self, node => node.output())
    }

    fn constants(&self) -> Vec<&Constant> {
        match_all!(self, node => node.constants())
    }

    fn linalg(&self, emitter: &mut Emitter) -> Result<String, ExportError> {
        match_all!(self, node => node.linalg(emitter))
    }

    fn torch(&self, emitter: &mut Emitter) -> Result<String, ExportError> {
        match_all!(self, node => node.torch(emitter))
    }

    fn into_node(self) -> Node {
        self
    }
}

pub(crate) fn to_i64(values: &[usize]) -> Vec<i64> {
    values.iter().map(|value| *value as i64).collect()
}
