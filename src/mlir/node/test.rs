use super::NodeCodegen;
use crate::mlir::{Graph, Operand, OutputType, ResourceMode, TensorType, ValueId};

pub(crate) fn operand(id: usize, shape: &[usize]) -> Operand {
    Operand::new(ValueId(id), TensorType::new(shape))
}

/// Emit a module holding a single node fed by the function argument.
pub(crate) fn codegen<N: NodeCodegen>(
    node: N,
    output_type: OutputType,
    mode: ResourceMode,
) -> String {
    let mut graph = Graph::default();
    graph.register_input(node.inputs()[0].clone());
    graph.register_output(node.output().clone());
    graph.register(node);

    graph
        .codegen(output_type, "forward", mode)
        .unwrap()
        .to_string()
}
