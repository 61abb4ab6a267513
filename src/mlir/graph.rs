use super::{
    Emitter, MlirModule, Operand, OutputType, ResourceMode,
    node::{Node, NodeCodegen},
};
use crate::error::ExportError;

/// Traced operations in execution order, with the function input and output.
#[derive(Default, Debug)]
pub struct Graph {
    nodes: Vec<Node>,
    input: Option<Operand>,
    output: Option<Operand>,
}

impl Graph {
    /// The node must be registered in the same order they will be executed in the forward pass.
    pub fn register<N: NodeCodegen>(&mut self, node: N) {
        self.nodes.push(node.into_node());
    }

    pub fn register_input(&mut self, input: Operand) {
        self.input = Some(input);
    }

    pub fn register_output(&mut self, output: Operand) {
        self.output = Some(output);
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn input(&self) -> Option<&Operand> {
        self.input.as_ref()
    }

    pub fn output(&self) -> Option<&Operand> {
        self.output.as_ref()
    }

    /// Number of scalar weights captured by the graph.
    pub fn num_params(&self) -> usize {
        self.nodes
            .iter()
            .flat_map(|node| node.constants())
            .map(|constant| constant.ty.num_elements())
            .sum()
    }

    /// Lower every node into a function named `func_name`.
    pub fn codegen(
        &self,
        output_type: OutputType,
        func_name: &str,
        mode: ResourceMode,
    ) -> Result<MlirModule, ExportError> {
        let (input, output) = match (&self.input, &self.output) {
            (Some(input), Some(output)) => (input, output),
            _ => return Err(ExportError::EmptyGraph),
        };

        let mut emitter = Emitter::new(mode);
        emitter.bind_argument(0, input);

        for node in self.nodes.iter() {
            let result = match output_type {
                OutputType::LinalgOnTensors => node.linalg(&mut emitter)?,
                OutputType::Torch => node.torch(&mut emitter)?,
            };
            log::trace!("Lowered {} to {result}", node.name());
            emitter.bind(node.output(), result);
        }

        emitter.finish(output_type, func_name, &input.ty, output)
    }
}
