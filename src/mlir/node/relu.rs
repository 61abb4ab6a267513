use super::{Node, NodeCodegen};
use crate::{
    error::ExportError,
    mlir::{Emitter, Operand},
};

#[derive(Debug, Clone, new)]
pub struct ReluNode {
    pub input: Operand,
    pub output: Operand,
}

impl NodeCodegen for ReluNode {
    fn inputs(&self) -> Vec<&Operand> {
        vec![&self.input]
    }

    fn output(&self) -> &Operand {
        &self.output
    }

    fn linalg(&self, emitter: &mut Emitter) -> Result<String, ExportError> {
        let input = emitter.value(&self.input)?;
        let rank = self.input.ty.rank();
        let ty = self.output.ty.builtin();
        let map = emitter.identity_map(rank);
        let zero = emitter.float(0.0);
        let empty = emitter.empty(&self.output.ty);

        let name = emitter.anonymous();
        emitter.line(format!(
            "{name} = linalg.generic {{indexing_maps = [{map}, {map}], iterator_types = {}}} ins({input} : {}) outs({empty} : {ty}) {{",
            Emitter::parallel_iterators(rank),
            self.input.ty.builtin(),
        ));
        let args = emitter.open_region(&[("in", "f32"), ("out", "f32")]);
        let cmp = emitter.anonymous();
        emitter.line(format!("{cmp} = arith.cmpf ugt, {}, {zero} : f32", args[0]));
        let select = emitter.anonymous();
        emitter.line(format!(
            "{select} = arith.select {cmp}, {}, {zero} : f32",
            args[0]
        ));
        emitter.line(format!("linalg.yield {select} : f32"));
        emitter.close_region(&format!(" -> {ty}"));

        Ok(name)
    }

    fn torch(&self, emitter: &mut Emitter) -> Result<String, ExportError> {
        let input = emitter.value(&self.input)?;
        let name = emitter.anonymous();
        emitter.line(format!(
            "{name} = torch.aten.relu {input} : {} -> {}",
            self.input.ty.torch(),
            self.output.ty.torch()
        ));

        Ok(name)
    }

    fn into_node(self) -> Node {
        Node::Relu(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlir::{
        OutputType, ResourceMode,
        node::test::{codegen, operand},
    };

    fn node() -> ReluNode {
        ReluNode::new(operand(0, &[1, 8, 5, 5]), operand(1, &[1, 8, 5, 5]))
    }

    #[test]
    fn linalg_generic_with_select() {
        let text = codegen(node(), OutputType::LinalgOnTensors, ResourceMode::Elide);

        assert!(text.starts_with("#map = affine_map<(d0, d1, d2, d3) -> (d0, d1, d2, d3)>\n"));
        assert!(text.contains(
            "%1 = linalg.generic {indexing_maps = [#map, #map], iterator_types = [\"parallel\", \"parallel\", \"parallel\", \"parallel\"]} ins(%arg0 : tensor<1x8x5x5xf32>) outs(%0 : tensor<1x8x5x5xf32>) {"
        ));
        assert!(text.contains("^bb0(%in: f32, %out: f32):"));
        assert!(text.contains("%2 = arith.cmpf ugt, %in, %cst : f32"));
        assert!(text.contains("%3 = arith.select %2, %in, %cst : f32"));
        assert!(text.contains("linalg.yield %3 : f32"));
        assert!(text.contains("} -> tensor<1x8x5x5xf32>"));
        assert!(text.contains("return %1 : tensor<1x8x5x5xf32>"));
    }

    #[test]
    fn torch_relu() {
        let text = codegen(node(), OutputType::Torch, ResourceMode::Elide);

        assert!(text.contains(
            "%0 = torch.aten.relu %arg0 : !torch.vtensor<[1,8,5,5],f32> -> !torch.vtensor<[1,8,5,5],f32>"
        ));
        assert!(text.contains("return %0 : !torch.vtensor<[1,8,5,5],f32>"));
    }
}
