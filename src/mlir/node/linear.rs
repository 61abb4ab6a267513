use super::{Node, NodeCodegen};
use crate::{
    error::ExportError,
    mlir::{Constant, Emitter, Operand, TensorType},
};

/// Fully connected layer, `y = x W^T + b` with `W` shaped `[out, in]`.
#[derive(Debug, Clone, new)]
pub struct LinearNode {
    pub input: Operand,
    pub output: Operand,
    pub weight: Constant,
    pub bias: Option<Constant>,
}

impl NodeCodegen for LinearNode {
    fn inputs(&self) -> Vec<&Operand> {
        vec![&self.input]
    }

    fn output(&self) -> &Operand {
        &self.output
    }

    fn constants(&self) -> Vec<&Constant> {
        let mut constants = vec![&self.weight];
        constants.extend(self.bias.as_ref());
        constants
    }

    fn linalg(&self, emitter: &mut Emitter) -> Result<String, ExportError> {
        if self.input.ty.rank() != 2 {
            return Err(ExportError::Unsupported {
                op: "linear",
                reason: format!(
                    "only rank 2 inputs are lowered to linalg.matmul, got rank {}",
                    self.input.ty.rank()
                ),
            });
        }

        let input = emitter.value(&self.input)?;
        let output_ty = self.output.ty.builtin();
        let [d_output, d_input] = [self.weight.ty.shape[0], self.weight.ty.shape[1]];
        let transposed_ty = TensorType::new([d_input, d_output]);

        let weight = emitter.weight(&self.weight);
        let empty = emitter.empty(&transposed_ty);
        let transposed = emitter.named("transposed");
        emitter.line(format!(
            "{transposed} = linalg.transpose ins({weight} : {}) outs({empty} : {}) permutation = [1, 0]",
            self.weight.ty.builtin(),
            transposed_ty.builtin(),
        ));

        let init = emitter.filled(&self.output.ty, 0.0);
        let matmul = emitter.anonymous();
        emitter.line(format!(
            "{matmul} = linalg.matmul ins({input}, {transposed} : {}, {}) outs({init} : {output_ty}) -> {output_ty}",
            self.input.ty.builtin(),
            transposed_ty.builtin(),
        ));

        let bias = match &self.bias {
            Some(bias) => bias,
            None => return Ok(matmul),
        };

        let bias_value = emitter.weight(bias);
        let identity = emitter.identity_map(2);
        let broadcast = emitter.affine_map("(d0, d1) -> (d1)");
        let empty = emitter.empty(&self.output.ty);
        let name = emitter.anonymous();
        emitter.line(format!(
            "{name} = linalg.generic {{indexing_maps = [{identity}, {broadcast}, {identity}], iterator_types = {}}} ins({matmul}, {bias_value} : {output_ty}, {}) outs({empty} : {output_ty}) {{",
            Emitter::parallel_iterators(2),
            bias.ty.builtin(),
        ));
        let args = emitter.open_region(&[("in", "f32"), ("in", "f32"), ("out", "f32")]);
        let add = emitter.anonymous();
        emitter.line(format!("{add} = arith.addf {}, {} : f32", args[0], args[1]));
        emitter.line(format!("linalg.yield {add} : f32"));
        emitter.close_region(&format!(" -> {output_ty}"));

        Ok(name)
    }

    fn torch(&self, emitter: &mut Emitter) -> Result<String, ExportError> {
        let input = emitter.value(&self.input)?;
        let weight = emitter.torch_literal(&self.weight);
        let (bias, bias_ty) = match &self.bias {
            Some(bias) => (emitter.torch_literal(bias), bias.ty.torch()),
            None => (emitter.torch_none(), "!torch.none".to_string()),
        };

        let name = emitter.anonymous();
        emitter.line(format!(
            "{name} = torch.aten.linear {input}, {weight}, {bias} : {}, {}, {bias_ty} -> {}",
            self.input.ty.torch(),
            self.weight.ty.torch(),
            self.output.ty.torch(),
        ));

        Ok(name)
    }

    fn into_node(self) -> Node {
        Node::Linear(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlir::{
        OutputType, ResourceMode,
        node::test::{codegen, operand},
    };

    fn node(bias: bool) -> LinearNode {
        LinearNode::new(
            operand(0, &[1, 8]),
            operand(1, &[1, 4]),
            Constant::new(TensorType::new([4, 8]), vec![0.25; 32]),
            bias.then(|| Constant::new(TensorType::new([4]), vec![1.0; 4])),
        )
    }

    #[test]
    fn linalg_transpose_matmul_and_bias() {
        let text = codegen(node(true), OutputType::LinalgOnTensors, ResourceMode::Elide);

        assert!(text.contains("#map = affine_map<(d0, d1) -> (d0, d1)>"));
        assert!(text.contains("#map1 = affine_map<(d0, d1) -> (d1)>"));
        assert!(text.contains(
            "%transposed = linalg.transpose ins(%cst : tensor<4x8xf32>) outs(%0 : tensor<8x4xf32>) permutation = [1, 0]"
        ));
        assert!(text.contains(
            "%3 = linalg.matmul ins(%arg0, %transposed : tensor<1x8xf32>, tensor<8x4xf32>) outs(%2 : tensor<1x4xf32>) -> tensor<1x4xf32>"
        ));
        assert!(text.contains(
            "%5 = linalg.generic {indexing_maps = [#map, #map1, #map], iterator_types = [\"parallel\", \"parallel\"]} ins(%3, %cst_1 : tensor<1x4xf32>, tensor<4xf32>) outs(%4 : tensor<1x4xf32>) {"
        ));
        assert!(text.contains("^bb0(%in: f32, %in_2: f32, %out: f32):"));
        assert!(text.contains("%6 = arith.addf %in, %in_2 : f32"));
        assert!(text.contains("return %5 : tensor<1x4xf32>"));
    }

    #[test]
    fn linalg_without_bias_returns_the_matmul() {
        let text = codegen(node(false), OutputType::LinalgOnTensors, ResourceMode::Elide);

        assert!(!text.contains("linalg.generic"));
        assert!(text.contains("return %3 : tensor<1x4xf32>"));
    }

    #[test]
    fn torch_linear() {
        let text = codegen(node(true), OutputType::Torch, ResourceMode::Elide);

        assert!(text.contains(
            "%2 = torch.aten.linear %arg0, %0, %1 : !torch.vtensor<[1,8],f32>, !torch.vtensor<[4,8],f32>, !torch.vtensor<[4],f32> -> !torch.vtensor<[1,4],f32>"
        ));
    }

    #[test]
    fn embedded_weights_are_named_by_shape() {
        let text = codegen(node(true), OutputType::Torch, ResourceMode::Embed);

        assert!(text.contains("dense_resource<torch_tensor_4_8_torch.float32> : tensor<4x8xf32>"));
        assert!(text.contains("dense_resource<torch_tensor_4_torch.float32> : tensor<4xf32>"));
        assert!(text.contains(
            "      torch_tensor_4_torch.float32: \"0x040000000000803F0000803F0000803F0000803F\"\n"
        ));
    }
}
