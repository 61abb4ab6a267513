use super::{Node, NodeCodegen, to_i64};
use crate::{
    error::ExportError,
    mlir::{Emitter, Operand, TensorType},
};

#[derive(Debug, Clone, new)]
pub struct MaxPool2dNode {
    pub input: Operand,
    pub output: Operand,
    pub kernel_size: [usize; 2],
    pub stride: [usize; 2],
    pub padding: [usize; 2],
    pub dilation: [usize; 2],
    pub ceil_mode: bool,
}

impl MaxPool2dNode {
    /// Trailing padding needed so every output window fits in the input.
    ///
    /// Larger than the leading padding only in ceil mode.
    fn high_padding(&self, axis: usize) -> usize {
        let input = self.input.shape()[axis + 2];
        let output = self.output.shape()[axis + 2];
        let span = (output - 1) * self.stride[axis]
            + self.dilation[axis] * (self.kernel_size[axis] - 1)
            + 1;

        span.saturating_sub(input + self.padding[axis])
            .max(self.padding[axis])
    }
}

impl NodeCodegen for MaxPool2dNode {
    fn inputs(&self) -> Vec<&Operand> {
        vec![&self.input]
    }

    fn output(&self) -> &Operand {
        &self.output
    }

    fn linalg(&self, emitter: &mut Emitter) -> Result<String, ExportError> {
        let input = emitter.value(&self.input)?;
        let low = [0, 0, self.padding[0], self.padding[1]];
        let high = [0, 0, self.high_padding(0), self.high_padding(1)];

        let (input, input_ty) = if low.iter().chain(high.iter()).any(|pad| *pad > 0) {
            emitter.pad(&input, &self.input.ty, &low, &high, f32::NEG_INFINITY)
        } else {
            (input, self.input.ty.clone())
        };

        let init = emitter.filled(&self.output.ty, f32::NEG_INFINITY);
        let window = emitter.empty(&TensorType::new(self.kernel_size));
        let output_ty = self.output.ty.builtin();

        let name = emitter.anonymous();
        emitter.line(format!(
            "{name} = linalg.pooling_nchw_max {{dilations = {}, strides = {}}} ins({input}, {window} : {}, {}) outs({init} : {output_ty}) -> {output_ty}",
            Emitter::dense_i64_pair(self.dilation),
            Emitter::dense_i64_pair(self.stride),
            input_ty.builtin(),
            TensorType::new(self.kernel_size).builtin(),
        ));

        Ok(name)
    }

    fn torch(&self, emitter: &mut Emitter) -> Result<String, ExportError> {
        let input = emitter.value(&self.input)?;
        let kernel_size = emitter.torch_int_list(&to_i64(&self.kernel_size));
        let stride = emitter.torch_int_list(&to_i64(&self.stride));
        let padding = emitter.torch_int_list(&to_i64(&self.padding));
        let dilation = emitter.torch_int_list(&to_i64(&self.dilation));
        let ceil_mode = emitter.torch_bool(self.ceil_mode);

        let name = emitter.anonymous();
        emitter.line(format!(
            "{name} = torch.aten.max_pool2d {input}, {kernel_size}, {stride}, {padding}, {dilation}, {ceil_mode} : {}, !torch.list<int>, !torch.list<int>, !torch.list<int>, !torch.list<int>, !torch.bool -> {}",
            self.input.ty.torch(),
            self.output.ty.torch(),
        ));

        Ok(name)
    }

    fn into_node(self) -> Node {
        Node::MaxPool2d(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlir::{
        OutputType, ResourceMode,
        node::test::{codegen, operand},
    };

    fn alexnet_pool() -> MaxPool2dNode {
        MaxPool2dNode::new(
            operand(0, &[1, 64, 55, 55]),
            operand(1, &[1, 64, 27, 27]),
            [3, 3],
            [2, 2],
            [0, 0],
            [1, 1],
            false,
        )
    }

    #[test]
    fn linalg_pooling_without_padding() {
        let text = codegen(alexnet_pool(), OutputType::LinalgOnTensors, ResourceMode::Elide);

        assert!(!text.contains("tensor.pad"));
        assert!(text.contains("%cst = arith.constant 0xFF800000 : f32"));
        assert!(text.contains(
            "%1 = linalg.fill ins(%cst : f32) outs(%0 : tensor<1x64x27x27xf32>) -> tensor<1x64x27x27xf32>"
        ));
        assert!(text.contains("%2 = tensor.empty() : tensor<3x3xf32>"));
        assert!(text.contains(
            "%3 = linalg.pooling_nchw_max {dilations = dense<1> : vector<2xi64>, strides = dense<2> : vector<2xi64>} ins(%arg0, %2 : tensor<1x64x55x55xf32>, tensor<3x3xf32>) outs(%1 : tensor<1x64x27x27xf32>) -> tensor<1x64x27x27xf32>"
        ));
    }

    #[test]
    fn linalg_pads_with_negative_infinity() {
        let node = MaxPool2dNode::new(
            operand(0, &[1, 4, 8, 8]),
            operand(1, &[1, 4, 4, 4]),
            [3, 3],
            [2, 2],
            [1, 1],
            [1, 1],
            false,
        );

        let text = codegen(node, OutputType::LinalgOnTensors, ResourceMode::Elide);

        assert!(text.contains("%padded = tensor.pad %arg0 low[0, 0, 1, 1] high[0, 0, 1, 1] {"));
        assert!(text.contains("tensor.yield %cst : f32"));
        assert!(text.contains("ins(%padded, %2 : tensor<1x4x10x10xf32>, tensor<3x3xf32>)"));
    }

    #[test]
    fn ceil_mode_extends_trailing_padding() {
        let node = MaxPool2dNode::new(
            operand(0, &[1, 1, 6, 6]),
            operand(1, &[1, 1, 3, 3]),
            [3, 3],
            [2, 2],
            [0, 0],
            [1, 1],
            true,
        );

        assert_eq!(node.high_padding(0), 1);
        assert_eq!(node.high_padding(1), 1);
    }

    #[test]
    fn torch_max_pool() {
        let text = codegen(alexnet_pool(), OutputType::Torch, ResourceMode::Elide);

        assert!(text.contains("%int3 = torch.constant.int 3"));
        assert!(text.contains(
            "torch.aten.max_pool2d %arg0, %0, %1, %2, %3, %false : !torch.vtensor<[1,64,55,55],f32>, !torch.list<int>, !torch.list<int>, !torch.list<int>, !torch.list<int>, !torch.bool -> !torch.vtensor<[1,64,27,27],f32>"
        ));
    }
}
