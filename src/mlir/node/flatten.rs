use super::{Node, NodeCodegen};
use crate::{
    error::ExportError,
    mlir::{Emitter, Operand},
};

/// Collapse dimensions `start..=end` into one.
#[derive(Debug, Clone, new)]
pub struct FlattenNode {
    pub input: Operand,
    pub output: Operand,
    pub start_dim: usize,
    pub end_dim: usize,
}

impl FlattenNode {
    /// Reassociation groups, e.g. `[[0], [1, 2, 3]]`.
    fn reassociation(&self) -> String {
        let rank = self.input.ty.rank();
        let mut groups = Vec::new();

        for dim in 0..self.start_dim {
            groups.push(format!("[{dim}]"));
        }
        let merged = (self.start_dim..=self.end_dim)
            .map(|dim| dim.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        groups.push(format!("[{merged}]"));
        for dim in self.end_dim + 1..rank {
            groups.push(format!("[{dim}]"));
        }

        format!("[{}]", groups.join(", "))
    }
}

impl NodeCodegen for FlattenNode {
    fn inputs(&self) -> Vec<&Operand> {
        vec![&self.input]
    }

    fn output(&self) -> &Operand {
        &self.output
    }

    fn linalg(&self, emitter: &mut Emitter) -> Result<String, ExportError> {
        let input = emitter.value(&self.input)?;

        if self.start_dim == self.end_dim {
            return Ok(input);
        }

        let name = emitter.named("collapsed");
        emitter.line(format!(
            "{name} = tensor.collapse_shape {input} {} : {} into {}",
            self.reassociation(),
            self.input.ty.builtin(),
            self.output.ty.builtin(),
        ));

        Ok(name)
    }

    fn torch(&self, emitter: &mut Emitter) -> Result<String, ExportError> {
        let input = emitter.value(&self.input)?;
        let start = emitter.torch_int(self.start_dim as i64);
        let end = if self.end_dim + 1 == self.input.ty.rank() {
            emitter.torch_int(-1)
        } else {
            emitter.torch_int(self.end_dim as i64)
        };

        let name = emitter.anonymous();
        emitter.line(format!(
            "{name} = torch.aten.flatten.using_ints {input}, {start}, {end} : {}, !torch.int, !torch.int -> {}",
            self.input.ty.torch(),
            self.output.ty.torch(),
        ));

        Ok(name)
    }

    fn into_node(self) -> Node {
        Node::Flatten(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlir::{
        OutputType, ResourceMode,
        node::test::{codegen, operand},
    };

    fn node() -> FlattenNode {
        FlattenNode::new(operand(0, &[1, 256, 6, 6]), operand(1, &[1, 9216]), 1, 3)
    }

    #[test]
    fn reassociation_groups() {
        assert_eq!(node().reassociation(), "[[0], [1, 2, 3]]");

        let middle = FlattenNode::new(operand(0, &[2, 3, 4, 5]), operand(1, &[2, 12, 5]), 1, 2);
        assert_eq!(middle.reassociation(), "[[0], [1, 2], [3]]");
    }

    #[test]
    fn linalg_collapse_shape() {
        let text = codegen(node(), OutputType::LinalgOnTensors, ResourceMode::Elide);

        assert!(text.contains(
            "%collapsed = tensor.collapse_shape %arg0 [[0], [1, 2, 3]] : tensor<1x256x6x6xf32> into tensor<1x9216xf32>"
        ));
        assert!(text.contains("return %collapsed : tensor<1x9216xf32>"));
    }

    #[test]
    fn torch_flatten_to_last_dim() {
        let text = codegen(node(), OutputType::Torch, ResourceMode::Elide);

        assert!(text.contains("%int1 = torch.constant.int 1"));
        assert!(text.contains("%int-1 = torch.constant.int -1"));
        assert!(text.contains(
            "%0 = torch.aten.flatten.using_ints %arg0, %int1, %int-1 : !torch.vtensor<[1,256,6,6],f32>, !torch.int, !torch.int -> !torch.vtensor<[1,9216],f32>"
        ));
    }
}
