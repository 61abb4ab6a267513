use super::{Node, NodeCodegen, to_i64};
use crate::{
    error::ExportError,
    mlir::{Constant, Emitter, Operand},
};

/// 2D convolution in NCHW layout with an OIHW weight.
#[derive(Debug, Clone, new)]
pub struct Conv2dNode {
    pub input: Operand,
    pub output: Operand,
    pub weight: Constant,
    pub bias: Option<Constant>,
    pub stride: [usize; 2],
    pub padding: [usize; 2],
    pub dilation: [usize; 2],
    pub groups: usize,
}

impl NodeCodegen for Conv2dNode {
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
        if self.groups != 1 {
            return Err(ExportError::Unsupported {
                op: "conv2d",
                reason: format!(
                    "grouped convolution (groups = {}) has no linalg-on-tensors lowering",
                    self.groups
                ),
            });
        }

        let input = emitter.value(&self.input)?;
        let [pad_h, pad_w] = self.padding;
        let (input, input_ty) = if pad_h > 0 || pad_w > 0 {
            let pads = [0, 0, pad_h, pad_w];
            emitter.pad(&input, &self.input.ty, &pads, &pads, 0.0)
        } else {
            (input, self.input.ty.clone())
        };

        let weight = emitter.weight(&self.weight);
        let output_ty = self.output.ty.builtin();
        let init = match &self.bias {
            Some(bias) => {
                let bias_value = emitter.weight(bias);
                let empty = emitter.empty(&self.output.ty);
                let name = emitter.named("broadcasted");
                emitter.line(format!(
                    "{name} = linalg.broadcast ins({bias_value} : {}) outs({empty} : {output_ty}) dimensions = [0, 2, 3]",
                    bias.ty.builtin()
                ));
                name
            }
            None => emitter.filled(&self.output.ty, 0.0),
        };

        let name = emitter.anonymous();
        emitter.line(format!(
            "{name} = linalg.conv_2d_nchw_fchw {{dilations = {}, strides = {}}} ins({input}, {weight} : {}, {}) outs({init} : {output_ty}) -> {output_ty}",
            Emitter::dense_i64_pair(self.dilation),
            Emitter::dense_i64_pair(self.stride),
            input_ty.builtin(),
            self.weight.ty.builtin(),
        ));

        Ok(name)
    }

    fn torch(&self, emitter: &mut Emitter) -> Result<String, ExportError> {
        let input = emitter.value(&self.input)?;
        let weight = emitter.torch_literal(&self.weight);
        let (bias, bias_ty) = match &self.bias {
            Some(bias) => (emitter.torch_literal(bias), bias.ty.torch()),
            None => (emitter.torch_none(), "!torch.none".to_string()),
        };
        let stride = emitter.torch_int_list(&to_i64(&self.stride));
        let padding = emitter.torch_int_list(&to_i64(&self.padding));
        let dilation = emitter.torch_int_list(&to_i64(&self.dilation));
        let transposed = emitter.torch_bool(false);
        let output_padding = emitter.torch_int_list(&[0, 0]);
        let groups = emitter.torch_int(self.groups as i64);

        let name = emitter.anonymous();
        emitter.line(format!(
            "{name} = torch.aten.convolution {input}, {weight}, {bias}, {stride}, {padding}, {dilation}, {transposed}, {output_padding}, {groups} : {}, {}, {bias_ty}, !torch.list<int>, !torch.list<int>, !torch.list<int>, !torch.bool, !torch.list<int>, !torch.int -> {}",
            self.input.ty.torch(),
            self.weight.ty.torch(),
            self.output.ty.torch(),
        ));

        Ok(name)
    }

    fn into_node(self) -> Node {
        Node::Conv2d(self)
    }
}
