use super::{Node, NodeCodegen, to_i64};
use crate::{
    error::ExportError,
    mlir::{Emitter, Operand, TensorType},
};

#[derive(Debug, Clone, new)]
pub struct AdaptiveAvgPool2dNode {
    pub input: Operand,
    pub output: Operand,
    pub output_size: [usize; 2],
}

impl AdaptiveAvgPool2dNode {
    fn spatial(&self) -> [usize; 2] {
        let shape = self.input.shape();
        [shape[2], shape[3]]
    }

    /// Fixed pooling window when the input divides evenly into the output.
    fn window(&self) -> Option<[usize; 2]> {
        let [height, width] = self.spatial();
        let [out_h, out_w] = self.output_size;

        if out_h == 0 || out_w == 0 || height % out_h != 0 || width % out_w != 0 {
            return None;
        }

        Some([height / out_h, width / out_w])
    }
}

impl NodeCodegen for AdaptiveAvgPool2dNode {
    fn inputs(&self) -> Vec<&Operand> {
        vec![&self.input]
    }

    fn output(&self) -> &Operand {
        &self.output
    }

    fn linalg(&self, emitter: &mut Emitter) -> Result<String, ExportError> {
        let input = emitter.value(&self.input)?;

        if self.spatial() == self.output_size {
            return Ok(input);
        }

        let window = self.window().ok_or_else(|| ExportError::Unsupported {
            op: "adaptive_avg_pool2d",
            reason: format!(
                "input size {:?} is not a multiple of output size {:?}",
                self.spatial(),
                self.output_size
            ),
        })?;

        let output_ty = self.output.ty.builtin();
        let window_ty = TensorType::new(window);
        let init = emitter.filled(&self.output.ty, 0.0);
        let kernel = emitter.empty(&window_ty);

        let sum = emitter.anonymous();
        emitter.line(format!(
            "{sum} = linalg.pooling_nchw_sum {{dilations = dense<1> : vector<2xi64>, strides = {}}} ins({input}, {kernel} : {}, {}) outs({init} : {output_ty}) -> {output_ty}",
            Emitter::dense_i64_pair(window),
            self.input.ty.builtin(),
            window_ty.builtin(),
        ));

        let count = emitter.float((window[0] * window[1]) as f32);
        let map = emitter.identity_map(4);
        let empty = emitter.empty(&self.output.ty);
        let name = emitter.anonymous();
        emitter.line(format!(
            "{name} = linalg.generic {{indexing_maps = [{map}, {map}], iterator_types = {}}} ins({sum} : {output_ty}) outs({empty} : {output_ty}) {{",
            Emitter::parallel_iterators(4),
        ));
        let args = emitter.open_region(&[("in", "f32"), ("out", "f32")]);
        let div = emitter.anonymous();
        emitter.line(format!("{div} = arith.divf {}, {count} : f32", args[0]));
        emitter.line(format!("linalg.yield {div} : f32"));
        emitter.close_region(&format!(" -> {output_ty}"));

        Ok(name)
    }

    fn torch(&self, emitter: &mut Emitter) -> Result<String, ExportError> {
        let input = emitter.value(&self.input)?;
        let output_size = emitter.torch_int_list(&to_i64(&self.output_size));

        let name = emitter.anonymous();
        emitter.line(format!(
            "{name} = torch.aten.adaptive_avg_pool2d {input}, {output_size} : {}, !torch.list<int> -> {}",
            self.input.ty.torch(),
            self.output.ty.torch(),
        ));

        Ok(name)
    }

    fn into_node(self) -> Node {
        Node::AdaptiveAvgPool2d(self)
    }
}
