//! Symbolic tracing of Burn modules into a [`Graph`].
//!
//! Tracing walks a model the same way its `forward` does, but instead of
//! computing tensors it records one node per operation together with the
//! captured weights. Every step checks the incoming shape so that a model fed
//! the wrong input fails here instead of producing a broken module.

use crate::{
    error::ExportError,
    mlir::{
        Constant, Graph, MlirModule, Operand, OutputType, ResourceMode, TensorType, ValueId,
        node::{
            AdaptiveAvgPool2dNode, Conv2dNode, FlattenNode, LinearNode, MaxPool2dNode,
            NodeCodegen, ReluNode,
        },
    },
};
use burn::{
    nn::{
        Dropout, Linear, PaddingConfig2d, Relu,
        conv::Conv2d,
        pool::{AdaptiveAvgPool2d, MaxPool2d},
    },
    prelude::*,
    tensor::ops::conv::{
        calculate_conv_output_size, calculate_conv_padding, calculate_pool_output_size,
    },
};

/// A symbolic tensor flowing through a traced model.
#[derive(Debug, Clone, PartialEq)]
pub struct TracedTensor {
    operand: Operand,
}

impl TracedTensor {
    pub fn shape(&self) -> &[usize] {
        self.operand.shape()
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }
}

/// A module whose computation can be recorded by a [`Tracer`].
pub trait Traceable {
    fn trace(&self, tracer: &mut Tracer, input: TracedTensor) -> Result<TracedTensor, ExportError>;
}

/// Records traced operations into a graph.
#[derive(Debug, Default)]
pub struct Tracer {
    graph: Graph,
    next_id: usize,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the function input.
    pub fn input(&mut self, shape: &[usize]) -> Result<TracedTensor, ExportError> {
        if shape.is_empty() || shape.contains(&0) {
            return Err(ExportError::InvalidInput(format!(
                "example input must have a non-empty static shape, got {shape:?}"
            )));
        }

        let input = self.value(shape.to_vec());
        self.graph.register_input(input.operand.clone());

        Ok(input)
    }

    /// Allocate the value produced by the next operation.
    pub fn value(&mut self, shape: Vec<usize>) -> TracedTensor {
        let id = ValueId(self.next_id);
        self.next_id += 1;

        TracedTensor {
            operand: Operand::new(id, TensorType::new(shape)),
        }
    }

    pub fn register<N: NodeCodegen>(&mut self, node: N) {
        self.graph.register(node);
    }

    /// Collapse dimensions `start_dim..=end_dim`, like [`Tensor::flatten`].
    pub fn flatten(
        &mut self,
        input: TracedTensor,
        start_dim: usize,
        end_dim: usize,
    ) -> Result<TracedTensor, ExportError> {
        let shape = input.shape();
        if start_dim > end_dim || end_dim >= shape.len() {
            return Err(ExportError::InvalidInput(format!(
                "cannot flatten dimensions {start_dim}..={end_dim} of shape {shape:?}"
            )));
        }

        let merged = shape[start_dim..=end_dim].iter().product();
        let mut output_shape = shape[..start_dim].to_vec();
        output_shape.push(merged);
        output_shape.extend_from_slice(&shape[end_dim + 1..]);

        let output = self.value(output_shape);
        self.register(FlattenNode::new(
            input.operand,
            output.operand.clone(),
            start_dim,
            end_dim,
        ));

        Ok(output)
    }

    /// Close the trace with the model output.
    pub fn finish(mut self, output: TracedTensor) -> Graph {
        self.graph.register_output(output.operand);
        self.graph
    }
}

/// Trace `model` on an input shaped like `example_input`.
pub fn trace<B: Backend, const D: usize, M: Traceable>(
    model: &M,
    example_input: &Tensor<B, D>,
) -> Result<Graph, ExportError> {
    let mut tracer = Tracer::new();
    let input = tracer.input(&example_input.dims())?;
    let output = model.trace(&mut tracer, input)?;
    let graph = tracer.finish(output);

    log::debug!(
        "Traced {} nodes capturing {} parameters",
        graph.nodes().len(),
        graph.num_params()
    );

    Ok(graph)
}

/// Options for [`export_and_import`].
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    pub resources: ResourceMode,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            resources: ResourceMode::Embed,
        }
    }
}

/// Trace `model` with `example_input` and lower it to an MLIR module whose
/// single function is named `func_name`.
pub fn export_and_import<B: Backend, const D: usize, M: Traceable>(
    model: &M,
    example_input: &Tensor<B, D>,
    output_type: OutputType,
    func_name: &str,
    options: ExportOptions,
) -> Result<MlirModule, ExportError> {
    validate_func_name(func_name)?;

    let graph = trace(model, example_input)?;
    graph.codegen(output_type, func_name, options.resources)
}

/// Function names must be bare MLIR symbols: `[A-Za-z_][A-Za-z0-9_$.]*`.
pub fn validate_func_name(name: &str) -> Result<(), ExportError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.'))
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(ExportError::InvalidFunctionName(name.to_string()))
    }
}

fn constant<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Constant, ExportError> {
    let data = tensor.into_data().convert::<f32>();
    let shape = data.shape.clone();
    let values = data
        .into_vec::<f32>()
        .map_err(|err| ExportError::TensorData(format!("{err:?}")))?;

    Ok(Constant::new(TensorType::new(shape), values))
}

fn expect_rank(op: &'static str, input: &TracedTensor, rank: usize) -> Result<(), ExportError> {
    if input.shape().len() != rank {
        return Err(ExportError::InvalidInput(format!(
            "{op} expects a rank {rank} input, got shape {:?}",
            input.shape()
        )));
    }

    Ok(())
}

/// Window must fit in the padded input along both spatial axes.
fn expect_window_fits(
    op: &'static str,
    input: &TracedTensor,
    kernel_size: [usize; 2],
    padding: [usize; 2],
    dilation: [usize; 2],
) -> Result<(), ExportError> {
    let shape = input.shape();

    for axis in 0..2 {
        let extent = dilation[axis] * (kernel_size[axis] - 1) + 1;
        if shape[axis + 2] + 2 * padding[axis] < extent {
            return Err(ExportError::InvalidInput(format!(
                "{op} window {kernel_size:?} does not fit input {shape:?} with padding {padding:?}"
            )));
        }
    }

    Ok(())
}

fn resolve_padding(
    padding: &PaddingConfig2d,
    kernel_size: [usize; 2],
    stride: [usize; 2],
    spatial: [usize; 2],
) -> [usize; 2] {
    match padding {
        PaddingConfig2d::Valid => [0, 0],
        PaddingConfig2d::Explicit(height, width) => [*height, *width],
        PaddingConfig2d::Same => [
            calculate_conv_padding(kernel_size[0], stride[0], spatial[0], spatial[0]),
            calculate_conv_padding(kernel_size[1], stride[1], spatial[1], spatial[1]),
        ],
    }
}

impl<B: Backend> Traceable for Conv2d<B> {
    fn trace(&self, tracer: &mut Tracer, input: TracedTensor) -> Result<TracedTensor, ExportError> {
        expect_rank("conv2d", &input, 4)?;

        let [channels_out, channels_per_group, _, _] = self.weight.val().dims();
        let shape = input.shape().to_vec();
        let channels_in = channels_per_group * self.groups;
        if shape[1] != channels_in {
            return Err(ExportError::shape_mismatch(
                "conv2d",
                [shape[0], channels_in, shape[2], shape[3]],
                &shape,
            ));
        }

        let padding = resolve_padding(
            &self.padding,
            self.kernel_size,
            self.stride,
            [shape[2], shape[3]],
        );
        expect_window_fits("conv2d", &input, self.kernel_size, padding, self.dilation)?;

        let [height, width] = [0, 1].map(|axis| {
            calculate_conv_output_size(
                self.kernel_size[axis],
                self.stride[axis],
                padding[axis],
                self.dilation[axis],
                shape[axis + 2],
            )
        });
        let weight = constant(self.weight.val())?;
        let bias = match &self.bias {
            Some(bias) => Some(constant(bias.val())?),
            None => None,
        };

        let output = tracer.value(vec![shape[0], channels_out, height, width]);
        tracer.register(Conv2dNode::new(
            input.operand,
            output.operand.clone(),
            weight,
            bias,
            self.stride,
            padding,
            self.dilation,
            self.groups,
        ));

        Ok(output)
    }
}

impl Traceable for Relu {
    fn trace(&self, tracer: &mut Tracer, input: TracedTensor) -> Result<TracedTensor, ExportError> {
        let output = tracer.value(input.shape().to_vec());
        tracer.register(ReluNode::new(input.operand, output.operand.clone()));

        Ok(output)
    }
}

impl Traceable for MaxPool2d {
    fn trace(&self, tracer: &mut Tracer, input: TracedTensor) -> Result<TracedTensor, ExportError> {
        expect_rank("max_pool2d", &input, 4)?;

        let shape = input.shape().to_vec();
        let padding = resolve_padding(
            &self.padding,
            self.kernel_size,
            self.stride,
            [shape[2], shape[3]],
        );
        expect_window_fits("max_pool2d", &input, self.kernel_size, padding, self.dilation)?;

        let [height, width] = [0, 1].map(|axis| {
            calculate_pool_output_size(
                self.kernel_size[axis],
                self.stride[axis],
                padding[axis],
                self.dilation[axis],
                shape[axis + 2],
                self.ceil_mode,
            )
        });

        let output = tracer.value(vec![shape[0], shape[1], height, width]);
        tracer.register(MaxPool2dNode::new(
            input.operand,
            output.operand.clone(),
            self.kernel_size,
            self.stride,
            padding,
            self.dilation,
            self.ceil_mode,
        ));

        Ok(output)
    }
}

impl Traceable for AdaptiveAvgPool2d {
    fn trace(&self, tracer: &mut Tracer, input: TracedTensor) -> Result<TracedTensor, ExportError> {
        expect_rank("adaptive_avg_pool2d", &input, 4)?;

        let shape = input.shape();
        let [height, width] = self.output_size;
        if height == 0 || width == 0 {
            return Err(ExportError::InvalidInput(format!(
                "adaptive_avg_pool2d output size must be positive, got {:?}",
                self.output_size
            )));
        }

        let output = tracer.value(vec![shape[0], shape[1], height, width]);
        tracer.register(AdaptiveAvgPool2dNode::new(
            input.operand,
            output.operand.clone(),
            self.output_size,
        ));

        Ok(output)
    }
}

/// Tracing records inference, where dropout is the identity.
impl Traceable for Dropout {
    fn trace(
        &self,
        _tracer: &mut Tracer,
        input: TracedTensor,
    ) -> Result<TracedTensor, ExportError> {
        log::trace!("Dropout (p = {}) elided in evaluation mode", self.prob);
        Ok(input)
    }
}

impl<B: Backend> Traceable for Linear<B> {
    fn trace(&self, tracer: &mut Tracer, input: TracedTensor) -> Result<TracedTensor, ExportError> {
        let [d_input, d_output] = self.weight.val().dims();
        let shape = input.shape().to_vec();

        match shape.last() {
            Some(features) if *features == d_input => {}
            _ => {
                let mut expected = shape.clone();
                match expected.last_mut() {
                    Some(last) => *last = d_input,
                    None => expected.push(d_input),
                }
                return Err(ExportError::shape_mismatch("linear", expected, &shape));
            }
        }

        // Burn stores `[in, out]`, the emitted weight follows PyTorch's `[out, in]`.
        let weight = constant(self.weight.val().transpose())?;
        let bias = match &self.bias {
            Some(bias) => Some(constant(bias.val())?),
            None => None,
        };

        let mut output_shape = shape;
        if let Some(last) = output_shape.last_mut() {
            *last = d_output;
        }

        let output = tracer.value(output_shape);
        tracer.register(LinearNode::new(
            input.operand,
            output.operand.clone(),
            weight,
            bias,
        ));

        Ok(output)
    }
}
