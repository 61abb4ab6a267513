use core::fmt;

/// Element type of a traced tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    F32,
}

impl ElementType {
    /// Spelling used by the builtin and torch dialects.
    pub fn mlir(&self) -> &'static str {
        match self {
            ElementType::F32 => "f32",
        }
    }

    /// Spelling used in dense resource keys.
    pub fn torch_dtype(&self) -> &'static str {
        match self {
            ElementType::F32 => "torch.float32",
        }
    }
}

/// Identifier of an SSA value produced while tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub usize);

/// A ranked tensor type with static dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorType {
    pub shape: Vec<usize>,
    pub elem: ElementType,
}

impl TensorType {
    pub fn new<S: Into<Vec<usize>>>(shape: S) -> Self {
        Self {
            shape: shape.into(),
            elem: ElementType::F32,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Builtin tensor type, e.g. `tensor<1x3x224x224xf32>`.
    pub fn builtin(&self) -> String {
        let mut out = String::from("tensor<");
        for dim in self.shape.iter() {
            out.push_str(&dim.to_string());
            out.push('x');
        }
        out.push_str(self.elem.mlir());
        out.push('>');
        out
    }

    /// Torch value tensor type, e.g. `!torch.vtensor<[1,3,224,224],f32>`.
    pub fn torch(&self) -> String {
        let dims = self
            .shape
            .iter()
            .map(|dim| dim.to_string())
            .collect::<Vec<_>>()
            .join(",");

        format!("!torch.vtensor<[{dims}],{}>", self.elem.mlir())
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.builtin())
    }
}

/// An SSA value together with its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    pub id: ValueId,
    pub ty: TensorType,
}

impl Operand {
    pub fn new(id: ValueId, ty: TensorType) -> Self {
        Self { id, ty }
    }

    pub fn shape(&self) -> &[usize] {
        &self.ty.shape
    }
}

/// A weight captured at trace time, stored row-major in PyTorch layout.
#[derive(Clone, PartialEq)]
pub struct Constant {
    pub ty: TensorType,
    pub data: Vec<f32>,
}

impl Constant {
    pub fn new(ty: TensorType, data: Vec<f32>) -> Self {
        Self { ty, data }
    }
}

impl fmt::Debug for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constant")
            .field("ty", &self.ty)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Format a float the way the MLIR printer does (`0.000000e+00`).
///
/// Infinities have no decimal spelling and are written as their bit pattern.
pub fn format_f32(value: f32) -> String {
    if value.is_infinite() || value.is_nan() {
        return format!("0x{:08X}", value.to_bits());
    }

    let formatted = format!("{value:.6e}");
    let (mantissa, exponent) = match formatted.split_once('e') {
        Some(parts) => parts,
        None => return formatted,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };

    format!("{mantissa}e{sign}{:02}", exponent.abs())
}

/// Format a list of integers as `[a, b, c]`.
pub fn format_list<T: fmt::Display>(values: &[T]) -> String {
    let items = values
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    format!("[{items}]")
}
