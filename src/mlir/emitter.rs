use super::{
    Constant, ELIDED_KEY, MlirModule, Operand, OutputType, ResourceMode, ResourceTable, Scope,
    TensorType, ValueId, format_f32, format_list,
};
use crate::error::ExportError;
use std::collections::HashMap;

const INDENT: &str = "  ";

/// Function body under construction.
///
/// Owns the SSA scope, the affine map aliases and the resource table so that
/// node lowerings only have to describe their own operations.
#[derive(Debug)]
pub struct Emitter {
    body: String,
    depth: usize,
    scope: Scope,
    maps: Vec<String>,
    resources: ResourceTable,
    mode: ResourceMode,
    bindings: HashMap<ValueId, String>,
    floats: HashMap<u32, String>,
    ints: HashMap<i64, String>,
    bools: HashMap<bool, String>,
    none: Option<String>,
}

impl Emitter {
    pub fn new(mode: ResourceMode) -> Self {
        Self {
            body: String::new(),
            // module + func.func
            depth: 2,
            scope: Scope::new(),
            maps: Vec::new(),
            resources: ResourceTable::new(),
            mode,
            bindings: HashMap::new(),
            floats: HashMap::new(),
            ints: HashMap::new(),
            bools: HashMap::new(),
            none: None,
        }
    }

    /// Append one operation line at the current depth.
    pub fn line<S: AsRef<str>>(&mut self, text: S) {
        for _ in 0..self.depth {
            self.body.push_str(INDENT);
        }
        self.body.push_str(text.as_ref());
        self.body.push('\n');
    }

    pub fn anonymous(&mut self) -> String {
        self.scope.anonymous()
    }

    pub fn named(&mut self, hint: &str) -> String {
        self.scope.named(hint)
    }

    /// Bind the function argument at `index` to `operand`.
    pub fn bind_argument(&mut self, index: usize, operand: &Operand) -> String {
        let name = self.scope.argument(index);
        self.bind(operand, name.clone());
        name
    }

    pub fn bind(&mut self, operand: &Operand, name: String) {
        self.bindings.insert(operand.id, name);
    }

    /// SSA name holding `operand`.
    pub fn value(&self, operand: &Operand) -> Result<String, ExportError> {
        self.bindings
            .get(&operand.id)
            .cloned()
            .ok_or(ExportError::UnboundValue(operand.id.0))
    }

    /// Alias for an affine map body, e.g. `#map1` for `(d0, d1) -> (d1)`.
    pub fn affine_map(&mut self, map: &str) -> String {
        let index = match self.maps.iter().position(|existing| existing == map) {
            Some(index) => index,
            None => {
                self.maps.push(map.to_string());
                self.maps.len() - 1
            }
        };

        map_alias(index)
    }

    /// Alias for the identity map of the given rank.
    pub fn identity_map(&mut self, rank: usize) -> String {
        let dims = dims(rank);
        self.affine_map(&format!("({dims}) -> ({dims})"))
    }

    /// `dense_resource<key>` reference for a weight, registering its blob when embedded.
    pub fn dense_resource(&mut self, constant: &Constant) -> String {
        let key = match self.mode {
            ResourceMode::Embed => self.resources.insert(constant),
            ResourceMode::Elide => ELIDED_KEY.to_string(),
        };

        format!("dense_resource<{key}>")
    }

    /// Open the entry block of a nested region; returns the block argument names.
    pub fn open_region(&mut self, args: &[(&str, &str)]) -> Vec<String> {
        self.scope.enter_region();

        let names = args
            .iter()
            .map(|(hint, _)| self.scope.named(hint))
            .collect::<Vec<_>>();
        let signature = names
            .iter()
            .zip(args.iter())
            .map(|(name, (_, ty))| format!("{name}: {ty}"))
            .collect::<Vec<_>>()
            .join(", ");

        self.line(format!("^bb0({signature}):"));
        self.depth += 1;

        names
    }

    /// Close the region opened last, writing `}` followed by `trailer`.
    pub fn close_region(&mut self, trailer: &str) {
        self.depth -= 1;
        self.scope.exit_region();
        self.line(format!("}}{trailer}"));
    }

    /// Finish the function body and assemble the module.
    pub fn finish(
        mut self,
        output_type: OutputType,
        func_name: &str,
        input: &TensorType,
        output: &Operand,
    ) -> Result<MlirModule, ExportError> {
        let result = self.value(output)?;
        let (input_ty, output_ty) = match output_type {
            OutputType::LinalgOnTensors => (input.builtin(), output.ty.builtin()),
            OutputType::Torch => (input.torch(), output.ty.torch()),
        };
        self.line(format!("return {result} : {output_ty}"));

        let maps = self
            .maps
            .iter()
            .enumerate()
            .map(|(index, map)| format!("{} = affine_map<{map}>", map_alias(index)))
            .collect();

        Ok(MlirModule::new(
            output_type,
            output.ty.clone(),
            format!("func.func @{func_name}(%arg0: {input_ty}) -> {output_ty}"),
            maps,
            self.body,
            self.resources,
        ))
    }
}

/// Helpers shared by the linalg-on-tensors lowerings.
impl Emitter {
    /// `arith.constant` for a scalar float, emitted once per function.
    pub fn float(&mut self, value: f32) -> String {
        if let Some(name) = self.floats.get(&value.to_bits()) {
            return name.clone();
        }

        let name = self.named("cst");
        self.line(format!("{name} = arith.constant {} : f32", format_f32(value)));
        self.floats.insert(value.to_bits(), name.clone());
        name
    }

    /// `arith.constant` holding a weight tensor.
    pub fn weight(&mut self, constant: &Constant) -> String {
        let name = self.named("cst");
        let resource = self.dense_resource(constant);
        self.line(format!(
            "{name} = arith.constant {resource} : {}",
            constant.ty.builtin()
        ));
        name
    }

    /// `tensor.empty` of the given type.
    pub fn empty(&mut self, ty: &TensorType) -> String {
        let name = self.anonymous();
        self.line(format!("{name} = tensor.empty() : {}", ty.builtin()));
        name
    }

    /// `tensor.empty` filled with `value` through `linalg.fill`.
    pub fn filled(&mut self, ty: &TensorType, value: f32) -> String {
        let scalar = self.float(value);
        let empty = self.empty(ty);
        let name = self.anonymous();
        let ty = ty.builtin();
        self.line(format!(
            "{name} = linalg.fill ins({scalar} : f32) outs({empty} : {ty}) -> {ty}"
        ));
        name
    }

    /// `tensor.pad` of `input` with a constant `value`; returns the padded value and type.
    pub fn pad(
        &mut self,
        input: &str,
        ty: &TensorType,
        low: &[usize],
        high: &[usize],
        value: f32,
    ) -> (String, TensorType) {
        let padded_ty = TensorType::new(
            ty.shape
                .iter()
                .zip(low.iter().zip(high.iter()))
                .map(|(dim, (low, high))| dim + low + high)
                .collect::<Vec<_>>(),
        );
        let scalar = self.float(value);
        let name = self.named("padded");

        self.line(format!(
            "{name} = tensor.pad {input} low{} high{} {{",
            format_list(low),
            format_list(high)
        ));
        let hints = (1..=ty.rank())
            .map(|index| format!("arg{index}"))
            .collect::<Vec<_>>();
        let args = hints
            .iter()
            .map(|hint| (hint.as_str(), "index"))
            .collect::<Vec<_>>();
        self.open_region(&args);
        self.line(format!("tensor.yield {scalar} : f32"));
        self.close_region(&format!(" : {} to {}", ty.builtin(), padded_ty.builtin()));

        (name, padded_ty)
    }

    /// `dense<v>` when both values match, `dense<[a, b]>` otherwise.
    pub fn dense_i64_pair(values: [usize; 2]) -> String {
        if values[0] == values[1] {
            format!("dense<{}> : vector<2xi64>", values[0])
        } else {
            format!("dense<{}> : vector<2xi64>", format_list(&values))
        }
    }

    /// Iterator types attribute for an all-parallel `linalg.generic`.
    pub fn parallel_iterators(rank: usize) -> String {
        let items = (0..rank)
            .map(|_| "\"parallel\"")
            .collect::<Vec<_>>()
            .join(", ");
        format!("[{items}]")
    }
}

/// Helpers shared by the torch dialect lowerings.
impl Emitter {
    pub fn torch_int(&mut self, value: i64) -> String {
        if let Some(name) = self.ints.get(&value) {
            return name.clone();
        }

        let name = self.named(&format!("int{value}"));
        self.line(format!("{name} = torch.constant.int {value}"));
        self.ints.insert(value, name.clone());
        name
    }

    pub fn torch_bool(&mut self, value: bool) -> String {
        if let Some(name) = self.bools.get(&value) {
            return name.clone();
        }

        let name = self.named(if value { "true" } else { "false" });
        self.line(format!("{name} = torch.constant.bool {value}"));
        self.bools.insert(value, name.clone());
        name
    }

    pub fn torch_none(&mut self) -> String {
        if let Some(name) = &self.none {
            return name.clone();
        }

        let name = self.named("none");
        self.line(format!("{name} = torch.constant.none"));
        self.none = Some(name.clone());
        name
    }

    /// `torch.prim.ListConstruct` of integer constants.
    pub fn torch_int_list(&mut self, values: &[i64]) -> String {
        let items = values
            .iter()
            .map(|value| self.torch_int(*value))
            .collect::<Vec<_>>();
        let types = values
            .iter()
            .map(|_| "!torch.int")
            .collect::<Vec<_>>()
            .join(", ");
        let name = self.anonymous();

        self.line(format!(
            "{name} = torch.prim.ListConstruct {} : ({types}) -> !torch.list<int>",
            items.join(", ")
        ));
        name
    }

    /// `torch.vtensor.literal` holding a weight tensor.
    pub fn torch_literal(&mut self, constant: &Constant) -> String {
        let resource = self.dense_resource(constant);
        let name = self.anonymous();
        self.line(format!(
            "{name} = torch.vtensor.literal({resource} : {}) : {}",
            constant.ty.builtin(),
            constant.ty.torch()
        ));
        name
    }
}

fn map_alias(index: usize) -> String {
    match index {
        0 => "#map".to_string(),
        index => format!("#map{index}"),
    }
}

/// `d0, d1, ..` for the given rank.
pub(crate) fn dims(rank: usize) -> String {
    (0..rank)
        .map(|dim| format!("d{dim}"))
        .collect::<Vec<_>>()
        .join(", ")
}
