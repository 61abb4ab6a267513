use super::{ResourceTable, TensorType};
use crate::error::ExportError;
use core::{fmt, str::FromStr};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Dialect the traced graph is lowered to.
#[derive(burn::config::Config, Debug, Copy, PartialEq, Eq)]
pub enum OutputType {
    /// Torch dialect with value semantics (`torch.aten.*`).
    Torch,
    /// Builtin tensors with `linalg`, `tensor` and `arith` operations.
    LinalgOnTensors,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::Torch => "torch",
            OutputType::LinalgOnTensors => "linalg-on-tensors",
        }
    }
}

impl FromStr for OutputType {
    type Err = ExportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");

        match normalized.as_str() {
            "torch" => Ok(OutputType::Torch),
            "linalg-on-tensors" => Ok(OutputType::LinalgOnTensors),
            "tosa" | "stablehlo" | "raw" => Err(ExportError::UnsupportedOutputType(normalized)),
            _ => Err(ExportError::UnknownOutputType(value.to_string())),
        }
    }
}

/// Textual MLIR module holding one function.
#[derive(Debug)]
pub struct MlirModule {
    output_type: OutputType,
    result: TensorType,
    signature: String,
    maps: Vec<String>,
    body: String,
    resources: ResourceTable,
}

impl MlirModule {
    pub(crate) fn new(
        output_type: OutputType,
        result: TensorType,
        signature: String,
        maps: Vec<String>,
        body: String,
        resources: ResourceTable,
    ) -> Self {
        Self {
            output_type,
            result,
            signature,
            maps,
            body,
            resources,
        }
    }

    pub fn output_type(&self) -> OutputType {
        self.output_type
    }

    /// Type returned by the function.
    pub fn result_type(&self) -> &TensorType {
        &self.result
    }

    /// Keys of the embedded weight blobs, in emission order.
    pub fn resource_keys(&self) -> Vec<&str> {
        self.resources.keys().collect()
    }

    /// Write the module to `path`, replacing any previous content.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ExportError> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);

        write!(writer, "{self}")?;
        writer.flush()?;

        Ok(())
    }
}

impl fmt::Display for MlirModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for map in self.maps.iter() {
            writeln!(f, "{map}")?;
        }

        writeln!(f, "module {{")?;
        writeln!(f, "  {} {{", self.signature)?;
        f.write_str(&self.body)?;
        writeln!(f, "  }}")?;
        writeln!(f, "}}")?;

        if !self.resources.is_empty() {
            writeln!(f)?;
            write!(f, "{}", self.resources)?;
        }

        Ok(())
    }
}
