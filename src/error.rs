use burn::{config::ConfigError, store::PytorchStoreError};

/// Errors raised while resolving or loading pretrained weights.
#[derive(thiserror::Error, Debug)]
pub enum WeightsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Download error: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Checkpoint hash mismatch: expected prefix {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Failed to import checkpoint: {0}")]
    Store(#[from] PytorchStoreError),

    #[error("Could not determine a cache directory, set one explicitly")]
    NoCacheDir,

    #[error("Unknown weight set: {0}")]
    UnknownWeights(String),
}

/// Errors raised while tracing a model or generating its MLIR representation.
#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("Shape mismatch in {op}: expected {expected}, got {actual}")]
    ShapeMismatch {
        op: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid function name '{0}', expected [A-Za-z_][A-Za-z0-9_$.]*")]
    InvalidFunctionName(String),

    #[error("Unsupported {op}: {reason}")]
    Unsupported { op: &'static str, reason: String },

    #[error("Unknown output type '{0}'")]
    UnknownOutputType(String),

    #[error("Output type '{0}' is not supported, use 'linalg-on-tensors' or 'torch'")]
    UnsupportedOutputType(String),

    #[error("Tensor data error: {0}")]
    TensorData(String),

    #[error("The traced graph has no input or output registered")]
    EmptyGraph,

    #[error("Value {0} is used before being defined")]
    UnboundValue(usize),

    #[error("Traced output shape {traced:?} differs from the eager output shape {actual:?}")]
    TraceDivergence {
        traced: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Formatting error")]
    Format(#[from] std::fmt::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Weights(#[from] WeightsError),
}

impl ExportError {
    pub(crate) fn shape_mismatch<E: std::fmt::Debug, A: std::fmt::Debug>(
        op: &'static str,
        expected: E,
        actual: A,
    ) -> Self {
        ExportError::ShapeMismatch {
            op,
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
        }
    }
}

/// Errors raised by the classification driver.
#[derive(thiserror::Error, Debug)]
pub enum ClassifyError {
    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model output is all zeros, first logits: {0:?}")]
    DegenerateOutput(Vec<f32>),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Tensor data error: {0}")]
    TensorData(String),

    #[error("Failed to write report: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Weights(#[from] WeightsError),
}

impl From<ConfigError> for ClassifyError {
    fn from(error: ConfigError) -> Self {
        ClassifyError::InvalidConfig(error.to_string())
    }
}
