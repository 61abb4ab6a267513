//! End-to-end AlexNet export: load the model, trace it on a random example
//! input, lower it and write the module to disk.

use crate::{
    error::ExportError,
    mlir::{MlirModule, OutputType, ResourceMode},
    model::{AlexNet, AlexNetConfig, AlexNetWeights, WeightSource, load_alexnet},
    trace::{ExportOptions, export_and_import, validate_func_name},
};
use burn::{prelude::*, tensor::Distribution};
use std::path::PathBuf;

#[derive(Config, Debug)]
pub struct ExportConfig {
    /// Symbol of the exported function.
    #[config(default = "String::from(\"alexnet\")")]
    pub func_name: String,
    #[config(default = "OutputType::LinalgOnTensors")]
    pub output_type: OutputType,
    /// Destination file, overwritten on every run.
    #[config(default = "PathBuf::from(\"alexnet_linalg.mlir\")")]
    pub output: PathBuf,
    #[config(default = "WeightSource::Pretrained(AlexNetWeights::Imagenet1kV1)")]
    pub weights: WeightSource,
    /// Static shape of the example input, NCHW.
    #[config(default = "[1, 3, 224, 224]")]
    pub input_shape: [usize; 4],
    #[config(default = "ResourceMode::Embed")]
    pub resources: ResourceMode,
    /// Run the eager model on the example input and compare its output shape.
    #[config(default = true)]
    pub verify: bool,
    /// Seed of the backend RNG, used by random weights and the example input.
    pub seed: Option<u64>,
    /// Checkpoint cache, defaults to the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    #[config(default = "AlexNetConfig::new()")]
    pub model: AlexNetConfig,
}

/// Export AlexNet as configured and return the path of the written module.
pub fn run_export<B: Backend>(
    config: &ExportConfig,
    device: &B::Device,
) -> Result<PathBuf, ExportError> {
    validate_func_name(&config.func_name)?;

    if let Some(seed) = config.seed {
        B::seed(device, seed);
    }

    let model: AlexNet<B> = load_alexnet(
        &config.weights,
        &config.model,
        config.cache_dir.as_deref(),
        device,
    )?;

    let input = Tensor::<B, 4>::random(config.input_shape, Distribution::Normal(0.0, 1.0), device);
    log::info!(
        "Exporting @{} as {} with input {:?}",
        config.func_name,
        config.output_type.as_str(),
        config.input_shape
    );

    let options = ExportOptions {
        resources: config.resources,
    };
    let module = export_and_import(
        &model,
        &input,
        config.output_type,
        &config.func_name,
        options,
    )?;

    if config.verify {
        verify(&model, input, &module)?;
    }

    module.write_to(&config.output)?;
    log::info!(
        "Wrote {} weight blobs to {}",
        module.resource_keys().len(),
        config.output.display()
    );

    Ok(config.output.clone())
}

/// The traced function must return what the eager model computes.
fn verify<B: Backend>(
    model: &AlexNet<B>,
    input: Tensor<B, 4>,
    module: &MlirModule,
) -> Result<(), ExportError> {
    let actual = model.forward(input).dims().to_vec();
    let traced = module.result_type().shape.clone();

    if traced != actual {
        return Err(ExportError::TraceDivergence { traced, actual });
    }

    log::debug!("Eager output shape {actual:?} matches the traced function");
    Ok(())
}
