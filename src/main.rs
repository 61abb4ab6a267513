use anyhow::{Context, bail};
use burn::{backend::NdArray, config::Config, prelude::Backend};
use burn_mlir::{
    classify::{ClassifyConfig, run_classify},
    export::{ExportConfig, run_export},
    logger::{init_log, level_from_verbosity},
    mlir::{OutputType, ResourceMode},
    model::{AlexNetWeights, WeightSource},
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

type B = NdArray<f32>;

/// Export AlexNet to MLIR. Without a subcommand, runs `export`.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Option<Command>,

    #[clap(flatten)]
    export: ExportArgs,

    /// Increase logging, repeat for more detail
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[clap(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Trace AlexNet and write it as an MLIR module
    Export(ExportArgs),
    /// Classify an image and report inference latency
    Classify(ClassifyArgs),
}

#[derive(Parser, Debug, Default, PartialEq)]
struct ExportArgs {
    /// JSON export configuration, flags override its values
    #[clap(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output file, overwritten if it exists
    #[clap(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Target dialect: linalg-on-tensors or torch
    #[clap(long, value_parser = parse_output_type)]
    output_type: Option<OutputType>,

    /// Symbol of the exported function
    #[clap(long)]
    func_name: Option<String>,

    /// Pretrained weight set
    #[clap(
        long,
        value_parser = parse_weights,
        conflicts_with_all = ["random_weights", "weights_file"]
    )]
    weights: Option<AlexNetWeights>,

    /// Export randomly initialized weights
    #[clap(long, conflicts_with = "weights_file")]
    random_weights: bool,

    /// Local PyTorch checkpoint with torchvision key names
    #[clap(long, value_name = "FILE")]
    weights_file: Option<PathBuf>,

    /// Reference weights as dense_resource<__elided__> instead of embedding them
    #[clap(long)]
    elide_resources: bool,

    /// Skip comparing the traced output with an eager forward pass
    #[clap(long)]
    no_verify: bool,

    /// Seed of the random weights and example input
    #[clap(long)]
    seed: Option<u64>,

    /// Example input shape, NCHW
    #[clap(long, value_delimiter = ',', value_name = "N,C,H,W")]
    input_shape: Option<Vec<usize>>,

    /// Checkpoint cache directory
    #[clap(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct ClassifyArgs {
    /// Image to classify
    image: PathBuf,

    /// Class names, one per line
    #[clap(long, value_name = "FILE")]
    labels: Option<PathBuf>,

    /// Number of predictions to report
    #[clap(long)]
    top_k: Option<usize>,

    /// Untimed runs before measuring
    #[clap(long)]
    warmup: Option<usize>,

    /// Timed runs
    #[clap(long)]
    runs: Option<usize>,

    /// Local PyTorch checkpoint with torchvision key names
    #[clap(long, value_name = "FILE", conflicts_with = "random_weights")]
    weights_file: Option<PathBuf>,

    /// Use randomly initialized weights
    #[clap(long)]
    random_weights: bool,

    /// Checkpoint cache directory
    #[clap(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Also write the predictions and timings as JSON
    #[clap(long, value_name = "FILE")]
    report: Option<PathBuf>,
}

impl Args {
    /// The subcommand to run, `export` with the top-level flags when none is given.
    fn into_command(self) -> anyhow::Result<Command> {
        match self.command {
            None => Ok(Command::Export(self.export)),
            Some(command) if self.export == ExportArgs::default() => Ok(command),
            Some(_) => bail!("Export options must follow the `export` subcommand"),
        }
    }
}

fn parse_output_type(value: &str) -> Result<OutputType, String> {
    value.parse().map_err(|err| format!("{err}"))
}

fn parse_weights(value: &str) -> Result<AlexNetWeights, String> {
    value.parse().map_err(|err| format!("{err}"))
}

impl ExportArgs {
    fn into_config(self) -> anyhow::Result<ExportConfig> {
        let mut config = match &self.config {
            Some(path) => ExportConfig::load(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ExportConfig::new(),
        };

        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(output_type) = self.output_type {
            config.output_type = output_type;
        }
        if let Some(func_name) = self.func_name {
            config.func_name = func_name;
        }
        if let Some(source) = weight_source(self.weights, self.weights_file, self.random_weights) {
            config.weights = source;
        }
        if self.elide_resources {
            config.resources = ResourceMode::Elide;
        }
        if self.no_verify {
            config.verify = false;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(shape) = self.input_shape {
            config.input_shape = match shape.as_slice() {
                &[n, c, h, w] => [n, c, h, w],
                _ => bail!("--input-shape expects 4 dimensions, got {shape:?}"),
            };
        }
        if self.cache_dir.is_some() {
            config.cache_dir = self.cache_dir;
        }

        Ok(config)
    }
}

impl ClassifyArgs {
    fn into_config(self) -> ClassifyConfig {
        let mut config = ClassifyConfig::new(self.image)
            .with_cache_dir(self.cache_dir)
            .with_report(self.report);

        if let Some(labels) = self.labels {
            config.labels = labels;
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if let Some(warmup) = self.warmup {
            config.warmup = warmup;
        }
        if let Some(runs) = self.runs {
            config.runs = runs;
        }
        if let Some(source) = weight_source(None, self.weights_file, self.random_weights) {
            config.weights = source;
        }

        config
    }
}

fn weight_source(
    weights: Option<AlexNetWeights>,
    file: Option<PathBuf>,
    random: bool,
) -> Option<WeightSource> {
    if random {
        return Some(WeightSource::Random);
    }

    file.map(WeightSource::File)
        .or_else(|| weights.map(WeightSource::Pretrained))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_log(level_from_verbosity(args.verbose, args.quiet))?;

    let device = Default::default();

    match args.into_command()? {
        Command::Classify(classify) => {
            let config = classify.into_config();
            let classification = run_classify::<B>(&config, &device)?;
            println!("{classification}");
        }
        Command::Export(export) => export_model(export, &device)?,
    }

    Ok(())
}

fn export_model(args: ExportArgs, device: &<B as Backend>::Device) -> anyhow::Result<()> {
    let config = args.into_config()?;
    log::debug!("Export configuration: {config}");

    let output = run_export::<B>(&config, device)?;
    println!("Wrote {}", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_is_the_default_export() {
        let args = Args::try_parse_from(["alexnet2mlir"]).unwrap();
        let config = args.export.into_config().unwrap();

        assert!(args.command.is_none());
        assert_eq!(config.output, PathBuf::from("alexnet_linalg.mlir"));
        assert_eq!(config.func_name, "alexnet");
        assert_eq!(config.output_type, OutputType::LinalgOnTensors);
    }

    #[test]
    fn export_flags_override_the_defaults() {
        let args = Args::try_parse_from([
            "alexnet2mlir",
            "export",
            "--output-type",
            "torch",
            "--random-weights",
            "--elide-resources",
            "--no-verify",
            "--input-shape",
            "2,3,224,224",
        ])
        .unwrap();

        let config = match args.command {
            Some(Command::Export(export)) => export.into_config().unwrap(),
            other => panic!("expected export, got {other:?}"),
        };

        assert_eq!(config.output_type, OutputType::Torch);
        assert_eq!(config.weights, WeightSource::Random);
        assert_eq!(config.resources, ResourceMode::Elide);
        assert!(!config.verify);
        assert_eq!(config.input_shape, [2, 3, 224, 224]);
    }

    #[test]
    fn unsupported_output_types_are_rejected() {
        assert!(Args::try_parse_from(["alexnet2mlir", "--output-type", "tosa"]).is_err());
        assert!(Args::try_parse_from(["alexnet2mlir", "--weights", "V2"]).is_err());
    }

    #[test]
    fn weight_flags_conflict() {
        assert!(
            Args::try_parse_from([
                "alexnet2mlir",
                "--random-weights",
                "--weights-file",
                "alexnet.pth"
            ])
            .is_err()
        );
    }

    #[test]
    fn verbosity_flags_precede_subcommands() {
        let args = Args::try_parse_from(["alexnet2mlir", "-q", "export", "--random-weights"])
            .unwrap();

        assert!(args.quiet);
        match args.into_command().unwrap() {
            Command::Export(export) => assert!(export.random_weights),
            other => panic!("expected export, got {other:?}"),
        }

        let args = Args::try_parse_from(["alexnet2mlir", "classify", "cat.jpg", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn top_level_export_flags_with_a_subcommand_are_rejected() {
        let args =
            Args::try_parse_from(["alexnet2mlir", "--random-weights", "classify", "cat.jpg"])
                .unwrap();

        assert!(args.into_command().is_err());
    }

    #[test]
    fn no_subcommand_runs_export_with_the_top_level_flags() {
        let args = Args::try_parse_from(["alexnet2mlir", "-v", "-o", "out.mlir"]).unwrap();

        match args.into_command().unwrap() {
            Command::Export(export) => {
                assert_eq!(export.output, Some(PathBuf::from("out.mlir")));
            }
            other => panic!("expected export, got {other:?}"),
        }
    }

    #[test]
    fn classify_arguments() {
        let args =
            Args::try_parse_from(["alexnet2mlir", "-v", "classify", "cat.jpg", "--top-k", "5"])
                .unwrap();

        assert_eq!(args.verbose, 1);
        let config = match args.into_command().unwrap() {
            Command::Classify(classify) => classify.into_config(),
            other => panic!("expected classify, got {other:?}"),
        };
        assert_eq!(config.image, PathBuf::from("cat.jpg"));
        assert_eq!(config.top_k, 5);
        assert_eq!(config.runs, 10);
    }
}
