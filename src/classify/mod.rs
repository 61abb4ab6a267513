//! Image classification with AlexNet, reporting latency like the native
//! drivers of the exported module.

mod bench;
mod labels;
mod postprocess;
mod preprocess;

pub use bench::*;
pub use labels::*;
pub use postprocess::*;
pub use preprocess::*;

use crate::{
    error::ClassifyError,
    model::{AlexNet, AlexNetConfig, AlexNetWeights, WeightSource, load_alexnet},
};
use burn::prelude::*;
use core::{fmt, time::Duration};
use serde::Serialize;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    time::Instant,
};

#[derive(Config, Debug)]
pub struct ClassifyConfig {
    pub image: PathBuf,
    /// Class names, one per line.
    #[config(default = "PathBuf::from(\"imagenet_classes.txt\")")]
    pub labels: PathBuf,
    #[config(default = 10)]
    pub top_k: usize,
    #[config(default = 3)]
    pub warmup: usize,
    #[config(default = 10)]
    pub runs: usize,
    #[config(default = "WeightSource::Pretrained(AlexNetWeights::Imagenet1kV1)")]
    pub weights: WeightSource,
    pub cache_dir: Option<PathBuf>,
    /// Also write the predictions and timings as JSON.
    pub report: Option<PathBuf>,
    #[config(default = "AlexNetConfig::new()")]
    pub model: AlexNetConfig,
}

/// Outcome of [`run_classify`].
#[derive(Debug, Clone)]
pub struct Classification {
    pub predictions: Vec<Prediction>,
    pub labels: ClassLabels,
    pub preprocessing: Duration,
    pub inference: BenchmarkDurations,
}

impl Classification {
    pub fn top1_confidence(&self) -> f32 {
        confidence(&self.predictions, 1)
    }

    pub fn top5_confidence(&self) -> f32 {
        confidence(&self.predictions, 5)
    }

    pub fn tier(&self) -> ConfidenceTier {
        ConfidenceTier::from_probability(self.top1_confidence())
    }

    /// Write the predictions, with their labels, and the timings as JSON.
    pub fn save_json(&self, path: &Path) -> Result<(), ClassifyError> {
        let report = Report {
            predictions: self
                .predictions
                .iter()
                .map(|prediction| LabeledPrediction {
                    label: self.labels.name(prediction.class),
                    prediction: *prediction,
                })
                .collect(),
            top1_confidence: self.top1_confidence(),
            top5_confidence: self.top5_confidence(),
            preprocessing: self.preprocessing,
            inference: &self.inference,
        };

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writer.flush()?;

        Ok(())
    }
}

#[derive(Serialize)]
struct LabeledPrediction {
    label: String,
    #[serde(flatten)]
    prediction: Prediction,
}

#[derive(Serialize)]
struct Report<'a> {
    predictions: Vec<LabeledPrediction>,
    top1_confidence: f32,
    top5_confidence: f32,
    preprocessing: Duration,
    inference: &'a BenchmarkDurations,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Preprocessing time: {:.3} ms",
            self.preprocessing.as_secs_f64() * 1000.0
        )?;
        writeln!(f, "{}", self.inference)?;
        writeln!(f)?;
        writeln!(f, "Top-{} Predictions", self.predictions.len())?;
        writeln!(f)?;

        for (rank, prediction) in self.predictions.iter().enumerate() {
            writeln!(
                f,
                "{}. Class {:4} ({:<30}): {:.2}%",
                rank + 1,
                prediction.class,
                self.labels.name(prediction.class),
                prediction.probability * 100.0
            )?;
        }

        writeln!(f)?;
        writeln!(f, "Top-1 confidence: {:.2}%", self.top1_confidence() * 100.0)?;
        writeln!(f, "Top-5 confidence: {:.2}%", self.top5_confidence() * 100.0)?;
        write!(f, "{}", self.tier())
    }
}

/// Classify `config.image`, timing `config.runs` forward passes after
/// `config.warmup` untimed ones.
pub fn run_classify<B: Backend>(
    config: &ClassifyConfig,
    device: &B::Device,
) -> Result<Classification, ClassifyError> {
    let labels = ClassLabels::load(&config.labels);
    let model: AlexNet<B> = load_alexnet(
        &config.weights,
        &config.model,
        config.cache_dir.as_deref(),
        device,
    )?;

    let start = Instant::now();
    let input = load_image::<B>(&config.image, device)?;
    let preprocessing = start.elapsed();

    log::info!(
        "Running {} warmup and {} timed inferences",
        config.warmup,
        config.runs
    );
    let (inference, output) =
        run_benchmark(config.warmup, config.runs, || model.forward(input.clone()));
    let output = match output {
        Some(output) => output,
        None => model.forward(input),
    };

    let logits = output
        .into_data()
        .convert::<f32>()
        .into_vec::<f32>()
        .map_err(|err| ClassifyError::TensorData(format!("{err:?}")))?;
    check_logits(&logits)?;

    let predictions = top_k(&softmax(&logits), config.top_k);

    let classification = Classification {
        predictions,
        labels,
        preprocessing,
        inference,
    };
    if let Some(path) = &config.report {
        classification.save_json(path)?;
        log::info!("Saved report to {}", path.display());
    }

    Ok(classification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::{Rgb, RgbImage};

    type TestBackend = NdArray<f32>;

    #[test]
    fn defaults() {
        let config = ClassifyConfig::new(PathBuf::from("cat.jpg"));

        assert_eq!(config.labels, PathBuf::from("imagenet_classes.txt"));
        assert_eq!(config.top_k, 10);
        assert_eq!(config.warmup, 3);
        assert_eq!(config.runs, 10);
    }

    #[test]
    fn classifies_with_random_weights() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("image.png");
        RgbImage::from_pixel(64, 48, Rgb([200, 30, 90]))
            .save(&image)
            .unwrap();
        let labels = dir.path().join("labels.txt");
        std::fs::write(&labels, "zero\none\ntwo\nthree\n").unwrap();

        let report = dir.path().join("report.json");
        let config = ClassifyConfig::new(image)
            .with_labels(labels)
            .with_report(Some(report.clone()))
            .with_top_k(3)
            .with_warmup(0)
            .with_runs(2)
            .with_weights(WeightSource::Random)
            .with_model(AlexNetConfig::new().with_num_classes(4));

        let classification = run_classify::<TestBackend>(&config, &Default::default()).unwrap();

        assert_eq!(classification.predictions.len(), 3);
        assert_eq!(classification.inference.durations.len(), 2);
        let probabilities = classification
            .predictions
            .iter()
            .map(|p| p.probability)
            .collect::<Vec<_>>();
        assert!(probabilities.windows(2).all(|pair| pair[0] >= pair[1]));
        assert!(classification.top5_confidence() <= 1.0 + 1e-6);

        let text = classification.to_string();
        assert!(text.contains("Top-3 Predictions"));
        assert!(text.contains("Preprocessing time:"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(report).unwrap()).unwrap();
        assert_eq!(json["predictions"].as_array().unwrap().len(), 3);
        let label = json["predictions"][0]["label"].as_str().unwrap();
        assert!(["zero", "one", "two", "three"].contains(&label));
        assert_eq!(json["inference"]["durations"].as_array().unwrap().len(), 2);
    }
}
