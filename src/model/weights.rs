//! Pretrained AlexNet checkpoints.
//!
//! Checkpoints are downloaded once into `<cache>/checkpoints/` and imported
//! through Burn's [`PytorchStore`], which maps torchvision's `features.N` and
//! `classifier.N` keys onto the named layers of [`AlexNet`].

use crate::{
    error::WeightsError,
    model::{AlexNet, AlexNetConfig},
};
use burn::{
    prelude::*,
    store::{ModuleSnapshot, PytorchStore},
};
use indicatif::{ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use std::{
    fs::{self, File},
    io::{BufWriter, Read, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

const CHUNK_SIZE: usize = 64 * 1024;

/// torchvision `nn.Sequential` indices and the AlexNet fields they load into.
const KEY_REMAPPING: [(&str, &str); 8] = [
    (r"^features\.0\.(.+)$", "conv1.$1"),
    (r"^features\.3\.(.+)$", "conv2.$1"),
    (r"^features\.6\.(.+)$", "conv3.$1"),
    (r"^features\.8\.(.+)$", "conv4.$1"),
    (r"^features\.10\.(.+)$", "conv5.$1"),
    (r"^classifier\.1\.(.+)$", "fc1.$1"),
    (r"^classifier\.4\.(.+)$", "fc2.$1"),
    (r"^classifier\.6\.(.+)$", "fc3.$1"),
];

/// Named weight sets published for AlexNet.
#[derive(Config, Debug, Copy, PartialEq, Eq)]
pub enum AlexNetWeights {
    /// ImageNet-1k, 56.522% top-1 accuracy.
    Imagenet1kV1,
}

impl AlexNetWeights {
    pub fn url(&self) -> &'static str {
        match self {
            AlexNetWeights::Imagenet1kV1 => {
                "https://download.pytorch.org/models/alexnet-owt-7be5be79.pth"
            }
        }
    }

    /// Leading hex digits of the checkpoint's SHA-256 digest.
    pub fn hash_prefix(&self) -> &'static str {
        match self {
            AlexNetWeights::Imagenet1kV1 => "7be5be79",
        }
    }

    pub fn num_classes(&self) -> usize {
        match self {
            AlexNetWeights::Imagenet1kV1 => 1000,
        }
    }

    pub fn file_name(&self) -> &'static str {
        let url = self.url();
        url.rsplit('/').next().unwrap_or(url)
    }

    /// Path of the checkpoint, downloading it into `cache_dir` when missing.
    pub fn fetch(&self, cache_dir: &Path) -> Result<PathBuf, WeightsError> {
        let checkpoints = cache_dir.join("checkpoints");
        let path = checkpoints.join(self.file_name());

        if path.exists() {
            log::debug!("Using cached checkpoint {}", path.display());
            return Ok(path);
        }

        fs::create_dir_all(&checkpoints)?;
        let partial = checkpoints.join(format!("{}.part", self.file_name()));

        log::info!("Downloading {} to {}", self.url(), path.display());
        let digest = download(self.url(), &partial, self.file_name())?;

        if let Err(err) = verify_hash_prefix(&digest, self.hash_prefix()) {
            fs::remove_file(&partial)?;
            return Err(err);
        }

        fs::rename(&partial, &path)?;
        Ok(path)
    }
}

impl FromStr for AlexNetWeights {
    type Err = WeightsError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "IMAGENET1K_V1" | "DEFAULT" => Ok(AlexNetWeights::Imagenet1kV1),
            _ => Err(WeightsError::UnknownWeights(name.to_string())),
        }
    }
}

/// Where the parameters of the model come from.
#[derive(Config, Debug, PartialEq)]
pub enum WeightSource {
    /// A published checkpoint, downloaded on first use.
    Pretrained(AlexNetWeights),
    /// A local PyTorch checkpoint with torchvision key names.
    File(PathBuf),
    /// The initializers of [`AlexNetConfig`].
    Random,
}

/// `<platform cache>/burn-mlir`.
pub fn default_cache_dir() -> Result<PathBuf, WeightsError> {
    dirs::cache_dir()
        .map(|dir| dir.join("burn-mlir"))
        .ok_or(WeightsError::NoCacheDir)
}

/// Build an AlexNet and load its parameters from `source`.
///
/// Pretrained weights override `config.num_classes` with the number of classes
/// they were trained on.
pub fn load_alexnet<B: Backend>(
    source: &WeightSource,
    config: &AlexNetConfig,
    cache_dir: Option<&Path>,
    device: &B::Device,
) -> Result<AlexNet<B>, WeightsError> {
    let (checkpoint, config) = match source {
        WeightSource::Random => {
            log::info!("Using randomly initialized weights");
            return Ok(config.init(device));
        }
        WeightSource::File(path) => (path.clone(), config.clone()),
        WeightSource::Pretrained(weights) => {
            let cache_dir = match cache_dir {
                Some(dir) => dir.to_path_buf(),
                None => default_cache_dir()?,
            };
            if config.num_classes != weights.num_classes() {
                log::warn!(
                    "{weights:?} has {} classes, ignoring num_classes = {}",
                    weights.num_classes(),
                    config.num_classes
                );
            }
            let config = config.clone().with_num_classes(weights.num_classes());

            (weights.fetch(&cache_dir)?, config)
        }
    };

    log::info!("Loading weights from {}", checkpoint.display());

    let mut model = config.init::<B>(device);
    let mut store = pytorch_store(&checkpoint);
    let result = model.load_from(&mut store)?;
    log::debug!("{result:?}");

    Ok(model)
}

fn pytorch_store(checkpoint: &Path) -> PytorchStore {
    KEY_REMAPPING.iter().fold(
        PytorchStore::from_file(checkpoint).map_indices_contiguous(false),
        |store, &(from, to)| store.with_key_remapping(from, to),
    )
}

/// Stream `url` into `destination`, returning the SHA-256 hex digest.
fn download(url: &str, destination: &Path, message: &str) -> Result<String, WeightsError> {
    let response = reqwest::blocking::get(url)?.error_for_status()?;

    let progress = ProgressBar::new(response.content_length().unwrap_or(0));
    progress.set_style(download_style());
    progress.set_message(message.to_string());

    let mut file = BufWriter::new(File::create(destination)?);
    let digest = copy_hashed(response, &mut file, &progress)?;
    file.flush()?;
    progress.finish_and_clear();

    Ok(digest)
}

fn download_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}\n    {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({eta})")
        .map(|style| style.progress_chars("=> "))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn copy_hashed<R: Read, W: Write>(
    mut reader: R,
    writer: &mut W,
    progress: &ProgressBar,
) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        writer.write_all(&buffer[..read])?;
        progress.inc(read as u64);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

fn verify_hash_prefix(digest: &str, prefix: &str) -> Result<(), WeightsError> {
    if digest.starts_with(prefix) {
        return Ok(());
    }

    Err(WeightsError::HashMismatch {
        expected: prefix.to_string(),
        actual: digest.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn weight_names_parse() {
        for name in ["IMAGENET1K_V1", "imagenet1k-v1", "DEFAULT", " default "] {
            assert_eq!(
                name.parse::<AlexNetWeights>().unwrap(),
                AlexNetWeights::Imagenet1kV1
            );
        }

        assert!(matches!(
            "IMAGENET1K_V2".parse::<AlexNetWeights>(),
            Err(WeightsError::UnknownWeights(name)) if name == "IMAGENET1K_V2"
        ));
    }

    #[test]
    fn checkpoint_file_name_carries_the_hash_prefix() {
        let weights = AlexNetWeights::Imagenet1kV1;

        assert_eq!(weights.file_name(), "alexnet-owt-7be5be79.pth");
        assert!(weights.file_name().contains(weights.hash_prefix()));
        assert_eq!(weights.num_classes(), 1000);
    }

    #[test]
    fn copy_hashed_writes_and_digests() {
        let mut output = Vec::new();

        let digest = copy_hashed(&b"abc"[..], &mut output, &ProgressBar::hidden()).unwrap();

        assert_eq!(output, b"abc");
        assert_eq!(digest, ABC_SHA256);
    }

    #[test]
    fn hash_prefix_mismatch_is_rejected() {
        assert!(verify_hash_prefix(ABC_SHA256, "ba7816bf").is_ok());

        match verify_hash_prefix(ABC_SHA256, "7be5be79") {
            Err(WeightsError::HashMismatch { expected, actual }) => {
                assert_eq!(expected, "7be5be79");
                assert_eq!(actual, ABC_SHA256);
            }
            other => panic!("expected a hash mismatch, got {other:?}"),
        }
    }

    #[test]
    fn cached_checkpoint_is_not_downloaded_again() {
        let cache = tempfile::tempdir().unwrap();
        let weights = AlexNetWeights::Imagenet1kV1;
        let cached = cache.path().join("checkpoints").join(weights.file_name());
        fs::create_dir_all(cached.parent().unwrap()).unwrap();
        fs::write(&cached, b"checkpoint").unwrap();

        assert_eq!(weights.fetch(cache.path()).unwrap(), cached);
    }

    #[test]
    fn random_source_uses_the_config() {
        type TestBackend = burn::backend::NdArray<f32>;

        let device = Default::default();
        let config = AlexNetConfig::new().with_num_classes(7);

        let model =
            load_alexnet::<TestBackend>(&WeightSource::Random, &config, None, &device).unwrap();

        assert_eq!(model.num_classes(), 7);
    }

    /// Parameter names of torchvision's `alexnet()` state dict.
    fn torchvision_keys() -> Vec<String> {
        ["features.0", "features.3", "features.6", "features.8", "features.10"]
            .into_iter()
            .chain(["classifier.1", "classifier.4", "classifier.6"])
            .flat_map(|layer| [format!("{layer}.weight"), format!("{layer}.bias")])
            .collect()
    }

    #[test]
    fn torchvision_keys_map_onto_every_parameter() {
        use burn::{
            module::ParamId,
            store::{KeyRemapper, TensorSnapshot},
            tensor::TensorData,
        };
        use std::collections::BTreeSet;
        type TestBackend = burn::backend::NdArray<f32>;

        let remapper = KEY_REMAPPING
            .iter()
            .fold(KeyRemapper::new(), |remapper, &(from, to)| {
                remapper.add_pattern(from, to.to_string()).unwrap()
            });
        let snapshots = torchvision_keys()
            .into_iter()
            .map(|key| {
                TensorSnapshot::from_data(
                    TensorData::new(vec![0.0f32], [1]),
                    key.split('.').map(str::to_string).collect(),
                    vec![],
                    ParamId::new(),
                )
            })
            .collect();

        let (remapped, _) = remapper.remap(snapshots);
        let remapped = remapped
            .iter()
            .map(|snapshot| snapshot.full_path())
            .collect::<BTreeSet<_>>();

        let model = AlexNetConfig::new().init::<TestBackend>(&Default::default());
        let expected = model
            .collect(None, None, false)
            .iter()
            .map(|snapshot| snapshot.full_path())
            .collect::<BTreeSet<_>>();

        assert_eq!(remapped.len(), 16);
        assert_eq!(remapped, expected);
    }

    #[test]
    fn missing_checkpoint_file_fails() {
        type TestBackend = burn::backend::NdArray<f32>;

        let device = Default::default();
        let source = WeightSource::File(PathBuf::from("does/not/exist.pth"));

        let result = load_alexnet::<TestBackend>(&source, &AlexNetConfig::new(), None, &device);

        assert!(matches!(result, Err(WeightsError::Store(_))));
    }
}
