//! Loading a model directory into a [`ModelBundle`].

use anyhow::{anyhow, bail, Context, Result};
use candle_core::Device;
use sprig_core::{
    bundle::ModelBundle,
    models::{
        model_type_of, Architecture, Bert, BertConfig, ClipText, ClipTextConfig, Model, Model2Vec,
        Model2VecConfig, ModernBert, ModernBertConfig, NomicBert, NomicBertConfig,
        StaticEmbeddings, Word2Vec,
    },
    tokenizer::HfTokenizer,
    weights::{KeyTransform, LoadConfig, WeightBinder, WeightStore},
};
use std::path::{Path, PathBuf};

/// Directory of sentence-transformers static embedding checkpoints.
const STATIC_EMBEDDING_DIR: &str = "0_StaticEmbedding";

/// Configuration for loading a bundle.
#[derive(Debug, Clone, Default)]
pub struct LoaderConfig {
    /// Model directory (config, weights, tokenizer).
    pub model_dir: PathBuf,
    /// Skip detection and load as this architecture.
    pub architecture: Option<Architecture>,
    /// File names and key transform. `None` picks the layout of the
    /// detected architecture.
    pub load_config: Option<LoadConfig>,
    /// Keep only the leading channels of pooled vectors.
    pub truncate_dimension: Option<usize>,
}

/// Builder for a [`ModelBundle`] read from disk.
///
/// ```rust,ignore
/// let bundle = BundleLoader::new("models/bge-small-en")
///     .truncate_dimension(256)
///     .build()?;
/// let v = bundle.encode("hello", Some(512), PostProcess::MeanPoolAndNormalize)?;
/// ```
pub struct BundleLoader {
    config: LoaderConfig,
    device: Device,
}

impl BundleLoader {
    /// Loader for `model_dir` on the CPU.
    pub fn new(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            config: LoaderConfig {
                model_dir: model_dir.into(),
                ..Default::default()
            },
            device: Device::Cpu,
        }
    }

    /// Loader from a prepared configuration.
    pub fn with_config(config: LoaderConfig) -> Self {
        Self {
            config,
            device: Device::Cpu,
        }
    }

    /// Force an architecture instead of reading `model_type`.
    pub fn architecture(mut self, architecture: Architecture) -> Self {
        self.config.architecture = Some(architecture);
        self
    }

    /// Set file names and key transform.
    pub fn load_config(mut self, load_config: LoadConfig) -> Self {
        self.config.load_config = Some(load_config);
        self
    }

    /// Prefix every weight key, e.g. `roberta.` for task-head checkpoints.
    pub fn weight_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        let load_config = self.config.load_config.take().unwrap_or_default();
        self.config.load_config =
            Some(load_config.with_key_transform(KeyTransform::AddPrefix(prefix.into())));
        self
    }

    /// Set the device tensors are placed on.
    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Truncate pooled vectors to `dim` channels.
    pub fn truncate_dimension(mut self, dim: usize) -> Self {
        self.config.truncate_dimension = Some(dim);
        self
    }

    /// Loader configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Architecture the directory will be loaded as.
    ///
    /// An explicit override wins; then `model_type` in the config file;
    /// then the sentence-transformers static layout.
    pub fn detect_architecture(&self) -> Result<Architecture> {
        if let Some(arch) = self.config.architecture {
            return Ok(arch);
        }

        let dir = &self.config.model_dir;
        let config_name = self
            .config
            .load_config
            .as_ref()
            .map_or("config.json", |c| c.config_file_name.as_str());
        let config_path = dir.join(config_name);
        if config_path.is_file() {
            let model_type = model_type_of(&config_path)
                .with_context(|| format!("failed to read {}", config_path.display()))?
                .ok_or_else(|| anyhow!("{} has no model_type", config_path.display()))?;
            return Architecture::from_model_type(&model_type)
                .ok_or_else(|| anyhow!("unsupported model_type '{}'", model_type));
        }

        if dir.join(STATIC_EMBEDDING_DIR).is_dir() {
            return Ok(Architecture::StaticEmbeddings);
        }

        bail!(
            "cannot determine architecture of {}: no {} and no {} directory",
            dir.display(),
            config_name,
            STATIC_EMBEDDING_DIR
        )
    }

    /// Read config, weights and tokenizer and assemble the bundle.
    pub fn build(self) -> Result<ModelBundle> {
        let architecture = self.detect_architecture()?;
        if architecture == Architecture::Word2Vec {
            bail!("word vectors are plain text files; use load_word2vec");
        }

        let dir = &self.config.model_dir;
        let load_config = match self.config.load_config.clone() {
            Some(c) => c,
            None if architecture == Architecture::StaticEmbeddings => {
                LoadConfig::static_embeddings()
            }
            None => LoadConfig::default(),
        };

        tracing::info!(
            "Loading {} from {} on {:?}",
            architecture,
            dir.display(),
            self.device
        );

        let weights_path = dir.join(&load_config.weights_file_name);
        let store = WeightStore::from_file(&weights_path, &self.device)
            .with_context(|| format!("failed to load weights {}", weights_path.display()))?;
        tracing::debug!("{} tensors in {}", store.len(), weights_path.display());

        let binder = WeightBinder::new(&store, &load_config.key_transform);
        let config_path = dir.join(&load_config.config_file_name);
        let model = load_model(architecture, &binder, &config_path)
            .with_context(|| format!("failed to build {} model", architecture))?;

        let tokenizer_path = dir.join(&load_config.tokenizer_file_name);
        let tokenizer = HfTokenizer::from_file(&tokenizer_path)
            .with_context(|| format!("failed to load tokenizer {}", tokenizer_path.display()))?;

        Ok(ModelBundle::new(model, tokenizer)
            .with_truncate_dimension(self.config.truncate_dimension))
    }
}

fn load_model(
    architecture: Architecture,
    binder: &WeightBinder<'_>,
    config_path: &Path,
) -> Result<Model> {
    let model = match architecture {
        Architecture::Bert | Architecture::Roberta | Architecture::XlmRoberta => {
            let config = BertConfig::from_file(config_path, architecture)?;
            Model::Bert(Bert::load(binder, config, architecture)?)
        }
        Architecture::ModernBert => {
            Model::ModernBert(ModernBert::load(binder, ModernBertConfig::from_file(config_path)?)?)
        }
        Architecture::NomicBert => {
            Model::NomicBert(NomicBert::load(binder, NomicBertConfig::from_file(config_path)?)?)
        }
        Architecture::Clip => {
            Model::Clip(ClipText::load(binder, ClipTextConfig::from_file(config_path)?)?)
        }
        Architecture::Model2Vec => {
            let normalize = if config_path.is_file() {
                Model2VecConfig::from_file(config_path)?.normalize.unwrap_or(false)
            } else {
                false
            };
            Model::Model2Vec(Model2Vec::load(binder, normalize)?)
        }
        Architecture::StaticEmbeddings => Model::StaticEmbeddings(StaticEmbeddings::load(binder)?),
        Architecture::Word2Vec => bail!("word vectors have no weight store"),
    };
    Ok(model)
}

/// Load a word2vec / GloVe text file as a bundle with a whitespace tokenizer.
pub fn load_word2vec(path: impl AsRef<Path>, device: &Device) -> Result<ModelBundle> {
    let path = path.as_ref();
    let model = Word2Vec::from_file(path, device)
        .with_context(|| format!("failed to load word vectors {}", path.display()))?;
    tracing::info!("Loaded {} word vectors of width {}", model.len(), model.hidden_size());
    Ok(ModelBundle::word2vec(model))
}
