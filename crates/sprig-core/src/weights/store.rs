//! SafeTensors weight store.
//!
//! Floating-point tensors are converted to f32 on load so every kernel
//! sees one dtype; integer tensors keep their integer type.
//!
//! # Example
//!
//! ```ignore
//! use sprig_core::weights::WeightStore;
//!
//! let store = WeightStore::from_file("model.safetensors".as_ref(), &Device::Cpu)?;
//! let table = store.get_tensor("embeddings.word_embeddings.weight")?;
//! ```

use crate::error::{EmbedError, Result};
use candle_core::{DType, Device, Tensor};
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Immutable key → tensor map.
#[derive(Debug, Clone)]
pub struct WeightStore {
    /// Loaded tensors indexed by name.
    tensors: HashMap<String, Tensor>,
    /// Device for loaded tensors.
    device: Device,
}

impl WeightStore {
    /// Load every `.safetensors` file in a directory.
    pub fn from_dir(dir: &Path, device: &Device) -> Result<Self> {
        let mut files: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |e| e == "safetensors") {
                files.push(path);
            }
        }

        // Sort for deterministic loading order
        files.sort();

        if files.is_empty() {
            return Err(EmbedError::InvalidInput(format!(
                "no .safetensors files found in {}",
                dir.display()
            )));
        }

        let mut tensors = HashMap::new();
        for path in &files {
            tensors.extend(Self::load_safetensors_file(path, device)?);
        }

        Ok(Self {
            tensors,
            device: device.clone(),
        })
    }

    /// Load a single SafeTensors file.
    pub fn from_file(path: &Path, device: &Device) -> Result<Self> {
        let tensors = Self::load_safetensors_file(path, device)?;
        Ok(Self {
            tensors,
            device: device.clone(),
        })
    }

    /// Wrap tensors already in memory.
    pub fn from_tensors(tensors: HashMap<String, Tensor>, device: &Device) -> Self {
        Self {
            tensors,
            device: device.clone(),
        }
    }

    fn load_safetensors_file(path: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
        let data = fs::read(path)?;
        let safetensors = SafeTensors::deserialize(&data).map_err(|e| {
            EmbedError::SafeTensors(format!("failed to deserialize {}: {}", path.display(), e))
        })?;

        let mut tensors = HashMap::new();
        let mut converted = 0usize;
        for (name, view) in safetensors.tensors() {
            if !matches!(view.dtype(), Dtype::F32 | Dtype::I64 | Dtype::U32 | Dtype::U8) {
                converted += 1;
            }
            let tensor = Self::view_to_tensor(&name, &view, device)?;
            tensors.insert(name, tensor);
        }

        if converted > 0 {
            tracing::warn!(
                file = %path.display(),
                converted,
                "converted tensors to f32"
            );
        }
        tracing::debug!(file = %path.display(), count = tensors.len(), "loaded safetensors");

        Ok(tensors)
    }

    /// Decode a SafeTensors view. Buffers may be unaligned, so values are copied out.
    fn view_to_tensor(
        name: &str,
        view: &safetensors::tensor::TensorView<'_>,
        device: &Device,
    ) -> Result<Tensor> {
        let shape: Vec<usize> = view.shape().to_vec();
        let data = view.data();

        let tensor = match view.dtype() {
            Dtype::F32 => {
                let values: Vec<f32> = bytemuck::pod_collect_to_vec(data);
                Tensor::from_vec(values, shape, device)?
            }
            Dtype::F16 => {
                let values: Vec<half::f16> = bytemuck::pod_collect_to_vec(data);
                Tensor::from_vec(values, shape, device)?.to_dtype(DType::F32)?
            }
            Dtype::BF16 => {
                let values: Vec<half::bf16> = bytemuck::pod_collect_to_vec(data);
                Tensor::from_vec(values, shape, device)?.to_dtype(DType::F32)?
            }
            Dtype::F64 => {
                let values: Vec<f64> = bytemuck::pod_collect_to_vec(data);
                let values: Vec<f32> = values.into_iter().map(|v| v as f32).collect();
                Tensor::from_vec(values, shape, device)?
            }
            Dtype::I64 => {
                let values: Vec<i64> = bytemuck::pod_collect_to_vec(data);
                Tensor::from_vec(values, shape, device)?
            }
            Dtype::I32 => {
                // Candle has no I32, upcast
                let values: Vec<i32> = bytemuck::pod_collect_to_vec(data);
                let values: Vec<i64> = values.into_iter().map(i64::from).collect();
                Tensor::from_vec(values, shape, device)?
            }
            Dtype::U32 => {
                let values: Vec<u32> = bytemuck::pod_collect_to_vec(data);
                Tensor::from_vec(values, shape, device)?
            }
            Dtype::U8 => Tensor::from_vec(data.to_vec(), shape, device)?,
            other => {
                return Err(EmbedError::SafeTensors(format!(
                    "unsupported dtype {:?} for tensor {}",
                    other, name
                )));
            }
        };

        Ok(tensor)
    }

    /// Write every tensor to a SafeTensors file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut entries: Vec<(String, Dtype, Vec<usize>, Vec<u8>)> = Vec::new();
        for (name, tensor) in &self.tensors {
            let flat = tensor.flatten_all()?;
            let (dtype, bytes) = match tensor.dtype() {
                DType::U32 => (
                    Dtype::U32,
                    bytemuck::cast_slice::<u32, u8>(&flat.to_vec1::<u32>()?).to_vec(),
                ),
                DType::I64 => (
                    Dtype::I64,
                    bytemuck::cast_slice::<i64, u8>(&flat.to_vec1::<i64>()?).to_vec(),
                ),
                DType::U8 => (Dtype::U8, flat.to_vec1::<u8>()?),
                _ => (
                    Dtype::F32,
                    bytemuck::cast_slice::<f32, u8>(&flat.to_dtype(DType::F32)?.to_vec1::<f32>()?).to_vec(),
                ),
            };
            entries.push((name.clone(), dtype, tensor.dims().to_vec(), bytes));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut views = Vec::with_capacity(entries.len());
        for (name, dtype, shape, bytes) in &entries {
            let view = safetensors::tensor::TensorView::new(*dtype, shape.clone(), bytes)
                .map_err(|e| EmbedError::SafeTensors(format!("{}: {}", name, e)))?;
            views.push((name.as_str(), view));
        }

        safetensors::serialize_to_file(views, &None, path)
            .map_err(|e| EmbedError::SafeTensors(format!("failed to write {}: {}", path.display(), e)))
    }

    /// Get a tensor by name.
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    /// Get a tensor by name, returning [`EmbedError::MissingWeight`] if absent.
    pub fn get_tensor(&self, name: &str) -> Result<Tensor> {
        self.tensors
            .get(name)
            .cloned()
            .ok_or_else(|| EmbedError::MissingWeight(name.to_string()))
    }

    /// Check if a tensor exists.
    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    /// All tensor names, sorted.
    pub fn tensor_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tensors.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Get the number of loaded tensors.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Check if no tensors are loaded.
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Get the device tensors are loaded to.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Get tensors matching a prefix.
    pub fn get_with_prefix(&self, prefix: &str) -> HashMap<&str, &Tensor> {
        self.tensors
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, tensor)| (name.as_str(), tensor))
            .collect()
    }
}
