//! Weight loading and binding.
//!
//! - [`WeightStore`]: flat key → tensor map read from SafeTensors files
//! - [`KeyTransform`] / [`LoadConfig`]: checkpoint naming conventions
//! - [`WeightBinder`]: resolves logical parameter names into kernels

mod binder;
mod store;

pub use binder::{fallback_on_missing, KeyTransform, LoadConfig, WeightBinder};
pub use store::WeightStore;
