//! Asset contract.
//!
//! The core never decodes images; it only needs the block footprint and the
//! list of legal texture variants. Loading failures are setup errors reported
//! before a run starts.

use crate::config::SimConfig;
use crate::AssetError;

/// What the simulation needs to know about block assets.
pub trait AssetStore {
    /// Block footprint `(width, height)` in world units.
    fn block_size(&self) -> (f64, f64);

    /// Legal block texture variants. Never empty.
    fn variants(&self) -> &[String];
}

/// An in-memory [`AssetStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StaticAssets {
    block_size: (f64, f64),
    variants: Vec<String>,
}

impl StaticAssets {
    pub fn new(block_size: (f64, f64), variants: Vec<String>) -> Result<Self, AssetError> {
        let (width, height) = block_size;
        if !(width > 0.0 && height > 0.0) {
            return Err(AssetError::BadFootprint { width, height });
        }
        if variants.is_empty() {
            return Err(AssetError::NoVariants);
        }
        Ok(Self {
            block_size,
            variants,
        })
    }

    /// Use the footprint and variant list declared in the config.
    pub fn from_config(config: &SimConfig) -> Result<Self, AssetError> {
        Self::new(config.block_size, config.block_variants.clone())
    }
}

impl AssetStore for StaticAssets {
    fn block_size(&self) -> (f64, f64) {
        self.block_size
    }

    fn variants(&self) -> &[String] {
        &self.variants
    }
}

/// Reject a store whose contents would break a run.
pub fn check(assets: &impl AssetStore) -> Result<(), AssetError> {
    let (width, height) = assets.block_size();
    if !(width > 0.0 && height > 0.0) {
        return Err(AssetError::BadFootprint { width, height });
    }
    if assets.variants().is_empty() {
        return Err(AssetError::NoVariants);
    }
    Ok(())
}
