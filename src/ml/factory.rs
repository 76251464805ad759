// ============================================================
// Layer 5 — Model Factories
// ============================================================
// A blueprint file names an architecture; the registry maps
// that name to a factory, and the factory turns
// (feat_dim, num_targets, model params) into an XvectorConfig.
//
//   blueprints/xvector.json
//     { "architecture": "xvector", "embedding_dim": 512 }
//
//   "xvector"           → 5 frame layers   (Snyder et al. 2018)
//   "extended-xvector"  → 10 frame layers  (E-TDNN, Snyder et al. 2019)
//
// Factories produce configs rather than models so the same
// lookup serves any backend.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::descriptor::Nonlinearity;
use crate::domain::error::LauncherError;
use crate::domain::params::ModelParams;
use crate::ml::model::{TdnnLayerConfig, XvectorConfig};

const LEAKY_SLOPE: f64 = 0.01;

// ─── Blueprint ────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub architecture:   String,
    #[serde(default = "default_embedding_dim")]
    pub embedding_dim:  usize,
    #[serde(default = "default_channels")]
    pub channels:       usize,
    #[serde(default = "default_stats_channels")]
    pub stats_channels: usize,
}

fn default_embedding_dim() -> usize { 512 }
fn default_channels() -> usize { 512 }
fn default_stats_channels() -> usize { 1500 }

impl Blueprint {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read blueprint '{}'", path.display()))?;
        serde_json::from_str(&json).map_err(|e| {
            LauncherError::config(format!("malformed blueprint '{}': {e}", path.display())).into()
        })
    }
}

// ─── ModelFactory ─────────────────────────────────────────────────────────────
pub trait ModelFactory: Send + Sync {
    /// Architecture name as written in blueprints and descriptors.
    fn name(&self) -> &'static str;

    fn frame_layers(&self, blueprint: &Blueprint) -> Vec<TdnnLayerConfig>;

    fn build(
        &self,
        blueprint:   &Blueprint,
        feat_dim:    usize,
        num_targets: usize,
        params:      &ModelParams,
    ) -> XvectorConfig {
        let leaky_slope = match params.nonlinearity {
            Nonlinearity::Relu      => 0.0,
            Nonlinearity::LeakyRelu => LEAKY_SLOPE,
        };
        XvectorConfig::new(feat_dim, num_targets, self.frame_layers(blueprint))
            .with_embedding_dim(blueprint.embedding_dim)
            .with_leaky_slope(leaky_slope)
            .with_aug_dropout(params.aug_dropout)
            .with_training(params.training)
    }
}

pub struct StandardXvectorFactory;

impl ModelFactory for StandardXvectorFactory {
    fn name(&self) -> &'static str { "xvector" }

    fn frame_layers(&self, bp: &Blueprint) -> Vec<TdnnLayerConfig> {
        vec![
            TdnnLayerConfig::new(bp.channels, 5, 1),
            TdnnLayerConfig::new(bp.channels, 3, 2),
            TdnnLayerConfig::new(bp.channels, 3, 3),
            TdnnLayerConfig::new(bp.channels, 1, 1),
            TdnnLayerConfig::new(bp.stats_channels, 1, 1),
        ]
    }
}

pub struct ExtendedXvectorFactory;

impl ModelFactory for ExtendedXvectorFactory {
    fn name(&self) -> &'static str { "extended-xvector" }

    fn frame_layers(&self, bp: &Blueprint) -> Vec<TdnnLayerConfig> {
        vec![
            TdnnLayerConfig::new(bp.channels, 5, 1),
            TdnnLayerConfig::new(bp.channels, 1, 1),
            TdnnLayerConfig::new(bp.channels, 3, 2),
            TdnnLayerConfig::new(bp.channels, 1, 1),
            TdnnLayerConfig::new(bp.channels, 3, 3),
            TdnnLayerConfig::new(bp.channels, 1, 1),
            TdnnLayerConfig::new(bp.channels, 3, 4),
            TdnnLayerConfig::new(bp.channels, 1, 1),
            TdnnLayerConfig::new(bp.channels, 1, 1),
            TdnnLayerConfig::new(bp.stats_channels, 1, 1),
        ]
    }
}

// ─── FactoryRegistry ──────────────────────────────────────────────────────────
pub struct FactoryRegistry {
    factories: Vec<Box<dyn ModelFactory>>,
}

impl FactoryRegistry {
    pub fn empty() -> Self {
        Self { factories: Vec::new() }
    }

    /// Both built-in architectures.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(StandardXvectorFactory));
        registry.register(Box::new(ExtendedXvectorFactory));
        registry
    }

    /// Later registrations replace earlier ones with the same name.
    pub fn register(&mut self, factory: Box<dyn ModelFactory>) {
        self.factories.retain(|f| f.name() != factory.name());
        self.factories.push(factory);
    }

    pub fn get(&self, architecture: &str) -> Result<&dyn ModelFactory, LauncherError> {
        self.factories
            .iter()
            .find(|f| f.name() == architecture)
            .map(|f| f.as_ref())
            .ok_or_else(|| {
                LauncherError::config(format!(
                    "unknown architecture '{architecture}' (registered: {})",
                    self.names().join(", ")
                ))
            })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f.name()).collect()
    }
}
