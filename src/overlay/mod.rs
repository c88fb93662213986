//! Overlay lifecycle.
//!
//! Features are mounted onto containers from a `LobbySnapshot` and kept in
//! place across repeated ticks. A feature is rebuilt only when it is missing
//! or one of its nodes is no longer attached to a live container.

pub mod component;
pub mod features;
pub mod host;

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info};

use crate::models::MetricsAggregate;

pub use component::SubComponent;
pub use features::{MapFeature, PlayerFeature};
pub use host::{FragmentId, HostError, InjectedFragment, InsertPosition, MemoryHost, OverlayHost};

/// A named overlay made of sub-components.
pub trait Feature: Send {
    fn key(&self) -> &str;

    /// All sub-components are injected into live containers.
    fn is_attached(&self) -> bool;

    /// Render with the latest metrics, or a placeholder while none exist.
    fn render(&mut self, metrics: Option<&MetricsAggregate>) -> Result<(), HostError>;

    /// Remove every injected node. Safe to repeat.
    fn unmount(&mut self);
}

/// Mounted features by key.
#[derive(Default)]
pub struct FeatureManager {
    features: BTreeMap<String, Box<dyn Feature>>,
    metrics: Option<MetricsAggregate>,
}

impl FeatureManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `key` is mounted. Returns `true` when a new instance was
    /// built, `false` when the mounted one was kept.
    pub fn ensure<F>(&mut self, key: &str, build: F) -> Result<bool, HostError>
    where
        F: FnOnce() -> Box<dyn Feature>,
    {
        if let Some(existing) = self.features.get(key) {
            if existing.is_attached() {
                return Ok(false);
            }
        }

        if let Some(mut stale) = self.features.remove(key) {
            debug!("Feature {} detached; rebuilding", key);
            stale.unmount();
        }

        let mut feature = build();
        feature.render(self.metrics.as_ref())?;
        info!("Mounted feature {}", key);
        self.features.insert(key.to_string(), feature);
        Ok(true)
    }

    /// Unmount features whose key is not in `keep`.
    pub fn retain(&mut self, keep: &HashSet<String>) {
        let gone: Vec<String> = self
            .features
            .keys()
            .filter(|k| !keep.contains(*k))
            .cloned()
            .collect();
        for key in gone {
            self.unmount_feature(&key);
        }
    }

    /// Store `metrics` and re-render every mounted feature.
    pub fn render(&mut self, metrics: Option<MetricsAggregate>) -> Result<(), HostError> {
        self.metrics = metrics;
        for feature in self.features.values_mut() {
            feature.render(self.metrics.as_ref())?;
        }
        Ok(())
    }

    pub fn unmount_feature(&mut self, key: &str) -> bool {
        match self.features.remove(key) {
            Some(mut feature) => {
                feature.unmount();
                debug!("Unmounted feature {}", key);
                true
            }
            None => false,
        }
    }

    /// Unmount everything.
    pub fn unmount(&mut self) {
        for (_, mut feature) in std::mem::take(&mut self.features) {
            feature.unmount();
        }
    }

    pub fn is_mounted(&self, key: &str) -> bool {
        self.features.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.features.keys().cloned().collect()
    }

    pub fn metrics(&self) -> Option<&MetricsAggregate> {
        self.metrics.as_ref()
    }
}

impl Drop for FeatureManager {
    fn drop(&mut self) {
        self.unmount();
    }
}
