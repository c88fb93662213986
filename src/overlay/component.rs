use std::sync::Arc;

use tracing::debug;

use super::host::{FragmentId, HostError, InsertPosition, OverlayHost};
use crate::models::NodePath;

/// Owns exactly one injected node inside a resolver-provided container.
pub struct SubComponent {
    name: String,
    host: Arc<dyn OverlayHost>,
    container: NodePath,
    position: InsertPosition,
    fragment: Option<FragmentId>,
    last_html: Option<String>,
}

impl SubComponent {
    pub fn new(
        name: impl Into<String>,
        host: Arc<dyn OverlayHost>,
        container: NodePath,
        position: InsertPosition,
    ) -> Self {
        Self {
            name: name.into(),
            host,
            container,
            position,
            fragment: None,
            last_html: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn container(&self) -> &NodePath {
        &self.container
    }

    /// Injected and still present in a live container.
    pub fn is_attached(&self) -> bool {
        match self.fragment {
            Some(id) => self.host.contains(id) && self.host.is_live(&self.container),
            None => false,
        }
    }

    /// Show `html`, injecting the node on first use and after it was lost.
    pub fn render(&mut self, html: &str) -> Result<(), HostError> {
        if self.is_attached() {
            if self.last_html.as_deref() == Some(html) {
                return Ok(());
            }
            if let Some(id) = self.fragment {
                self.host.update(id, html)?;
            }
        } else {
            // A stale handle may still exist if only the container went away
            if let Some(id) = self.fragment.take() {
                self.host.remove(id);
            }
            self.fragment = Some(self.host.inject(&self.container, self.position, html)?);
            debug!("Mounted {} at {}", self.name, self.container);
        }
        self.last_html = Some(html.to_string());
        Ok(())
    }

    /// Remove the injected node. Safe to call any number of times.
    pub fn unmount(&mut self) {
        if let Some(id) = self.fragment.take() {
            self.host.remove(id);
        }
        self.last_html = None;
    }
}

impl Drop for SubComponent {
    fn drop(&mut self) {
        self.unmount();
    }
}
