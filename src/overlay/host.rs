//! Host document seam and its in-memory implementation.

use std::collections::HashSet;
use std::sync::Mutex;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::NodePath;
use crate::resolve::HostPage;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Container {0} is not in the document")]
    ContainerMissing(NodePath),

    #[error("Fragment {0} is not in the document")]
    UnknownFragment(FragmentId),
}

/// Handle of one injected overlay node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FragmentId(Uuid);

impl FragmentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FragmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FragmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition {
    Prepend,
    Append,
}

/// Where overlays are written. The host owns the document; implementations
/// insert, update and remove overlay nodes only.
pub trait OverlayHost: Send + Sync {
    /// The document as it is right now.
    fn page(&self) -> HostPage;

    /// Whether `container` still resolves in the current document.
    fn is_live(&self, container: &NodePath) -> bool;

    fn inject(
        &self,
        container: &NodePath,
        position: InsertPosition,
        html: &str,
    ) -> Result<FragmentId, HostError>;

    fn update(&self, fragment: FragmentId, html: &str) -> Result<(), HostError>;

    /// Remove a fragment. Returns `false` if it was already gone.
    fn remove(&self, fragment: FragmentId) -> bool;

    fn contains(&self, fragment: FragmentId) -> bool;
}

/// One overlay node as held by [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InjectedFragment {
    pub id: FragmentId,
    pub container: NodePath,
    pub position: InsertPosition,
    pub html: String,
}

struct HostState {
    page: HostPage,
    /// Container paths present in `page`, computed on page change
    live: HashSet<NodePath>,
    fragments: Vec<InjectedFragment>,
}

/// Host backed by a [`HostPage`]. Replacing the page acts like a host
/// re-render: every injected fragment is lost.
pub struct MemoryHost {
    state: Mutex<HostState>,
}

impl MemoryHost {
    pub fn new(page: HostPage) -> Self {
        let live = live_paths(&page);
        Self {
            state: Mutex::new(HostState {
                page,
                live,
                fragments: Vec::new(),
            }),
        }
    }

    pub fn replace_page(&self, page: HostPage) {
        let live = live_paths(&page);
        let mut state = self.lock();
        state.page = page;
        state.live = live;
        state.fragments.clear();
    }

    pub fn fragments(&self) -> Vec<InjectedFragment> {
        self.lock().fragments.clone()
    }

    pub fn fragments_in(&self, container: &NodePath) -> Vec<InjectedFragment> {
        self.lock()
            .fragments
            .iter()
            .filter(|f| &f.container == container)
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Paths of every element in the page.
fn live_paths(page: &HostPage) -> HashSet<NodePath> {
    let document = page.parse();
    document
        .root_element()
        .descendants()
        .filter_map(scraper::ElementRef::wrap)
        .map(NodePath::of)
        .collect()
}

impl OverlayHost for MemoryHost {
    fn page(&self) -> HostPage {
        self.lock().page.clone()
    }

    fn is_live(&self, container: &NodePath) -> bool {
        self.lock().live.contains(container)
    }

    fn inject(
        &self,
        container: &NodePath,
        position: InsertPosition,
        html: &str,
    ) -> Result<FragmentId, HostError> {
        let mut state = self.lock();
        if !state.live.contains(container) {
            return Err(HostError::ContainerMissing(container.clone()));
        }
        let id = FragmentId::new();
        state.fragments.push(InjectedFragment {
            id,
            container: container.clone(),
            position,
            html: html.to_string(),
        });
        Ok(id)
    }

    fn update(&self, fragment: FragmentId, html: &str) -> Result<(), HostError> {
        let mut state = self.lock();
        let entry = state
            .fragments
            .iter_mut()
            .find(|f| f.id == fragment)
            .ok_or(HostError::UnknownFragment(fragment))?;
        entry.html = html.to_string();
        Ok(())
    }

    fn remove(&self, fragment: FragmentId) -> bool {
        let mut state = self.lock();
        let before = state.fragments.len();
        state.fragments.retain(|f| f.id != fragment);
        state.fragments.len() != before
    }

    fn contains(&self, fragment: FragmentId) -> bool {
        self.lock().fragments.iter().any(|f| f.id == fragment)
    }
}
