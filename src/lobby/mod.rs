//! Per-lobby controller.
//!
//! A [`Matchroom`] ties the pieces together for one open lobby: it resolves
//! the host page, keeps overlay features mounted, and recomputes metrics
//! when the lobby or the range options change.
//!
//! Concurrency rules:
//! - `update` calls that overlap share one in-flight resolution
//! - every metrics pass takes a fresh pass id; a pass whose id is no longer
//!   the latest when it finishes is dropped without touching shared state
//! - DOM mutations and option changes go through one debouncer per lobby

pub mod scheduler;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::fetch::MatchApi;
use crate::models::{LobbySnapshot, MetricsAggregate, RangeOptions};
use crate::notify::{Listeners, Subscription};
use crate::options::RangeOptionStore;
use crate::overlay::{Feature, FeatureManager, MapFeature, OverlayHost, PlayerFeature};
use crate::pipeline;
use crate::resolve::LobbyResolver;

pub use scheduler::Debouncer;

pub const DEFAULT_RENDER_DEBOUNCE: Duration = Duration::from_millis(275);

type SharedUpdate = Shared<BoxFuture<'static, Option<LobbySnapshot>>>;

#[derive(Default)]
struct RoomState {
    snapshot: Option<LobbySnapshot>,
    metrics: Option<MetricsAggregate>,
    features: FeatureManager,
}

/// Event wiring installed by [`Matchroom::start`].
struct Wiring {
    options: Subscription,
    watcher: JoinHandle<()>,
}

struct RoomInner {
    api: MatchApi,
    resolver: LobbyResolver,
    host: Arc<dyn OverlayHost>,
    options: RangeOptionStore,
    render_debounce: Duration,

    state: Mutex<RoomState>,
    in_flight: Mutex<Option<SharedUpdate>>,
    pass: AtomicU64,
    stale: AtomicBool,
    resolves: AtomicUsize,

    metrics_listeners: Listeners<MetricsAggregate>,
    debouncer: OnceLock<Debouncer>,
    wiring: Mutex<Option<Wiring>>,
}

impl Drop for RoomInner {
    fn drop(&mut self) {
        if let Some(wiring) = lock(&self.wiring).take() {
            wiring.options.unsubscribe();
            wiring.watcher.abort();
        }
    }
}

/// Controller for one lobby. Clones share state.
#[derive(Clone)]
pub struct Matchroom {
    inner: Arc<RoomInner>,
}

impl Matchroom {
    pub fn new(
        api: MatchApi,
        host: Arc<dyn OverlayHost>,
        options: RangeOptionStore,
        render_debounce: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(RoomInner {
                resolver: LobbyResolver::new(api.clone()),
                api,
                host,
                options,
                render_debounce,
                state: Mutex::new(RoomState::default()),
                in_flight: Mutex::new(None),
                pass: AtomicU64::new(0),
                stale: AtomicBool::new(false),
                resolves: AtomicUsize::new(0),
                metrics_listeners: Listeners::new(),
                debouncer: OnceLock::new(),
                wiring: Mutex::new(None),
            }),
        }
    }

    /// Follow range option changes, including writes from other stores
    /// over the same storage. Must run inside a Tokio runtime.
    pub fn start(&self) {
        let weak: Weak<RoomInner> = Arc::downgrade(&self.inner);
        let options = self.inner.options.subscribe(move |change| {
            if let Some(inner) = weak.upgrade() {
                debug!("Option {} changed; metrics are stale", change.field);
                inner.stale.store(true, Ordering::SeqCst);
                Matchroom { inner }.schedule();
            }
        });
        let watcher = self.inner.options.store().watch();

        let previous = lock(&self.inner.wiring).replace(Wiring { options, watcher });
        if let Some(previous) = previous {
            previous.options.unsubscribe();
            previous.watcher.abort();
        }
    }

    /// Entry point for host mutation notifications.
    pub fn on_mutation(&self) {
        self.schedule();
    }

    fn schedule(&self) {
        self.debouncer().trigger();
    }

    fn debouncer(&self) -> &Debouncer {
        self.inner.debouncer.get_or_init(|| {
            let weak = Arc::downgrade(&self.inner);
            Debouncer::spawn(self.inner.render_debounce, move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        Matchroom { inner }.render_once().await;
                    }
                }
            })
        })
    }

    /// Resolve, mount, and refresh metrics if they are missing or stale.
    /// Returns `false` when the lobby is not ready.
    pub async fn render_once(&self) -> bool {
        let Some(snapshot) = self.update().await else {
            return false;
        };

        let have_metrics = lock(&self.inner.state)
            .metrics
            .as_ref()
            .is_some_and(|m| m.match_id == snapshot.id);
        let stale = self.inner.stale.swap(false, Ordering::SeqCst);

        if stale || !have_metrics {
            self.refresh_metrics().await;
        }
        true
    }

    /// Resolve the lobby and keep features mounted on it. Overlapping calls
    /// share one resolution.
    pub async fn update(&self) -> Option<LobbySnapshot> {
        let future = {
            let mut slot = lock(&self.inner.in_flight);
            match slot.as_ref() {
                Some(running) => {
                    debug!("Update already in flight; joining it");
                    running.clone()
                }
                None => {
                    let room = self.clone();
                    let future: SharedUpdate = async move { room.update_once().await }.boxed().shared();
                    *slot = Some(future.clone());
                    future
                }
            }
        };

        let result = future.clone().await;

        let mut slot = lock(&self.inner.in_flight);
        if slot.as_ref().is_some_and(|running| running.ptr_eq(&future)) {
            *slot = None;
        }
        result
    }

    async fn update_once(&self) -> Option<LobbySnapshot> {
        self.inner.resolves.fetch_add(1, Ordering::SeqCst);
        let page = self.inner.host.page();

        let Some(snapshot) = self.inner.resolver.resolve(&page).await else {
            debug!("Lobby not ready");
            return None;
        };

        let mut state = lock(&self.inner.state);
        if state.snapshot.as_ref().map(|s| &s.id) != Some(&snapshot.id) {
            info!("Lobby {} in phase {}", snapshot.id, snapshot.phase);
        }

        // Metrics of a different lobby must not be shown here
        if state.features.metrics().is_some_and(|m| m.match_id != snapshot.id) {
            if let Err(e) = state.features.render(None) {
                warn!("Failed to clear overlays: {}", e);
            }
        }

        let keep = self.mount_features(&mut state.features, &snapshot);
        state.features.retain(&keep);
        state.snapshot = Some(snapshot.clone());
        Some(snapshot)
    }

    fn mount_features(&self, features: &mut FeatureManager, snapshot: &LobbySnapshot) -> HashSet<String> {
        let host = &self.inner.host;

        let map_ids: Vec<&str> = snapshot.maps.iter().map(|m| m.id.as_str()).collect();
        let maps_key = format!("maps:{}:{}", snapshot.phase, map_ids.join(","));
        let player_ids: Vec<&str> = snapshot.players.iter().map(|p| p.id.as_str()).collect();
        let players_key = format!("players:{}", player_ids.join(","));

        let mounted = features.ensure(&maps_key, || {
            Box::new(MapFeature::new(
                maps_key.clone(),
                host.clone(),
                snapshot.maps.clone(),
                snapshot.teams.clone(),
            )) as Box<dyn Feature>
        });
        if let Err(e) = mounted {
            warn!("Failed to mount {}: {}", maps_key, e);
        }

        let mounted = features.ensure(&players_key, || {
            Box::new(PlayerFeature::new(
                players_key.clone(),
                host.clone(),
                snapshot.players.clone(),
            )) as Box<dyn Feature>
        });
        if let Err(e) = mounted {
            warn!("Failed to mount {}: {}", players_key, e);
        }

        HashSet::from([maps_key, players_key])
    }

    /// Run one metrics pass for the current lobby.
    ///
    /// Returns the committed metrics, or `None` when there is no lobby, the
    /// pass failed, or a newer pass started in the meantime. A failed pass
    /// leaves the metrics marked stale.
    pub async fn refresh_metrics(&self) -> Option<MetricsAggregate> {
        let pass = self.inner.pass.fetch_add(1, Ordering::SeqCst) + 1;

        let lobby_id = lock(&self.inner.state).snapshot.as_ref().map(|s| s.id.clone())?;

        let options = match self.inner.options.range_options().await {
            Ok(options) => options,
            Err(e) => {
                warn!("Could not read range options, using defaults: {}", e);
                RangeOptions::default()
            }
        };

        info!("Metrics pass {} for {} started", pass, lobby_id);
        let metrics = pipeline::compute(&self.inner.api, &lobby_id, &options).await;

        if self.inner.pass.load(Ordering::SeqCst) != pass {
            debug!("Metrics pass {} superseded; discarding", pass);
            return None;
        }
        let Some(metrics) = metrics else {
            warn!("Metrics pass {} produced nothing; keeping last result", pass);
            // Retry on the next render
            self.inner.stale.store(true, Ordering::SeqCst);
            return None;
        };

        {
            let mut state = lock(&self.inner.state);
            state.metrics = Some(metrics.clone());
            if let Err(e) = state.features.render(Some(metrics.clone())) {
                warn!("Failed to render metrics: {}", e);
            }
        }

        info!("Metrics pass {} committed", pass);
        self.inner.metrics_listeners.notify(&metrics);
        Some(metrics)
    }

    pub fn subscribe_metrics<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&MetricsAggregate) + Send + Sync + 'static,
    {
        self.inner.metrics_listeners.subscribe(callback)
    }

    pub fn snapshot(&self) -> Option<LobbySnapshot> {
        lock(&self.inner.state).snapshot.clone()
    }

    pub fn metrics(&self) -> Option<MetricsAggregate> {
        lock(&self.inner.state).metrics.clone()
    }

    pub fn options(&self) -> &RangeOptionStore {
        &self.inner.options
    }

    /// Number of resolutions actually run.
    pub fn resolve_count(&self) -> usize {
        self.inner.resolves.load(Ordering::SeqCst)
    }

    /// Remove every overlay of this lobby.
    pub fn unmount(&self) {
        lock(&self.inner.state).features.unmount();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
