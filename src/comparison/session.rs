use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::persistence::{storage_key, PersistenceAdapter};
use super::selection::Selection;
use crate::error::ErrorInfo;
use crate::identifiers::ProductId;
use crate::products::metrics::{canonical_path_for, ComparedProduct, ComparisonPath};
use crate::products::resolver::{ProductResolver, Resolution, Ticket};
use crate::products::source::ProductSource;
use crate::storage::StorageClient;

/// Collaborators a session is built from.
#[derive(Clone)]
pub struct SessionDeps {
    pub products: Arc<dyn ProductSource>,
    pub storage: Arc<dyn StorageClient>,
}

/// Record-bearing read model of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComparisonState {
    pub records: Vec<ComparedProduct>,
    pub is_loading: bool,
    pub error: Option<ErrorInfo>,
    pub canonical_path: ComparisonPath,
}

/// One user's comparison: the selection, its persisted copy and the
/// resolved records, exposed as two separately observable read models.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct ComparisonSession {
    inner: Arc<Inner>,
}

struct Inner {
    id: Uuid,
    resolver: ProductResolver,
    persistence: PersistenceAdapter,
    selection: watch::Sender<Selection>,
    state: watch::Sender<ComparisonState>,
    last_requested: Mutex<Option<Vec<ProductId>>>,
    in_flight: Mutex<Option<JoinHandle<()>>>,
    disposed: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl ComparisonSession {
    /// Seeds from `initial` when it is non-empty, otherwise hydrates from
    /// storage. Persistence is enabled afterwards and the first resolution
    /// is started.
    #[instrument(skip(deps, initial), fields(initial = initial.len()))]
    pub async fn init(deps: &SessionDeps, id: Uuid, initial: &[ProductId]) -> Self {
        let persistence = PersistenceAdapter::new(deps.storage.clone(), storage_key(id));
        let selection = if initial.is_empty() {
            persistence.hydrate().await
        } else {
            Selection::seeded(initial.iter().copied())
        };
        persistence.mark_hydrated();
        persistence.sync(&selection);

        let inner = Arc::new(Inner {
            id,
            resolver: ProductResolver::new(deps.products.clone()),
            persistence,
            selection: watch::channel(selection.clone()).0,
            state: watch::channel(ComparisonState::default()).0,
            last_requested: Mutex::new(None),
            in_flight: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });
        inner.reconcile(&selection);
        info!(session = %id, selected = selection.len(), "comparison session started");
        Self { inner }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Adds one id or a comma separated list; invalid, duplicate and
    /// over-capacity ids are dropped silently.
    pub fn add_product(&self, raw: &str) -> Selection {
        self.inner.mutate("add", |sel| sel.add_many(raw))
    }

    pub fn remove_product(&self, raw: &str) -> Selection {
        match ProductId::parse(raw.trim()) {
            Some(id) => self.inner.mutate("remove", |sel| sel.remove(&id)),
            None => self.selection(),
        }
    }

    pub fn clear_products(&self) -> Selection {
        self.inner.mutate("clear", Selection::clear)
    }

    pub fn is_in_comparison(&self, raw: &str) -> bool {
        self.inner.selection.borrow().contains(raw)
    }

    pub fn selection(&self) -> Selection {
        self.inner.selection.borrow().clone()
    }

    pub fn comparison_state(&self) -> ComparisonState {
        self.inner.state.borrow().clone()
    }

    /// Change feed of the selection only; not woken by record fetches.
    pub fn subscribe_selection(&self) -> watch::Receiver<Selection> {
        self.inner.selection.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ComparisonState> {
        self.inner.state.subscribe()
    }

    /// Waits until no resolution is pending and returns that state. Waits
    /// forever if the data service never answers.
    pub async fn settled(&self) -> ComparisonState {
        let mut rx = self.inner.state.subscribe();
        let settled = match rx.wait_for(|s| !s.is_loading).await {
            Ok(state) => state.clone(),
            Err(_) => self.comparison_state(),
        };
        settled
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Stops in-flight resolution, flushes pending writes. Later mutations
    /// are ignored.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(task) = lock(&self.inner.in_flight).take() {
            task.abort();
        }
        self.inner.state.send_modify(|s| s.is_loading = false);
        self.inner.persistence.close().await;
        info!(session = %self.inner.id, "comparison session disposed");
    }
}

impl Inner {
    /// Applies `f` to the current selection. Persistence and reconciliation
    /// run under the same lock as the update, so they see changes in order.
    fn mutate(self: &Arc<Self>, op: &str, f: impl FnOnce(&Selection) -> Selection) -> Selection {
        if self.disposed.load(Ordering::SeqCst) {
            warn!(session = %self.id, op, "mutation on disposed session ignored");
            return self.selection.borrow().clone();
        }
        self.selection.send_if_modified(|current| {
            let next = f(current);
            if next == *current {
                return false;
            }
            debug!(session = %self.id, op, selected = next.len(), "selection changed");
            self.persistence.sync(&next);
            self.reconcile(&next);
            *current = next;
            true
        });
        self.selection.borrow().clone()
    }

    /// Starts a resolution for `selection` unless its list equals the one
    /// last requested. Empty selections settle immediately.
    fn reconcile(self: &Arc<Self>, selection: &Selection) {
        let ids = selection.ids().to_vec();
        {
            let mut last = lock(&self.last_requested);
            if last.as_deref() == Some(ids.as_slice()) {
                return;
            }
            *last = Some(ids.clone());
        }

        let mut ticket = None;
        self.state.send_modify(|state| {
            ticket = Some(self.resolver.begin());
            if ids.is_empty() {
                *state = ComparisonState::default();
            } else {
                state.is_loading = true;
            }
        });
        if ids.is_empty() {
            if let Some(task) = lock(&self.in_flight).take() {
                task.abort();
            }
            return;
        }
        let Some(ticket) = ticket else {
            return;
        };

        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            let resolution = inner.resolver.resolve(&ids).await;
            inner.publish(ticket, &ids, resolution);
        });
        if let Some(previous) = lock(&self.in_flight).replace(task) {
            previous.abort();
        }
    }

    /// Applies `resolution` if `ticket` is still the newest one.
    fn publish(&self, ticket: Ticket, ids: &[ProductId], resolution: Resolution) {
        self.state.send_if_modified(|state| {
            if !self.resolver.is_current(ticket) {
                debug!(session = %self.id, "stale resolution discarded");
                return false;
            }
            let Resolution { records, error } = resolution;
            let records: Vec<ComparedProduct> = if records.is_empty() && error.is_some() {
                last_good(&state.records, ids)
            } else {
                records.into_iter().map(ComparedProduct::from).collect()
            };
            if let Some(e) = &error {
                warn!(session = %self.id, error = %e.message, "comparison resolution failed");
            }
            state.canonical_path = canonical_path_for(records.iter().map(|c| &c.record));
            state.records = records;
            state.is_loading = false;
            state.error = error;
            true
        });
    }
}

/// Previously shown records still selected, in selection order.
fn last_good(previous: &[ComparedProduct], ids: &[ProductId]) -> Vec<ComparedProduct> {
    ids.iter()
        .filter_map(|id| previous.iter().find(|c| c.record.id == id.as_uuid()))
        .cloned()
        .collect()
}
