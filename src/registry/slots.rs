//! Per-key once-only client slots.

use super::{BackendFamily, SlotStatus};
use crate::{Error, Result};
use dashmap::DashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;

/// One named instance: an async once-cell plus the last construction error.
struct Slot<C> {
    cell: OnceCell<Arc<C>>,
    last_error: Mutex<Option<String>>,
}

impl<C> Default for Slot<C> {
    fn default() -> Self {
        Self {
            cell: OnceCell::new(),
            last_error: Mutex::new(None),
        }
    }
}

impl<C> Slot<C> {
    fn record_error(&self, reason: Option<String>) {
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = reason;
        }
    }

    fn status(&self) -> SlotStatus {
        if self.cell.initialized() {
            return SlotStatus::Ready;
        }
        match self.last_error.lock().ok().and_then(|g| g.clone()) {
            Some(reason) => SlotStatus::Unavailable { reason },
            None => SlotStatus::Uninitialized,
        }
    }
}

/// Named client slots for one backend family.
///
/// The map shards its locks, so unrelated names never wait on each other.
/// The shard guard is released before construction starts; only callers
/// racing on the same name wait on that name's once-cell.
pub(crate) struct Slots<C> {
    family: BackendFamily,
    slots: DashMap<String, Arc<Slot<C>>>,
}

impl<C> Slots<C> {
    pub(crate) fn new(family: BackendFamily) -> Self {
        Self {
            family,
            slots: DashMap::new(),
        }
    }

    /// Returns the client for `name`, constructing it with `init` on first use.
    ///
    /// A failed `init` leaves the cell empty and marks the slot unavailable;
    /// the next call runs `init` again.
    pub(crate) async fn get_or_init<F, Fut>(&self, name: &str, init: F) -> Result<Arc<C>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C>>,
    {
        let slot = Arc::clone(self.slots.entry(name.to_string()).or_default().value());

        if let Some(client) = slot.cell.get() {
            return Ok(Arc::clone(client));
        }

        let family = self.family;
        let result: Result<&Arc<C>> = slot
            .cell
            .get_or_try_init(|| async {
                let client = init().await?;
                tracing::info!(family = %family, name = %name, "Constructed backend client");
                metrics::counter!(
                    "myadmin_client_construction_total",
                    "family" => family.as_str(),
                    "outcome" => "ok"
                )
                .increment(1);
                Ok(Arc::new(client))
            })
            .await;

        match result {
            Ok(client) => {
                slot.record_error(None);
                Ok(Arc::clone(client))
            },
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(
                    family = %family,
                    name = %name,
                    error = %reason,
                    "Failed to construct backend client"
                );
                metrics::counter!(
                    "myadmin_client_construction_total",
                    "family" => family.as_str(),
                    "outcome" => "error"
                )
                .increment(1);
                slot.record_error(Some(reason.clone()));
                Err(Error::ConstructionFailed {
                    family,
                    name: name.to_string(),
                    cause: reason,
                })
            },
        }
    }

    /// Returns the state of `name` without constructing anything.
    pub(crate) fn status(&self, name: &str) -> SlotStatus {
        self.slots
            .get(name)
            .map_or(SlotStatus::Uninitialized, |slot| slot.status())
    }

    /// Returns true if a slot exists for `name`, live or not.
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }
}
