// crates/stream/src/presence.rs
//! Set of viewers currently watching one job execution.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;

use crate::types::{Viewer, ViewerId};

type Members = BTreeMap<ViewerId, Viewer>;

/// Concurrency-safe viewer set with change notification.
///
/// Membership lives inside a `watch` channel: every mutation goes through
/// `send_if_modified`, so updating the set and notifying subscribers happen
/// under the same lock, and subscribers only ever observe newer versions.
pub struct PresenceSet {
    tx: watch::Sender<Members>,
}

impl PresenceSet {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Members::new());
        Self { tx }
    }

    /// Add a viewer. Returns `false` (and notifies nobody) if already present.
    pub fn join(&self, viewer: Viewer) -> bool {
        let id = viewer.id;
        let added = self.tx.send_if_modified(|members| {
            if members.contains_key(&id) {
                return false;
            }
            members.insert(id, viewer);
            true
        });
        if added {
            tracing::debug!(viewer_id = id, "viewer joined");
        }
        added
    }

    /// Remove a viewer. Returns `false` if it was not present.
    pub fn leave(&self, id: ViewerId) -> bool {
        let removed = self
            .tx
            .send_if_modified(|members| members.remove(&id).is_some());
        if removed {
            tracing::debug!(viewer_id = id, "viewer left");
        }
        removed
    }

    /// Current members, ordered by id.
    pub fn snapshot(&self) -> Vec<Viewer> {
        self.tx.borrow().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ViewerId) -> bool {
        self.tx.borrow().contains_key(&id)
    }

    /// Watch for membership changes made after this call.
    pub fn subscribe(&self) -> PresenceWatcher {
        PresenceWatcher {
            rx: self.tx.subscribe(),
        }
    }

    /// Join and get a guard that leaves when dropped.
    pub fn enter(self: &Arc<Self>, viewer: Viewer) -> PresenceGuard {
        let id = viewer.id;
        self.join(viewer);
        PresenceGuard {
            presence: Arc::clone(self),
            id,
            released: false,
        }
    }
}

impl Default for PresenceSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Receives the latest membership whenever it changes.
pub struct PresenceWatcher {
    rx: watch::Receiver<Members>,
}

impl PresenceWatcher {
    /// Wait for the next change and return the membership at that point.
    /// Intermediate versions may be skipped; an older version is never returned
    /// after a newer one.
    ///
    /// Cancel-safe. Returns `None` if the presence set was dropped.
    pub async fn changed(&mut self) -> Option<Vec<Viewer>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().values().cloned().collect())
    }
}

/// Presence held by one session. Leaves exactly once, on `release` or drop.
pub struct PresenceGuard {
    presence: Arc<PresenceSet>,
    id: ViewerId,
    released: bool,
}

impl PresenceGuard {
    pub fn viewer_id(&self) -> ViewerId {
        self.id
    }

    pub fn release(mut self) {
        self.leave();
    }

    fn leave(&mut self) {
        if !self.released {
            self.released = true;
            self.presence.leave(self.id);
        }
    }
}

impl Drop for PresenceGuard {
    fn drop(&mut self) {
        self.leave();
    }
}
