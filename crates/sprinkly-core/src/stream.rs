// ── Entity subscriptions ──
//
// Observers of a `MemoryHost` either read whole snapshots or follow an
// attribute-level change feed computed by diffing consecutive snapshots.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_core::Stream;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::model::{Attr, EntityId};
use crate::store::Entity;

/// Every entity in the host, ordered by kind then index.
pub type Snapshot = Arc<Vec<Arc<Entity>>>;

/// One attribute that differs between two snapshots.
///
/// `old` is `None` for attributes seen for the first time, `new` is `None`
/// for attributes that disappeared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeChange {
    pub id: EntityId,
    pub attr: Attr,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// Attribute-level difference between two snapshots, in `after` order.
pub fn diff(before: &[Arc<Entity>], after: &[Arc<Entity>]) -> Vec<AttributeChange> {
    let previous: HashMap<&EntityId, &Arc<Entity>> = before.iter().map(|e| (&e.id, e)).collect();
    let mut changes = Vec::new();

    for entity in after {
        let old = previous.get(&entity.id);
        if old.is_some_and(|o| Arc::ptr_eq(o, entity)) {
            continue;
        }
        for (attr, value) in &entity.attributes {
            let prior = old.and_then(|o| o.attributes.get(attr));
            if prior != Some(value) {
                changes.push(AttributeChange {
                    id: entity.id.clone(),
                    attr: *attr,
                    old: prior.cloned(),
                    new: Some(value.clone()),
                });
            }
        }
        let Some(old) = old else { continue };
        for (attr, value) in &old.attributes {
            if !entity.attributes.contains_key(attr) {
                changes.push(AttributeChange {
                    id: entity.id.clone(),
                    attr: *attr,
                    old: Some(value.clone()),
                    new: None,
                });
            }
        }
    }
    changes
}

// ── EntityStream ─────────────────────────────────────────────────────

/// A subscription to the host's entities.
pub struct EntityStream {
    current: Snapshot,
    receiver: watch::Receiver<Snapshot>,
}

impl EntityStream {
    pub(crate) fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// Snapshot seen at subscription or at the last `changed()`.
    pub fn current(&self) -> &Snapshot {
        &self.current
    }

    /// Most recent snapshot, whether or not it has been observed.
    pub fn latest(&self) -> Snapshot {
        self.receiver.borrow().clone()
    }

    /// Wait for the next published snapshot. `None` once the host is gone.
    pub async fn changed(&mut self) -> Option<Snapshot> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&snap);
        Some(snap)
    }

    /// Follow attribute changes from the latest snapshot onwards.
    ///
    /// Each item is the non-empty diff of one published change; publishes
    /// that only touch availability or liveness are skipped.
    pub fn into_changes(mut self) -> ChangeStream {
        let last = self.receiver.borrow_and_update().clone();
        ChangeStream {
            last,
            snapshots: WatchStream::from_changes(self.receiver),
        }
    }
}

/// `Stream` of attribute change batches. See [`EntityStream::into_changes`].
pub struct ChangeStream {
    last: Snapshot,
    snapshots: WatchStream<Snapshot>,
}

impl Stream for ChangeStream {
    type Item = Vec<AttributeChange>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let Some(next) = ready!(Pin::new(&mut this.snapshots).poll_next(cx)) else {
                return Poll::Ready(None);
            };
            let changes = diff(&this.last, &next);
            this.last = next;
            if !changes.is_empty() {
                return Poll::Ready(Some(changes));
            }
        }
    }
}
