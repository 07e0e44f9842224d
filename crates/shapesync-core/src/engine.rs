//! The mutation engine: the only writer to the canvas tables.
//!
//! Every reducer takes the store lock, applies a single atomic
//! read-modify-write, bumps the commit counter and publishes the resulting
//! row event before releasing the lock. Concurrent requests from different
//! connections are totally ordered by the lock, and that order is the
//! commit order: two mutations touching the same field resolve
//! last-write-wins, and every subscriber observes events in the same
//! relative order.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use crate::error::{MutationError, MutationResult};
use crate::event::{Commit, RowEvent};
use crate::identity::{Identity, Timestamp};
use crate::presence::User;
use crate::shape::{Shape, ShapeId, ShapeKind, ShapePatch};
use crate::store::{CanvasStore, Snapshot};

/// Capacity of the per-subscriber event buffer. A subscriber that falls
/// more than this far behind is lagged out and must take a fresh snapshot
/// instead of blocking the writer.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Cheaply clonable handle to the shared canvas state.
///
/// All mutations go through the named reducer methods below; there is no
/// way to write a field directly.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Mutex<CanvasStore>,
    events: broadcast::Sender<Commit>,
}

/// A snapshot plus the live event stream from exactly that point in the
/// commit order — no gap, no duplicate rows.
pub struct Subscription {
    pub snapshot: Snapshot,
    pub events: broadcast::Receiver<Commit>,
}

impl Engine {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(EngineInner {
                store: Mutex::new(CanvasStore::default()),
                events,
            }),
        }
    }

    fn store(&self) -> MutationResult<MutexGuard<'_, CanvasStore>> {
        self.inner
            .store
            .lock()
            .map_err(|_| MutationError::StorePoisoned)
    }

    /// Commit one event: bump the global counter and publish. Called while
    /// holding the store lock so subscribers see events in commit order.
    fn commit(&self, store: &mut CanvasStore, event: RowEvent) {
        store.seq += 1;
        // Send fails only when there are no subscribers at all.
        let _ = self.inner.events.send(Commit {
            seq: store.seq,
            event,
        });
    }

    // --- Subscription ---

    /// Subscribe to the canvas: a full snapshot of both tables and the
    /// event stream from that exact point on.
    ///
    /// The snapshot is taken and the receiver registered under the same
    /// lock acquisition, so the first event a subscriber receives always
    /// has `seq == snapshot.seq + 1`.
    pub fn subscribe(&self) -> MutationResult<Subscription> {
        let store = self.store()?;
        let snapshot = store.snapshot();
        let events = self.inner.events.subscribe();
        Ok(Subscription { snapshot, events })
    }

    // --- Shape reducers ---

    /// Insert a new shape and return its freshly allocated id.
    ///
    /// `rotation` starts at zero; `created_by` and `created_at` are fixed
    /// at creation and never change afterwards.
    pub fn create_shape(
        &self,
        identity: Identity,
        kind: ShapeKind,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        color: String,
    ) -> MutationResult<ShapeId> {
        check_finite("x", x)?;
        check_finite("y", y)?;
        check_finite("width", width)?;
        check_finite("height", height)?;

        let mut store = self.store()?;
        let id = store.next_shape_id();
        let shape = Shape {
            id,
            kind,
            x,
            y,
            width,
            height,
            color,
            rotation: 0.0,
            created_by: identity,
            created_at: Timestamp::now(),
        };
        store.shapes.insert(id, shape.clone());
        self.commit(&mut store, RowEvent::ShapeInserted { row: shape });
        Ok(id)
    }

    /// Overwrite a shape's position; all other fields are untouched.
    ///
    /// A missing id is a silent no-op: the call succeeds and no event is
    /// emitted.
    pub fn move_shape(&self, id: ShapeId, x: f64, y: f64) -> MutationResult<()> {
        check_finite("x", x)?;
        check_finite("y", y)?;

        let mut store = self.store()?;
        let Some(shape) = store.shapes.get_mut(&id) else {
            return Ok(());
        };
        shape.x = x;
        shape.y = y;
        let row = shape.clone();
        self.commit(&mut store, RowEvent::ShapeUpdated { row });
        Ok(())
    }

    /// Apply the supplied fields of a patch; unsupplied fields keep their
    /// prior value.
    ///
    /// A missing id is a silent no-op. Two concurrent patches touching
    /// disjoint fields both apply; patches touching the same field resolve
    /// last-write-wins by commit order.
    pub fn update_shape(&self, id: ShapeId, patch: ShapePatch) -> MutationResult<()> {
        if let Some(width) = patch.width {
            check_finite("width", width)?;
        }
        if let Some(height) = patch.height {
            check_finite("height", height)?;
        }
        if let Some(rotation) = patch.rotation {
            check_finite("rotation", rotation)?;
        }

        let mut store = self.store()?;
        let Some(shape) = store.shapes.get_mut(&id) else {
            return Ok(());
        };
        if let Some(width) = patch.width {
            shape.width = width;
        }
        if let Some(height) = patch.height {
            shape.height = height;
        }
        if let Some(color) = patch.color {
            shape.color = color;
        }
        if let Some(rotation) = patch.rotation {
            shape.rotation = rotation;
        }
        let row = shape.clone();
        self.commit(&mut store, RowEvent::ShapeUpdated { row });
        Ok(())
    }

    /// Remove a shape permanently. No tombstone: a later mutation
    /// referencing the id is itself a no-op.
    ///
    /// A missing id is a silent no-op.
    pub fn delete_shape(&self, id: ShapeId) -> MutationResult<()> {
        let mut store = self.store()?;
        let Some(row) = store.shapes.remove(&id) else {
            return Ok(());
        };
        self.commit(&mut store, RowEvent::ShapeDeleted { row });
        Ok(())
    }

    // --- Session lifecycle / presence reducers ---

    /// Session lifecycle hook: a connection for `identity` opened.
    ///
    /// First contact seeds a fresh user row (online, unnamed, cursor at the
    /// origin). A reconnect flips the existing row back online and keeps
    /// the name and last cursor position. An extra session for an identity
    /// that is already online changes nothing and emits nothing.
    pub fn on_connect(&self, identity: Identity) -> MutationResult<()> {
        let mut store = self.store()?;
        *store.sessions.entry(identity).or_insert(0) += 1;

        if let Some(user) = store.users.get_mut(&identity) {
            if !user.online {
                user.online = true;
                let row = user.clone();
                self.commit(&mut store, RowEvent::UserUpdated { row });
            }
        } else {
            log::debug!("seeding user row for new identity {identity}");
            let row = User::seed(identity);
            store.users.insert(identity, row.clone());
            self.commit(&mut store, RowEvent::UserInserted { row });
        }
        Ok(())
    }

    /// Session lifecycle hook: a connection for `identity` closed.
    ///
    /// Must be invoked exactly once per session termination, including
    /// abnormal ones. Presence derives from the active session count, so
    /// the row only goes offline when the last session ends. Name and
    /// cursor are left untouched. Unknown identities are a no-op.
    pub fn on_disconnect(&self, identity: Identity) -> MutationResult<()> {
        let mut store = self.store()?;
        let remaining = match store.sessions.get_mut(&identity) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => return Ok(()),
        };
        if remaining > 0 {
            return Ok(());
        }
        store.sessions.remove(&identity);

        let Some(user) = store.users.get_mut(&identity) else {
            return Ok(());
        };
        if user.online {
            user.online = false;
            let row = user.clone();
            self.commit(&mut store, RowEvent::UserUpdated { row });
        }
        Ok(())
    }

    /// Overwrite the caller's display name unconditionally.
    ///
    /// Self-targeting only: the identity comes from the connection, never
    /// from a client-supplied parameter. A missing user row is a silent
    /// no-op (should not happen post-connect).
    pub fn set_user_name(&self, identity: Identity, name: String) -> MutationResult<()> {
        let mut store = self.store()?;
        let Some(user) = store.users.get_mut(&identity) else {
            return Ok(());
        };
        user.name = Some(name);
        let row = user.clone();
        self.commit(&mut store, RowEvent::UserUpdated { row });
        Ok(())
    }

    /// Overwrite the caller's last-known pointer position.
    ///
    /// High-frequency; not batched or rate-limited here. Self-targeting
    /// only. A missing user row is a silent no-op.
    pub fn update_cursor(&self, identity: Identity, x: f64, y: f64) -> MutationResult<()> {
        check_finite("cursor_x", x)?;
        check_finite("cursor_y", y)?;

        let mut store = self.store()?;
        let Some(user) = store.users.get_mut(&identity) else {
            return Ok(());
        };
        user.cursor_x = x;
        user.cursor_y = y;
        let row = user.clone();
        self.commit(&mut store, RowEvent::UserUpdated { row });
        Ok(())
    }

    // --- Reads ---

    /// Current value of a shape row, if it exists.
    pub fn shape(&self, id: ShapeId) -> MutationResult<Option<Shape>> {
        Ok(self.store()?.shapes.get(&id).cloned())
    }

    /// Current value of a user row, if it exists.
    pub fn user(&self, identity: Identity) -> MutationResult<Option<User>> {
        Ok(self.store()?.users.get(&identity).cloned())
    }

    pub fn shape_count(&self) -> MutationResult<usize> {
        Ok(self.store()?.shapes.len())
    }

    pub fn user_count(&self) -> MutationResult<usize> {
        Ok(self.store()?.users.len())
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn check_finite(field: &'static str, value: f64) -> MutationResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(MutationError::NonFinite { field, value })
    }
}
