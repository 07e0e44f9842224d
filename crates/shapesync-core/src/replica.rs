//! Client-side replica of the canvas tables.
//!
//! A replica is seeded from a subscription snapshot and kept consistent by
//! applying committed events in order. Events may reference rows deleted in
//! the meantime; apply-then-discard means they simply no-op, so a move
//! immediately followed by a delete for the same shape converges.

use std::collections::HashMap;

use crate::event::{Commit, RowEvent};
use crate::identity::Identity;
use crate::presence::User;
use crate::shape::{Shape, ShapeId};
use crate::store::Snapshot;

/// Read-only mirror of the authoritative store, owned by one subscriber.
#[derive(Debug, Clone, Default)]
pub struct Replica {
    users: HashMap<Identity, User>,
    shapes: HashMap<ShapeId, Shape>,
    last_seq: u64,
}

impl Replica {
    /// Seed a replica from a subscription snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            users: snapshot
                .users
                .into_iter()
                .map(|u| (u.identity, u))
                .collect(),
            shapes: snapshot.shapes.into_iter().map(|s| (s.id, s)).collect(),
            last_seq: snapshot.seq,
        }
    }

    /// Apply one committed event. Events must be fed in commit order.
    pub fn apply(&mut self, commit: Commit) {
        self.last_seq = commit.seq;
        match commit.event {
            RowEvent::ShapeInserted { row } | RowEvent::ShapeUpdated { row } => {
                self.shapes.insert(row.id, row);
            }
            RowEvent::ShapeDeleted { row } => {
                self.shapes.remove(&row.id);
            }
            RowEvent::UserInserted { row } | RowEvent::UserUpdated { row } => {
                self.users.insert(row.identity, row);
            }
        }
    }

    /// Sequence number of the last applied commit (or of the snapshot).
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn shape(&self, id: ShapeId) -> Option<&Shape> {
        self.shapes.get(&id)
    }

    pub fn user(&self, identity: &Identity) -> Option<&User> {
        self.users.get(identity)
    }

    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.values()
    }

    pub fn users(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Timestamp;
    use crate::shape::ShapeKind;

    fn shape(id: ShapeId) -> Shape {
        Shape {
            id,
            kind: ShapeKind::Rectangle,
            x: 0.0,
            y: 0.0,
            width: 10.0,
            height: 10.0,
            color: "#000000".to_string(),
            rotation: 0.0,
            created_by: Identity::from_bytes([9; 16]),
            created_at: Timestamp(1),
        }
    }

    #[test]
    fn test_seeded_from_snapshot() {
        let identity = Identity::from_bytes([2; 16]);
        let snapshot = Snapshot {
            seq: 5,
            users: vec![User::seed(identity)],
            shapes: vec![shape(1), shape(2)],
        };
        let replica = Replica::from_snapshot(snapshot);
        assert_eq!(replica.last_seq(), 5);
        assert_eq!(replica.shape_count(), 2);
        assert_eq!(replica.user_count(), 1);
        assert!(replica.user(&identity).is_some());
    }

    #[test]
    fn test_move_then_delete_applied_in_order() {
        let mut replica = Replica::from_snapshot(Snapshot {
            seq: 0,
            users: vec![],
            shapes: vec![shape(1)],
        });

        let mut moved = shape(1);
        moved.x = 50.0;
        replica.apply(Commit {
            seq: 1,
            event: RowEvent::ShapeUpdated { row: moved.clone() },
        });
        assert_eq!(replica.shape(1).unwrap().x, 50.0);

        replica.apply(Commit {
            seq: 2,
            event: RowEvent::ShapeDeleted { row: moved },
        });
        assert_eq!(replica.shape(1), None);
        assert_eq!(replica.last_seq(), 2);
    }

    #[test]
    fn test_user_update_overwrites_row() {
        let identity = Identity::from_bytes([3; 16]);
        let mut replica = Replica::default();
        replica.apply(Commit {
            seq: 1,
            event: RowEvent::UserInserted {
                row: User::seed(identity),
            },
        });

        let mut named = User::seed(identity);
        named.name = Some("grace".to_string());
        replica.apply(Commit {
            seq: 2,
            event: RowEvent::UserUpdated { row: named },
        });

        assert_eq!(replica.user(&identity).unwrap().name.as_deref(), Some("grace"));
        assert_eq!(replica.user_count(), 1);
    }
}
