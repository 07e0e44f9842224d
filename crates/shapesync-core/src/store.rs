//! The authoritative tables and their snapshot form.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::presence::User;
use crate::shape::{Shape, ShapeId};

/// The two replicated tables plus engine bookkeeping.
///
/// Exclusively owned by the mutation engine; nothing else writes to it.
/// Subscribers only ever see [`Snapshot`]s and committed events.
#[derive(Debug, Default)]
pub(crate) struct CanvasStore {
    pub users: HashMap<Identity, User>,
    pub shapes: HashMap<ShapeId, Shape>,
    /// Last shape id handed out. Monotonic, so ids are collision-free
    /// against everything ever issued and are never reused.
    pub last_shape_id: ShapeId,
    /// Commit counter; one global order across both tables.
    pub seq: u64,
    /// Active session count per identity. Presence derives from it: a row
    /// is online while its count is nonzero.
    pub sessions: HashMap<Identity, u32>,
}

impl CanvasStore {
    /// Allocate a fresh shape id.
    pub fn next_shape_id(&mut self) -> ShapeId {
        self.last_shape_id += 1;
        self.last_shape_id
    }

    /// Point-in-time copy of both tables, tagged with the commit sequence
    /// it reflects. Rows are sorted by key for deterministic output.
    pub fn snapshot(&self) -> Snapshot {
        let mut users: Vec<User> = self.users.values().cloned().collect();
        users.sort_by_key(|u| u.identity);
        let mut shapes: Vec<Shape> = self.shapes.values().cloned().collect();
        shapes.sort_by_key(|s| s.id);
        Snapshot {
            seq: self.seq,
            users,
            shapes,
        }
    }
}

/// Full contents of both tables at a single point in the commit order.
///
/// Sent once to each new subscriber; the live event stream then continues
/// from exactly `seq + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub seq: u64,
    pub users: Vec<User>,
    pub shapes: Vec<Shape>,
}
