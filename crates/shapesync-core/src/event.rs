//! Committed row-level change events.

use serde::{Deserialize, Serialize};

use crate::presence::User;
use crate::shape::Shape;

/// A committed change, tagged with its position in the commit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    /// Position in the single global commit order across both tables.
    /// Strictly increasing, gap-free within one subscription.
    pub seq: u64,
    #[serde(flatten)]
    pub event: RowEvent,
}

/// A row-level insert, update or delete on one of the two replicated tables.
///
/// Insert and update events carry the full row after the change; delete
/// events carry the row as it was removed. Users are never deleted, so
/// there is no user-delete event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RowEvent {
    ShapeInserted { row: Shape },
    ShapeUpdated { row: Shape },
    ShapeDeleted { row: Shape },
    UserInserted { row: User },
    UserUpdated { row: User },
}

impl RowEvent {
    /// Name of the table the event belongs to.
    pub fn table(&self) -> &'static str {
        match self {
            RowEvent::ShapeInserted { .. }
            | RowEvent::ShapeUpdated { .. }
            | RowEvent::ShapeDeleted { .. } => "shape",
            RowEvent::UserInserted { .. } | RowEvent::UserUpdated { .. } => "user",
        }
    }
}
