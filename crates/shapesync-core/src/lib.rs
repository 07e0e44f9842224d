//! ShapeSync Core Library
//!
//! Authoritative shared state for a collaborative 2-D shape canvas: the
//! shape and user-presence tables, the mutation engine that is the only
//! legal writer to them, and the ordered broadcast stream that keeps every
//! client replica consistent with the store in real time.

pub mod engine;
pub mod error;
pub mod event;
pub mod identity;
pub mod presence;
pub mod replica;
pub mod shape;
pub mod store;

pub use engine::{EVENT_CHANNEL_CAPACITY, Engine, Subscription};
pub use error::{MutationError, MutationResult};
pub use event::{Commit, RowEvent};
pub use identity::{Identity, ParseIdentityError, Timestamp};
pub use presence::User;
pub use replica::Replica;
pub use shape::{Shape, ShapeId, ShapeKind, ShapePatch};
pub use store::Snapshot;
