//! Client side of the board: the optimistic snapshot, event reconciliation,
//! and the session that ties them to a gateway.

pub mod reconcile;
pub mod session;
pub mod snapshot;

pub use reconcile::Reconciliation;
pub use session::{BoardSession, DragEnd, DropTarget, MoveOutcome, ReconcileReason};
pub use snapshot::BoardSnapshot;
