use crate::envelope::{Body, Envelope};
use crate::types::Vec3;

/// Structural acceptance of a decoded envelope.
///
/// The typed decode already guarantees the shape of every field; this
/// predicate enforces the residue the type system leaves open: identities
/// must be non-empty and every number the state machine will do arithmetic
/// with must be finite. Rejected envelopes are dropped silently by callers.
pub fn validate(envelope: &Envelope) -> bool {
    if envelope.from.is_empty() || !envelope.ts.is_finite() {
        return false;
    }

    match &envelope.body {
        Body::Move { position, velocity } => {
            finite_vec(position) && velocity.as_ref().map_or(true, finite_vec)
        }
        Body::Inventory { items } => items.iter().all(|item| !item.id.is_empty()),
        Body::Transfer { to, item } => !to.is_empty() && !item.id.is_empty(),
        Body::StateFull { .. } => true,
        Body::StateDelta { delta } => delta.changes.iter().all(|c| !c.path.is_empty()),
        Body::Payload { .. } => true,
        Body::Ping | Body::Pong => true,
    }
}

fn finite_vec(v: &Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.map_or(true, f64::is_finite)
}
