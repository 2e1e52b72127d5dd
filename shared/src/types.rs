use serde::{Deserialize, Serialize};

/// Opaque identity of a mesh participant. Its only semantic use is
/// participation in the total order defined in `peer_order`.
pub type PlayerId = String;

/// Per-sender sequence number carried by outbound envelopes.
pub type Seq = u64;

/// Position or velocity triple. `z` is optional on the wire and treated as 0
/// where the integrator needs a value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Vec3 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    /// The z component with the wire default applied.
    pub fn z_or_zero(&self) -> f64 {
        self.z.unwrap_or(0.0)
    }
}
