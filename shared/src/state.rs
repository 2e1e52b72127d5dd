use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{PlayerId, Vec3};

/// Live kinematic state of one player inside the replicated world.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerState {
    #[serde(default)]
    pub id: PlayerId,
    #[serde(default)]
    pub position: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<Vec3>,
}

/// One stack of items in a player inventory. A quantity of zero is never
/// stored; such entries are pruned on mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub quantity: u32,
}

/// A free-form world object, addressed by id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameObject {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// The replicated game world. Exactly one instance exists per session and it
/// is owned by the state manager; everything handed outward is a deep copy
/// (`Clone` here clones every owned collection).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalGameState {
    #[serde(default)]
    pub players: HashMap<PlayerId, PlayerState>,
    #[serde(default)]
    pub inventories: HashMap<PlayerId, Vec<InventoryItem>>,
    #[serde(default)]
    pub objects: HashMap<String, GameObject>,
    #[serde(default)]
    pub tick: u64,
}

/// A single path overwrite inside a [`StateDelta`]. The path is a
/// dot-separated identifier sequence navigating [`GlobalGameState`]; a `null`
/// value removes the addressed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaChange {
    pub path: String,
    pub value: serde_json::Value,
}

/// A path-addressed partial state update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub tick: u64,
    pub changes: Vec<DeltaChange>,
}
