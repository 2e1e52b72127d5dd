use std::collections::HashMap;

use log::debug;
use serde_json::Value;

use meshsync_shared::{
    GlobalGameState, InventoryItem, PlayerId, PlayerState, StateDelta, Vec3,
};

use crate::config::ConflictMode;

/// Applies one envelope's mutation to the replicated state according to the
/// configured policy. Stateless with respect to sequence numbers; dedup
/// lives in the state manager.
pub struct ConflictResolver {
    mode: ConflictMode,
    authority: Option<PlayerId>,
}

impl ConflictResolver {
    pub fn new(mode: ConflictMode, authority: Option<PlayerId>) -> Self {
        Self { mode, authority }
    }

    /// Updates the current authority id. The session facade drives this on
    /// host changes; a pinned authority is never re-pointed there.
    pub fn set_authority(&mut self, authority: Option<PlayerId>) {
        self.authority = authority;
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    fn gate(&self, from: &str) -> bool {
        match self.mode {
            ConflictMode::Timestamp => true,
            ConflictMode::Authoritative => self.authority.as_deref() == Some(from),
        }
    }

    /// Upserts `players[from]`, merging position and velocity field-wise so
    /// an omitted velocity or z component does not clear the stored one.
    pub fn apply_move(
        &self,
        state: &mut GlobalGameState,
        from: &str,
        position: &Vec3,
        velocity: Option<&Vec3>,
    ) -> bool {
        if !self.gate(from) {
            return false;
        }

        let entry = state
            .players
            .entry(from.to_string())
            .or_insert_with(|| PlayerState {
                id: from.to_string(),
                ..PlayerState::default()
            });

        merge_vec(&mut entry.position, position);
        if let Some(velocity) = velocity {
            match entry.velocity.as_mut() {
                Some(existing) => merge_vec(existing, velocity),
                None => entry.velocity = Some(*velocity),
            }
        }
        true
    }

    /// Replaces `inventories[from]` with a deep copy of the given list.
    pub fn apply_inventory(
        &self,
        state: &mut GlobalGameState,
        from: &str,
        items: &[InventoryItem],
    ) -> bool {
        if !self.gate(from) {
            return false;
        }
        state
            .inventories
            .insert(from.to_string(), items.to_vec());
        true
    }

    /// Moves `item.quantity` units from `from` to `to`. Rejected when the
    /// sender lacks the item or holds too few; receiver entries merge by
    /// item id.
    pub fn apply_transfer(
        &self,
        state: &mut GlobalGameState,
        from: &str,
        to: &str,
        item: &InventoryItem,
    ) -> bool {
        if !self.gate(from) {
            return false;
        }

        let Some(source) = state.inventories.get_mut(from) else {
            return false;
        };
        let Some(index) = source.iter().position(|entry| entry.id == item.id) else {
            return false;
        };
        if source[index].quantity < item.quantity {
            return false;
        }

        source[index].quantity -= item.quantity;
        if source[index].quantity == 0 {
            source.remove(index);
        }

        let destination = state.inventories.entry(to.to_string()).or_default();
        match destination.iter_mut().find(|entry| entry.id == item.id) {
            Some(existing) => existing.quantity += item.quantity,
            None => destination.push(item.clone()),
        }
        true
    }

    /// Walks every dotted path, creating missing intermediate maps, and
    /// overwrites each leaf with a deep copy of the carried value. A `null`
    /// leaf at entry depth removes the entry. Not gated by authority.
    pub fn apply_delta(&self, state: &mut GlobalGameState, delta: &StateDelta) {
        for change in &delta.changes {
            apply_change(state, &change.path, &change.value);
        }
        state.tick = state.tick.max(delta.tick);
    }
}

fn merge_vec(target: &mut Vec3, incoming: &Vec3) {
    target.x = incoming.x;
    target.y = incoming.y;
    if incoming.z.is_some() {
        target.z = incoming.z;
    }
}

fn apply_change(state: &mut GlobalGameState, path: &str, value: &Value) {
    let mut segments = path.split('.');
    let Some(root) = segments.next() else {
        return;
    };
    let rest: Vec<&str> = segments.collect();

    match root {
        "tick" if rest.is_empty() => {
            if let Some(tick) = value.as_u64() {
                state.tick = state.tick.max(tick);
            }
        }
        "players" => apply_map_change(&mut state.players, &rest, value, |player, key| {
            if player.id.is_empty() {
                player.id = key.to_string();
            }
        }),
        "inventories" => {
            apply_map_change(&mut state.inventories, &rest, value, |_: &mut Vec<_>, _| {})
        }
        "objects" => apply_map_change(&mut state.objects, &rest, value, |object, key| {
            if object.id.is_empty() {
                object.id = key.to_string();
            }
        }),
        other => debug!("delta path with unknown root `{other}` ignored"),
    }
}

/// Applies one change below a top-level map. Entry-depth paths replace or
/// remove whole entries; deeper paths edit the entry through its JSON image.
fn apply_map_change<T, F>(
    map: &mut HashMap<String, T>,
    segments: &[&str],
    value: &Value,
    fixup: F,
) where
    T: serde::Serialize + serde::de::DeserializeOwned,
    F: Fn(&mut T, &str),
{
    let Some((key, rest)) = segments.split_first() else {
        // path addressed the whole map
        if let Ok(replacement) = serde_json::from_value(value.clone()) {
            *map = replacement;
        } else {
            debug!("delta map overwrite with non-map value dropped");
        }
        return;
    };

    if rest.is_empty() {
        if value.is_null() {
            map.remove(*key);
            return;
        }
        match serde_json::from_value::<T>(value.clone()) {
            Ok(mut entry) => {
                fixup(&mut entry, key);
                map.insert((*key).to_string(), entry);
            }
            Err(err) => debug!("delta entry at `{key}` dropped: {err}"),
        }
        return;
    }

    let mut image = match map.get(*key) {
        Some(entry) => serde_json::to_value(entry).unwrap_or_else(|_| Value::Object(Default::default())),
        None => Value::Object(Default::default()),
    };
    set_at_path(&mut image, rest, value.clone());
    match serde_json::from_value::<T>(image) {
        Ok(mut entry) => {
            fixup(&mut entry, key);
            map.insert((*key).to_string(), entry);
        }
        Err(err) => debug!("delta leaf under `{key}` dropped: {err}"),
    }
}

fn set_at_path(target: &mut Value, segments: &[&str], leaf: Value) {
    let mut cursor = target;
    for segment in &segments[..segments.len() - 1] {
        if !cursor.is_object() {
            *cursor = Value::Object(Default::default());
        }
        cursor = cursor
            .as_object_mut()
            .expect("cursor was just made an object")
            .entry((*segment).to_string())
            .or_insert(Value::Object(Default::default()));
    }
    if !cursor.is_object() {
        *cursor = Value::Object(Default::default());
    }
    cursor
        .as_object_mut()
        .expect("cursor was just made an object")
        .insert(segments[segments.len() - 1].to_string(), leaf);
}
