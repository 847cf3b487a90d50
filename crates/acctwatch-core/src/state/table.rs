// # Entity Table
//
// The in-memory shape shared by every registry implementation. Callers
// hold their own lock around it; every method here is a single atomic
// step from the caller's point of view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::traits::{EntityFilter, EntityState, NotificationTarget, WatchedEntity};

/// Keyed entity storage with insertion-order allocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct EntityTable {
    /// Next insertion sequence number
    #[serde(default)]
    next_seq: u64,
    /// Entities keyed by normalized id
    #[serde(default)]
    entities: HashMap<String, WatchedEntity>,
}

impl EntityTable {
    pub(crate) fn upsert(&mut self, id: &str, target: &NotificationTarget) -> WatchedEntity {
        if let Some(entity) = self.entities.get_mut(id) {
            entity.active = true;
            entity.notification_target = target.clone();
            return entity.clone();
        }

        let entity = WatchedEntity::new(id, target.clone(), self.next_seq);
        self.next_seq += 1;
        self.entities.insert(id.to_string(), entity.clone());
        entity
    }

    /// Returns `None` when the entity does not exist, `Some(changed)` otherwise
    pub(crate) fn deactivate(&mut self, id: &str) -> Option<bool> {
        let entity = self.entities.get_mut(id)?;
        let changed = entity.active;
        entity.active = false;
        Some(changed)
    }

    pub(crate) fn record(&mut self, id: &str, state: EntityState, at: DateTime<Utc>) -> bool {
        match self.entities.get_mut(id) {
            Some(entity) => {
                entity.last_known_state = state;
                entity.last_checked_at = Some(at);
                true
            }
            None => false,
        }
    }

    /// Like `record`, but only while the entity has never been observed
    pub(crate) fn record_if_unknown(
        &mut self,
        id: &str,
        state: EntityState,
        at: DateTime<Utc>,
    ) -> bool {
        match self.entities.get(id) {
            Some(entity) if entity.last_known_state == EntityState::Unknown => {
                self.record(id, state, at)
            }
            _ => false,
        }
    }

    /// Point every entity delivering to `from` at `to`
    pub(crate) fn retarget(&mut self, from: &NotificationTarget, to: &NotificationTarget) -> usize {
        if from == to {
            return 0;
        }
        let mut moved = 0;
        for entity in self.entities.values_mut() {
            if &entity.notification_target == from {
                entity.notification_target = to.clone();
                moved += 1;
            }
        }
        moved
    }

    pub(crate) fn remove(&mut self, id: &str) -> bool {
        self.entities.remove(id).is_some()
    }

    pub(crate) fn get(&self, id: &str) -> Option<&WatchedEntity> {
        self.entities.get(id)
    }

    pub(crate) fn list_by(&self, filter: EntityFilter<'_>) -> Vec<WatchedEntity> {
        let mut matching: Vec<WatchedEntity> = self
            .entities
            .values()
            .filter(|entity| filter(entity))
            .cloned()
            .collect();
        matching.sort_by_key(|entity| entity.seq);
        matching
    }

    pub(crate) fn len(&self) -> usize {
        self.entities.len()
    }

    /// Repair tables written before sequence numbers were tracked
    pub(crate) fn normalize(&mut self) {
        let max_seq = self.entities.values().map(|e| e.seq + 1).max().unwrap_or(0);
        if self.next_seq < max_seq {
            self.next_seq = max_seq;
        }
    }
}
