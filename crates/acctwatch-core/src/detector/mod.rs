//! Change detection
//!
//! Pure decision logic: given the state stored before a probe and the
//! probe's outcome, decide whether a transition happened. No I/O, no clock
//! other than what the caller passes in.

use chrono::{DateTime, Utc};

use crate::traits::{EntityState, ProbeOutcome, TransitionEvent};

/// A detected change of state for one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Entity id
    pub id: String,
    /// State before the probe
    pub from: EntityState,
    /// State established by the probe
    pub to: EntityState,
}

impl Transition {
    /// Whether this is the first successful observation of the entity
    pub fn is_first_observation(&self) -> bool {
        self.from == EntityState::Unknown
    }

    /// Whether subscribers should hear about this transition
    ///
    /// A first observation of `ACTIVE` is never announced (it would read as a
    /// false "restored" alert). A first observation of `REMOVED` is announced
    /// only when `notify_on_first_observation` is set.
    pub fn is_alert_worthy(&self, notify_on_first_observation: bool) -> bool {
        match (self.from, self.to) {
            (EntityState::Unknown, EntityState::Active) => false,
            (EntityState::Unknown, _) => notify_on_first_observation,
            _ => true,
        }
    }

    /// Turn into the event delivered to subscribers
    pub fn into_event(self, timestamp: DateTime<Utc>) -> TransitionEvent {
        TransitionEvent {
            id: self.id,
            from: self.from,
            to: self.to,
            timestamp,
        }
    }
}

/// Decide whether `outcome` changes an entity whose stored state is `old`
///
/// - `TransientError` never produces a transition
/// - An outcome mapping to `old` never produces a transition
/// - Anything else is `old -> mapped(outcome)`
pub fn decide(id: &str, old: EntityState, outcome: ProbeOutcome) -> Option<Transition> {
    let new = outcome.observed_state()?;
    if new == old {
        return None;
    }

    Some(Transition {
        id: id.to_string(),
        from: old,
        to: new,
    })
}
