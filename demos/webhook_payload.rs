//! Print the webhook payloads acctwatch sends
//!
//! Useful for checking how a chat service will render removal and
//! restoration messages before pointing the daemon at a real webhook.

use acctwatch_core::{EntityState, TransitionEvent};
use acctwatch_notify_webhook::WebhookMessage;
use chrono::Utc;

fn main() -> Result<(), serde_json::Error> {
    let transitions = [
        (EntityState::Unknown, EntityState::Removed),
        (EntityState::Active, EntityState::Removed),
        (EntityState::Removed, EntityState::Active),
    ];

    for (from, to) in transitions {
        let event = TransitionEvent {
            id: "example_account".to_string(),
            from,
            to,
            timestamp: Utc::now(),
        };

        println!("--- {} ---", event.summary());
        println!("{}\n", serde_json::to_string_pretty(&WebhookMessage::from_event(&event))?);
    }

    Ok(())
}
