//! Domain events emitted by the coordinator.
//!
//! Events are plain serializable values handed to an event sink; the sink is
//! an external collaborator (a host event bus in production, an in-memory
//! vector in tests). Each event carries its type tag, the account id, a
//! timestamp and a payload.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::diff::Diff;

/// Event type tag: tracked shopping list changed.
pub const EVENT_SHOPPING_LIST_UPDATED: &str = "shopping_list_updated";
/// Event type tag: reconciled offer snapshot changed.
pub const EVENT_OFFERS_CHANGED: &str = "offers_changed";
/// Event type tag: offers not present in the prior snapshot.
pub const EVENT_NEW_OFFERS: &str = "new_offers";
/// Event type tag: current bonus fetched live.
pub const EVENT_CURRENT_BONUS_LOADED: &str = "current_bonus_loaded";
/// Event type tag: product registry gained or changed entries.
pub const EVENT_PRODUCTS_CHANGED: &str = "products_changed";

/// One domain event.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IcaEvent {
    /// Event type tag.
    pub event_type: String,
    /// Account identifier the event belongs to.
    pub uid: String,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub payload: Value,
}

impl IcaEvent {
    fn new(event_type: &str, uid: &str, payload: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            uid: uid.to_string(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// A tracked shopping list changed; carries the row diffs.
    pub fn shopping_list_updated(
        uid: &str,
        list_id: &str,
        list_title: &str,
        diffs: &[Diff],
    ) -> Self {
        Self::new(
            EVENT_SHOPPING_LIST_UPDATED,
            uid,
            serde_json::json!({
                "shopping_list_id": list_id,
                "shopping_list_name": list_title,
                "diffs": diffs,
            }),
        )
    }

    /// The reconciled offer snapshot changed; carries the offer diffs.
    pub fn offers_changed(uid: &str, diffs: &[Diff]) -> Self {
        Self::new(
            EVENT_OFFERS_CHANGED,
            uid,
            serde_json::json!({ "diffs": diffs }),
        )
    }

    /// Offers that did not exist in the prior snapshot.
    pub fn new_offers(uid: &str, offers: Value) -> Self {
        Self::new(EVENT_NEW_OFFERS, uid, serde_json::json!({ "offers": offers }))
    }

    /// A live bonus fetch completed; carries the bonus payload.
    pub fn current_bonus_loaded(uid: &str, bonus: Value) -> Self {
        Self::new(EVENT_CURRENT_BONUS_LOADED, uid, bonus)
    }

    /// The product registry gained or changed entries.
    pub fn products_changed(uid: &str, eans: &[String]) -> Self {
        Self::new(
            EVENT_PRODUCTS_CHANGED,
            uid,
            serde_json::json!({ "eans": eans }),
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_shape() {
        let event = IcaEvent::shopping_list_updated("acc-1", "list-1", "Veckohandling", &[]);
        assert_eq!(event.event_type, EVENT_SHOPPING_LIST_UPDATED);
        assert_eq!(event.uid, "acc-1");
        assert_eq!(
            event.payload["shopping_list_name"].as_str(),
            Some("Veckohandling")
        );

        let json = serde_json::to_value(&event).unwrap();
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_products_changed_carries_eans() {
        let event = IcaEvent::products_changed("acc-1", &["7310865004703".to_string()]);
        assert_eq!(event.payload["eans"][0].as_str(), Some("7310865004703"));
    }
}
