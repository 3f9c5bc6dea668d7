//! Promotional offer records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Grace period an expired offer is retained before reconciliation drops it.
pub const OFFER_GRACE_DAYS: i64 = 30;

// ============================================================================
// Offers
// ============================================================================

/// A promotional offer tied to stores and product barcodes.
///
/// The vendor's offer schema drifts between campaigns, so only the fields
/// the core reasons about are typed. Everything else rides along in `extra`
/// and survives merges, which keeps fields an older snapshot knew about even
/// when a newer detail record omits them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    /// Offer id.
    pub id: String,
    /// Offer display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Offer category/type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Validity window start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    /// Validity window end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    /// Stores the offer applies to.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub store_ids: Vec<i64>,
    /// Barcodes (EANs) of the covered articles.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub eans: Vec<String>,
    /// Whether the offer has been redeemed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_used: Option<bool>,
    /// Campaign-specific fields, preserved as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Offer {
    /// Returns true once the validity window plus the grace period has
    /// passed.
    pub fn is_past_grace(&self, now: DateTime<Utc>) -> bool {
        self.valid_to
            .is_some_and(|valid_to| valid_to + Duration::days(OFFER_GRACE_DAYS) < now)
    }

    /// Merges a newly fetched detail record into this offer.
    ///
    /// Fields present in `newer` overwrite on collision; fields only the old
    /// record carries are preserved.
    pub fn merge_from(&mut self, newer: Offer) {
        if newer.name.is_some() {
            self.name = newer.name;
        }
        if newer.category.is_some() {
            self.category = newer.category;
        }
        if newer.valid_from.is_some() {
            self.valid_from = newer.valid_from;
        }
        if newer.valid_to.is_some() {
            self.valid_to = newer.valid_to;
        }
        if !newer.store_ids.is_empty() {
            self.store_ids = newer.store_ids;
        }
        if !newer.eans.is_empty() {
            self.eans = newer.eans;
        }
        if newer.is_used.is_some() {
            self.is_used = newer.is_used;
        }
        for (key, value) in newer.extra {
            self.extra.insert(key, value);
        }
    }
}

/// The offers available at one store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreOffers {
    /// Store id.
    pub store_id: i64,
    /// Offers currently listed for the store.
    #[serde(default)]
    pub offers: Vec<Offer>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_past_grace_boundaries() {
        let now = Utc::now();
        let offer = |days_past: i64| Offer {
            id: "o1".into(),
            valid_to: Some(now - Duration::days(days_past)),
            ..Default::default()
        };
        assert!(offer(31).is_past_grace(now));
        assert!(!offer(29).is_past_grace(now));
        assert!(!offer(30).is_past_grace(now));
    }

    #[test]
    fn test_no_valid_to_never_past_grace() {
        let offer = Offer {
            id: "o1".into(),
            ..Default::default()
        };
        assert!(!offer.is_past_grace(Utc::now()));
    }

    #[test]
    fn test_merge_overwrites_and_preserves() {
        let mut old = Offer {
            id: "o1".into(),
            name: Some("Gammal".into()),
            category: Some("mejeri".into()),
            eans: vec!["7310865004703".into()],
            ..Default::default()
        };
        old.extra
            .insert("disclaimer".into(), serde_json::json!("max 2 per hushåll"));

        let newer = Offer {
            id: "o1".into(),
            name: Some("Ny".into()),
            ..Default::default()
        };

        old.merge_from(newer);
        assert_eq!(old.name.as_deref(), Some("Ny"));
        // Old-only fields survive the merge.
        assert_eq!(old.category.as_deref(), Some("mejeri"));
        assert_eq!(old.eans, vec!["7310865004703".to_string()]);
        assert!(old.extra.contains_key("disclaimer"));
    }
}
