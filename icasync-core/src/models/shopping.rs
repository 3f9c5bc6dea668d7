//! Shopping-list and account domain records.
//!
//! Vendor payloads are camelCase JSON; unknown fields are ignored on
//! deserialization.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ============================================================================
// Shopping Lists
// ============================================================================

/// One row of a shopping list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingListRow {
    /// Server-side row id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Client-generated row id, stable across syncs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_id: Option<String>,
    /// Product name as entered.
    pub product_name: String,
    /// Quantity, when parsed from the summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    /// Unit, when parsed from the summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Checked-off marker.
    #[serde(default)]
    pub is_striked_over: bool,
    /// Manual sort order within the list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_order: Option<i64>,
    /// Article group (category) id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_group_id: Option<i64>,
    /// Extended article group id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_group_id_extended: Option<i64>,
    /// Source marker set by the vendor app.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<i64>,
    /// Last-change timestamp as reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_change: Option<String>,
}

/// A shopping list with its rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingList {
    /// Server-side list id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Client-generated list id, the stable identifier used everywhere.
    pub offline_id: String,
    /// Display title.
    pub title: String,
    /// Free-text comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_text: Option<String>,
    /// Store-sorting flag (0/1 on the wire).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sorting_store: Option<i64>,
    /// List rows.
    #[serde(default)]
    pub rows: Vec<ShoppingListRow>,
    /// Last-change timestamp as reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_change: Option<String>,
    /// Private-list marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
}

// ============================================================================
// Shopping List Sync
// ============================================================================

/// Conflict policy for a shopping-list sync.
///
/// The vendor app shows three policies but only two have defined behavior.
/// `Merge` is representable so stored payloads round-trip, but it is
/// rejected at validation time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConflictResolution {
    /// Append local rows after the server's rows.
    #[default]
    Append,
    /// Keep the server's rows, discarding conflicting local changes.
    Ignore,
    /// Undefined merge behavior. Always rejected.
    Merge,
}

/// A sync payload for one shopping list.
///
/// Exactly one of the row sets is sent per call; the first populated set in
/// deleted/changed/created order wins, matching the vendor protocol.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingListSync {
    /// Target list id.
    pub offline_id: String,
    /// Rows deleted locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_rows: Option<Vec<String>>,
    /// Rows changed locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_rows: Option<Vec<ShoppingListRow>>,
    /// Rows created locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_rows: Option<Vec<ShoppingListRow>>,
    /// Conflict policy for this sync.
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
}

impl ShoppingListSync {
    /// Validates the payload before it is sent.
    ///
    /// Rejects the undefined `Merge` policy and payloads without a target id.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.offline_id.is_empty() {
            return Err(CoreError::InvalidData(
                "sync payload requires an offline id".into(),
            ));
        }
        if self.conflict_resolution == ConflictResolution::Merge {
            return Err(CoreError::UnsupportedConflictResolution(
                "merge has no defined behavior; use append or ignore".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Baseitems & Articles
// ============================================================================

/// A favorite/frequently-bought product, tracked independent of any list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BaseItem {
    /// Client-generated id.
    pub id: String,
    /// Display text.
    pub text: String,
    /// Vendor article id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_id: Option<i64>,
    /// Article group (category) id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_group_id: Option<i64>,
    /// Extended article group id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_group_id_extended: Option<i64>,
    /// Product barcode (EAN), when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_ean: Option<String>,
    /// Manual sort order.
    #[serde(default)]
    pub sort_order: i64,
}

/// A catalog article used for category lookup of free-text items.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    /// Vendor article id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Article name.
    pub name: String,
    /// Parent article group id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
}

// ============================================================================
// Stores & Bonus
// ============================================================================

/// A physical store location.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    /// Store id.
    pub id: i64,
    /// Marketing display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketing_name: Option<String>,
    /// Store profile id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    /// Public web URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
}

/// Current bonus standing for the account.
///
/// The bonus payload varies by campaign; only the stable fields are typed
/// and the rest is carried verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentBonus {
    /// Accumulated bonus value for the current period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_amount: Option<f64>,
    /// Remaining amount until the next bonus level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_to_next_level: Option<f64>,
    /// Campaign-specific fields, preserved as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shopping_list_wire_format() {
        let json = r#"{
            "offlineId": "abc-123",
            "title": "Veckohandling",
            "rows": [
                {"id": 1, "productName": "Mjölk", "isStrikedOver": false, "internalOrder": 0}
            ],
            "latestChange": "2024-06-01T10:00:00Z",
            "unknownVendorField": true
        }"#;
        let list: ShoppingList = serde_json::from_str(json).unwrap();
        assert_eq!(list.offline_id, "abc-123");
        assert_eq!(list.rows.len(), 1);
        assert_eq!(list.rows[0].product_name, "Mjölk");
    }

    #[test]
    fn test_sync_rejects_merge() {
        let sync = ShoppingListSync {
            offline_id: "abc".into(),
            conflict_resolution: ConflictResolution::Merge,
            ..Default::default()
        };
        assert!(matches!(
            sync.validate(),
            Err(CoreError::UnsupportedConflictResolution(_))
        ));
    }

    #[test]
    fn test_sync_requires_offline_id() {
        let sync = ShoppingListSync::default();
        assert!(matches!(sync.validate(), Err(CoreError::InvalidData(_))));
    }

    #[test]
    fn test_sync_append_and_ignore_validate() {
        for policy in [ConflictResolution::Append, ConflictResolution::Ignore] {
            let sync = ShoppingListSync {
                offline_id: "abc".into(),
                conflict_resolution: policy,
                ..Default::default()
            };
            assert!(sync.validate().is_ok());
        }
    }

    #[test]
    fn test_bonus_preserves_campaign_fields() {
        let json = r#"{"currentAmount": 120.5, "campaignName": "sommar"}"#;
        let bonus: CurrentBonus = serde_json::from_str(json).unwrap();
        assert_eq!(bonus.current_amount, Some(120.5));
        assert_eq!(
            bonus.extra.get("campaignName").and_then(|v| v.as_str()),
            Some("sommar")
        );
    }
}
