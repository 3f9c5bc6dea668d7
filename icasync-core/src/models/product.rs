//! Cross-referenced product facts.
//!
//! A [`ProductRegistryEntry`] accumulates what is known about one barcode
//! from the vendor catalog, the offer feed and the external nutrition
//! database. Entries grow monotonically; nothing is ever purged.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// ============================================================================
// Vendor Catalog Lookup
// ============================================================================

/// The vendor's catalog record for one barcode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductLookup {
    /// Global trade item number (EAN).
    pub gtin: String,
    /// Product name.
    pub name: String,
    /// Vendor article id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_id: Option<i64>,
    /// Article group (category) id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_group_id: Option<i64>,
    /// Extended article group id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded_article_group_id: Option<i64>,
}

// ============================================================================
// External Nutrition Facts
// ============================================================================

/// Subset of an Open Food Facts product record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct NutritionFacts {
    /// Product name as registered in the database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    /// Brand list, comma separated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brands: Option<String>,
    /// Nutri-Score grade (a-e).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutriscore_grade: Option<String>,
    /// Energy per 100g, kcal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy_kcal_100g: Option<f64>,
    /// Fat per 100g, grams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fat_100g: Option<f64>,
    /// Sugars per 100g, grams.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sugars_100g: Option<f64>,
}

// ============================================================================
// Product Registry Entry
// ============================================================================

/// Accumulated facts about one barcode. Append/merge-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProductRegistryEntry {
    /// The barcode this entry describes.
    pub ean: String,
    /// Vendor catalog record, when the barcode resolved there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<ProductLookup>,
    /// External nutrition record, when the barcode resolved there.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrition: Option<NutritionFacts>,
    /// Ids of offers that referenced this barcode.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub offer_ids: BTreeSet<String>,
    /// Names this barcode has been seen under, across sources.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub names: BTreeSet<String>,
}

impl ProductRegistryEntry {
    /// Creates an empty entry for a barcode.
    pub fn new(ean: impl Into<String>) -> Self {
        Self {
            ean: ean.into(),
            ..Default::default()
        }
    }

    /// Records the vendor catalog result for this barcode.
    pub fn record_catalog(&mut self, lookup: ProductLookup) {
        self.names.insert(lookup.name.clone());
        self.catalog = Some(lookup);
    }

    /// Records the external nutrition result for this barcode.
    pub fn record_nutrition(&mut self, facts: NutritionFacts) {
        if let Some(name) = &facts.product_name {
            self.names.insert(name.clone());
        }
        self.nutrition = Some(facts);
    }

    /// Records that an offer references this barcode.
    pub fn record_offer(&mut self, offer_id: impl Into<String>, offer_name: Option<&str>) {
        self.offer_ids.insert(offer_id.into());
        if let Some(name) = offer_name {
            self.names.insert(name.to_string());
        }
    }

    /// True when no source knows anything about this barcode.
    pub fn is_unknown(&self) -> bool {
        self.catalog.is_none() && self.nutrition.is_none() && self.offer_ids.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_accumulates_sources() {
        let mut entry = ProductRegistryEntry::new("7310865004703");
        assert!(entry.is_unknown());

        entry.record_offer("offer-1", Some("Kaffe 500g"));
        assert!(!entry.is_unknown());

        entry.record_catalog(ProductLookup {
            gtin: "7310865004703".into(),
            name: "Bryggkaffe".into(),
            ..Default::default()
        });
        entry.record_nutrition(NutritionFacts {
            product_name: Some("Brygg-kaffe mellanrost".into()),
            ..Default::default()
        });

        assert_eq!(entry.names.len(), 3);
        assert!(entry.offer_ids.contains("offer-1"));
        assert!(entry.catalog.is_some());
        assert!(entry.nutrition.is_some());
    }
}
