//! Append/merge-only product registry.
//!
//! Accumulates facts about barcodes from every source the coordinator
//! touches: vendor catalog lookups, the nutrition database and the offer
//! feed. Entries are never removed; a barcode once seen stays known.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use icasync_core::{NutritionFacts, ProductLookup, ProductRegistryEntry};

/// The registry: one entry per barcode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProductRegistry {
    entries: BTreeMap<String, ProductRegistryEntry>,
}

impl ProductRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the entry for a barcode.
    pub fn get(&self, ean: &str) -> Option<&ProductRegistryEntry> {
        self.entries.get(ean)
    }

    /// Number of known barcodes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no barcode is known.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all entries in barcode order.
    pub fn entries(&self) -> impl Iterator<Item = &ProductRegistryEntry> {
        self.entries.values()
    }

    /// Records a vendor catalog result. Returns true for a new barcode.
    pub fn record_catalog(&mut self, ean: &str, lookup: ProductLookup) -> bool {
        let (entry, created) = self.entry_mut(ean);
        entry.record_catalog(lookup);
        created
    }

    /// Records a nutrition-database result. Returns true for a new barcode.
    pub fn record_nutrition(&mut self, ean: &str, facts: NutritionFacts) -> bool {
        let (entry, created) = self.entry_mut(ean);
        entry.record_nutrition(facts);
        created
    }

    /// Records an offer reference. Returns true for a new barcode.
    pub fn record_offer(&mut self, ean: &str, offer_id: &str, offer_name: Option<&str>) -> bool {
        let (entry, created) = self.entry_mut(ean);
        entry.record_offer(offer_id, offer_name);
        created
    }

    fn entry_mut(&mut self, ean: &str) -> (&mut ProductRegistryEntry, bool) {
        let created = !self.entries.contains_key(ean);
        let entry = self
            .entries
            .entry(ean.to_string())
            .or_insert_with(|| ProductRegistryEntry::new(ean));
        (entry, created)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_record_creates_entry() {
        let mut registry = ProductRegistry::new();
        assert!(registry.record_offer("7310865004703", "offer-1", Some("Kaffe")));
        assert!(!registry.record_offer("7310865004703", "offer-2", None));
        assert_eq!(registry.len(), 1);

        let entry = registry.get("7310865004703").unwrap();
        assert_eq!(entry.offer_ids.len(), 2);
    }

    #[test]
    fn test_sources_merge_into_one_entry() {
        let mut registry = ProductRegistry::new();
        registry.record_catalog(
            "7310865004703",
            ProductLookup {
                gtin: "7310865004703".into(),
                name: "Bryggkaffe".into(),
                ..Default::default()
            },
        );
        registry.record_nutrition(
            "7310865004703",
            NutritionFacts {
                product_name: Some("Brygg-kaffe".into()),
                ..Default::default()
            },
        );

        let entry = registry.get("7310865004703").unwrap();
        assert!(entry.catalog.is_some());
        assert!(entry.nutrition.is_some());
        assert_eq!(entry.names.len(), 2);
    }

    #[test]
    fn test_registry_roundtrips_as_json() {
        let mut registry = ProductRegistry::new();
        registry.record_offer("111", "o1", None);

        let json = serde_json::to_string(&registry).unwrap();
        let parsed: ProductRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, registry);
    }
}
