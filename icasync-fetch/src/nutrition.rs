//! Public nutrition-database barcode lookup.
//!
//! Barcodes the vendor catalog cannot resolve fall through to Open Food
//! Facts. A 404 or a `status: 0` body is a non-error "not found" result.

use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use icasync_core::NutritionFacts;

use crate::client::HttpClient;
use crate::error::FetchError;

/// Open Food Facts base URL.
pub const DEFAULT_NUTRITION_BASE: &str = "https://world.openfoodfacts.org";

const PRODUCT_PATH: &str = "api/v2/product";

/// Field selection sent with every lookup to keep responses small.
const FIELDS: &str = "product_name,brands,nutriscore_grade,nutriments";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    status: i64,
    product: Option<WireProduct>,
}

#[derive(Deserialize)]
struct WireProduct {
    #[serde(default)]
    product_name: Option<String>,
    #[serde(default)]
    brands: Option<String>,
    #[serde(default)]
    nutriscore_grade: Option<String>,
    #[serde(default)]
    nutriments: Option<WireNutriments>,
}

#[derive(Deserialize)]
struct WireNutriments {
    #[serde(default, rename = "energy-kcal_100g")]
    energy_kcal_100g: Option<f64>,
    #[serde(default, rename = "fat_100g")]
    fat_100g: Option<f64>,
    #[serde(default, rename = "sugars_100g")]
    sugars_100g: Option<f64>,
}

impl WireProduct {
    fn into_facts(self) -> NutritionFacts {
        let nutriments = self.nutriments.unwrap_or(WireNutriments {
            energy_kcal_100g: None,
            fat_100g: None,
            sugars_100g: None,
        });
        NutritionFacts {
            product_name: self.product_name,
            brands: self.brands,
            nutriscore_grade: self.nutriscore_grade,
            energy_kcal_100g: nutriments.energy_kcal_100g,
            fat_100g: nutriments.fat_100g,
            sugars_100g: nutriments.sugars_100g,
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Open Food Facts lookup client.
pub struct NutritionClient {
    http: HttpClient,
    base_url: Url,
}

impl NutritionClient {
    /// Creates a client against the public database.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(DEFAULT_NUTRITION_BASE)
    }

    /// Creates a client against a non-default host.
    pub fn with_base_url(base_url: &str) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FetchError::InvalidResponse(format!("invalid base url: {e}")))?;
        Ok(Self {
            http: HttpClient::new()?,
            base_url,
        })
    }

    /// Looks up one barcode. `Ok(None)` when the database does not know it.
    #[instrument(skip(self))]
    pub async fn lookup(&self, ean: &str) -> Result<Option<NutritionFacts>, FetchError> {
        let url = format!(
            "{}/{PRODUCT_PATH}/{ean}?fields={FIELDS}",
            self.base_url.as_str().trim_end_matches('/')
        );

        let Some(response) = self.http.get_json_opt::<LookupResponse>(&url, None).await? else {
            return Ok(None);
        };
        if response.status == 0 {
            debug!(ean = %ean, "Barcode unknown to nutrition database");
            return Ok(None);
        }
        Ok(response.product.map(WireProduct::into_facts))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_product_mapping() {
        let json = r#"{
            "status": 1,
            "product": {
                "product_name": "Bryggkaffe",
                "brands": "Gevalia",
                "nutriscore_grade": "b",
                "nutriments": {"energy-kcal_100g": 2.0, "fat_100g": 0.1, "sugars_100g": 0.0}
            }
        }"#;
        let response: LookupResponse = serde_json::from_str(json).unwrap();
        let facts = response.product.unwrap().into_facts();
        assert_eq!(facts.product_name.as_deref(), Some("Bryggkaffe"));
        assert_eq!(facts.energy_kcal_100g, Some(2.0));
    }

    #[test]
    fn test_status_zero_means_not_found() {
        let json = r#"{"status": 0, "status_verbose": "product not found"}"#;
        let response: LookupResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.status, 0);
        assert!(response.product.is_none());
    }
}
