//! Typed vendor API client.
//!
//! Maps each vendor REST endpoint to a typed call. No business logic: every
//! method attaches the current bearer token and surfaces non-2xx statuses as
//! errors, except where a 404 is explicitly "not found" (barcode and recipe
//! lookups). The client is stateless beyond the held auth key, which the
//! coordinator swaps after every login/refresh.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use url::Url;

use icasync_core::{
    Article, BaseItem, CurrentBonus, Offer, ProductLookup, ShoppingList, ShoppingListSync, Store,
    StoreOffers,
};

use crate::client::HttpClient;
use crate::error::FetchError;

// ============================================================================
// Constants
// ============================================================================

/// Public API gateway base URL.
pub const DEFAULT_API_BASE: &str = "https://apimgw-pub.ica.se";

const MY_LISTS_PATH: &str = "sverige/digx/mobile/shoppinglistservice/v1/shoppinglists";
const BASEITEMS_PATH: &str = "sverige/digx/mobile/shoppinglistservice/v1/baseitems";
const ARTICLES_PATH: &str = "sverige/digx/mobile/shoppinglistservice/v1/articles";
const ARTICLE_GROUPS_PATH: &str =
    "sverige/digx/mobile/shoppinglistservice/v1/articles/articlegroups";
const OFFERS_SEARCH_PATH: &str = "sverige/digx/mobile/offerservice/v1/offers/search";
const STORE_OFFERS_PATH: &str = "sverige/digx/mobile/offerservice/v1/offersdiscounts";
const PRODUCT_LOOKUP_PATH: &str = "sverige/digx/mobile/productservice/v1/product";
const MY_BONUS_PATH: &str = "sverige/digx/mobile/bonusservice/v1/bonus/current";
const MY_STORES_PATH: &str = "sverige/digx/mobile/storeservice/v1/favorites";
const STORE_PATH: &str = "sverige/digx/mobile/storeservice/v1/stores";
const RECIPE_PATH: &str = "sverige/digx/mobile/recipeservice/v1/recipes";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShoppingListsResponse {
    #[serde(default)]
    shopping_lists: Vec<ShoppingList>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArticlesResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FavoriteStoresResponse {
    #[serde(default)]
    favorite_stores: Vec<i64>,
}

/// An article group (category) record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductCategory {
    /// Category id.
    pub id: i64,
    /// Category name.
    #[serde(default)]
    pub name: Option<String>,
    /// Parent category id.
    #[serde(default)]
    pub parent_id: Option<i64>,
}

/// A recipe record; only the fields shown downstream are typed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    /// Recipe id.
    pub id: i64,
    /// Recipe title.
    #[serde(default)]
    pub title: Option<String>,
    /// Number of portions.
    #[serde(default)]
    pub portions: Option<i64>,
}

// ============================================================================
// API Client
// ============================================================================

/// Stateless wrapper over the vendor's REST endpoints.
pub struct IcaApi {
    http: HttpClient,
    base_url: Url,
    auth_key: RwLock<Option<String>>,
}

impl IcaApi {
    /// Creates a client against the public gateway.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(DEFAULT_API_BASE)
    }

    /// Creates a client against a non-default gateway.
    pub fn with_base_url(base_url: &str) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FetchError::InvalidResponse(format!("invalid base url: {e}")))?;
        Ok(Self {
            http: HttpClient::new()?,
            base_url,
            auth_key: RwLock::new(None),
        })
    }

    /// Swaps in the live access token after a login or refresh.
    pub async fn set_auth_key(&self, access_token: impl Into<String>) {
        *self.auth_key.write().await = Some(access_token.into());
    }

    async fn bearer(&self) -> Option<String> {
        self.auth_key
            .read()
            .await
            .as_ref()
            .map(|key| format!("Bearer {key}"))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.as_str().trim_end_matches('/'))
    }

    // ========================================================================
    // Shopping Lists
    // ========================================================================

    /// Fetches all shopping lists for the account.
    #[instrument(skip(self))]
    pub async fn get_shopping_lists(&self) -> Result<Vec<ShoppingList>, FetchError> {
        let response: ShoppingListsResponse = self
            .http
            .get_json(&self.url(MY_LISTS_PATH), self.bearer().await.as_deref())
            .await?;
        Ok(response.shopping_lists)
    }

    /// Fetches one shopping list with its rows.
    #[instrument(skip(self))]
    pub async fn get_shopping_list(&self, list_id: &str) -> Result<ShoppingList, FetchError> {
        self.http
            .get_json(
                &format!("{}/{list_id}", self.url(MY_LISTS_PATH)),
                self.bearer().await.as_deref(),
            )
            .await
    }

    /// Creates a shopping list and returns its server-side record.
    #[instrument(skip(self))]
    pub async fn create_shopping_list(
        &self,
        list: &ShoppingList,
    ) -> Result<ShoppingList, FetchError> {
        let _: serde_json::Value = self
            .http
            .post_json(
                &self.url(MY_LISTS_PATH),
                self.bearer().await.as_deref(),
                list,
            )
            .await?;
        self.get_shopping_list(&list.offline_id).await
    }

    /// Pushes one kind of row change for a list, returning the
    /// authoritative post-sync list.
    #[instrument(skip(self, sync))]
    pub async fn sync_shopping_list(
        &self,
        sync: &ShoppingListSync,
    ) -> Result<ShoppingList, FetchError> {
        sync.validate()?;

        // Exactly one row set per call, deleted/changed/created priority.
        let payload = if let Some(deleted) = &sync.deleted_rows {
            serde_json::json!({ "deletedRows": deleted })
        } else if let Some(changed) = &sync.changed_rows {
            serde_json::json!({ "changedRows": changed })
        } else if let Some(created) = &sync.created_rows {
            serde_json::json!({ "createdRows": created })
        } else {
            serde_json::to_value(sync)?
        };

        self.http
            .post_json(
                &format!("{}/{}/sync", self.url(MY_LISTS_PATH), sync.offline_id),
                self.bearer().await.as_deref(),
                &payload,
            )
            .await
    }

    /// Deletes a shopping list.
    #[instrument(skip(self))]
    pub async fn delete_shopping_list(&self, offline_id: &str) -> Result<(), FetchError> {
        self.http
            .delete(
                &format!("{}/{offline_id}", self.url(MY_LISTS_PATH)),
                self.bearer().await.as_deref(),
            )
            .await
    }

    // ========================================================================
    // Baseitems & Articles
    // ========================================================================

    /// Fetches the favorite items (baseitems).
    #[instrument(skip(self))]
    pub async fn get_baseitems(&self) -> Result<Vec<BaseItem>, FetchError> {
        self.http
            .get_json(&self.url(BASEITEMS_PATH), self.bearer().await.as_deref())
            .await
    }

    /// Replaces the favorite items, returning the authoritative set.
    #[instrument(skip(self, items))]
    pub async fn sync_baseitems(&self, items: &[BaseItem]) -> Result<Vec<BaseItem>, FetchError> {
        self.http
            .post_json(
                &self.url(BASEITEMS_PATH),
                self.bearer().await.as_deref(),
                items,
            )
            .await
    }

    /// Fetches the shared article catalog.
    #[instrument(skip(self))]
    pub async fn get_articles(&self) -> Result<Vec<Article>, FetchError> {
        let response: ArticlesResponse = self
            .http
            .get_json(&self.url(ARTICLES_PATH), self.bearer().await.as_deref())
            .await?;
        Ok(response.articles)
    }

    /// Fetches the article group (category) tree.
    #[instrument(skip(self))]
    pub async fn get_product_categories(&self) -> Result<Vec<ProductCategory>, FetchError> {
        self.http
            .get_json(
                &format!("{}?lastsyncdate=2001-01-01", self.url(ARTICLE_GROUPS_PATH)),
                self.bearer().await.as_deref(),
            )
            .await
    }

    // ========================================================================
    // Stores & Offers
    // ========================================================================

    /// Fetches one store's record.
    #[instrument(skip(self))]
    pub async fn get_store(&self, store_id: i64) -> Result<Store, FetchError> {
        self.http
            .get_json(
                &format!("{}/{store_id}", self.url(STORE_PATH)),
                self.bearer().await.as_deref(),
            )
            .await
    }

    /// Fetches the favorite stores: the favorites list, then each store.
    #[instrument(skip(self))]
    pub async fn get_favorite_stores(&self) -> Result<Vec<Store>, FetchError> {
        let response: FavoriteStoresResponse = self
            .http
            .get_json(&self.url(MY_STORES_PATH), self.bearer().await.as_deref())
            .await?;

        let mut stores = Vec::with_capacity(response.favorite_stores.len());
        for store_id in response.favorite_stores {
            stores.push(self.get_store(store_id).await?);
        }
        Ok(stores)
    }

    /// Fetches the current offers for one store.
    #[instrument(skip(self))]
    pub async fn get_offers_for_store(&self, store_id: i64) -> Result<StoreOffers, FetchError> {
        let mut offers: StoreOffers = self
            .http
            .get_json(
                &format!("{}/{store_id}", self.url(STORE_OFFERS_PATH)),
                self.bearer().await.as_deref(),
            )
            .await?;
        offers.store_id = store_id;
        Ok(offers)
    }

    /// Fetches offers for a set of stores. Per-store, so a partial failure
    /// surfaces with the failing store rather than blanking the whole map.
    #[instrument(skip(self))]
    pub async fn get_offers(
        &self,
        store_ids: &[i64],
    ) -> Result<BTreeMap<i64, StoreOffers>, FetchError> {
        let mut per_store = BTreeMap::new();
        for &store_id in store_ids {
            per_store.insert(store_id, self.get_offers_for_store(store_id).await?);
        }
        debug!(stores = ?store_ids, "Fetched offers");
        Ok(per_store)
    }

    /// Searches full offer detail records by id.
    #[instrument(skip(self, offer_ids))]
    pub async fn search_offers(
        &self,
        store_ids: &[i64],
        offer_ids: &[String],
    ) -> Result<Vec<Offer>, FetchError> {
        self.http
            .post_json(
                &self.url(OFFERS_SEARCH_PATH),
                self.bearer().await.as_deref(),
                &serde_json::json!({ "offerIds": offer_ids, "storeIds": store_ids }),
            )
            .await
    }

    // ========================================================================
    // Bonus, Products & Recipes
    // ========================================================================

    /// Fetches the account's current bonus standing.
    #[instrument(skip(self))]
    pub async fn get_current_bonus(&self) -> Result<CurrentBonus, FetchError> {
        self.http
            .get_json(&self.url(MY_BONUS_PATH), self.bearer().await.as_deref())
            .await
    }

    /// Looks up a barcode in the vendor catalog. 404 is "not found".
    #[instrument(skip(self))]
    pub async fn lookup_barcode(&self, ean: &str) -> Result<Option<ProductLookup>, FetchError> {
        self.http
            .get_json_opt(
                &format!("{}/{ean}", self.url(PRODUCT_LOOKUP_PATH)),
                self.bearer().await.as_deref(),
            )
            .await
    }

    /// Fetches one recipe. 404 is "not found".
    #[instrument(skip(self))]
    pub async fn get_recipe(&self, recipe_id: i64) -> Result<Option<Recipe>, FetchError> {
        self.http
            .get_json_opt(
                &format!("{}/{recipe_id}?api-version=2.0", self.url(RECIPE_PATH)),
                self.bearer().await.as_deref(),
            )
            .await
    }
}
