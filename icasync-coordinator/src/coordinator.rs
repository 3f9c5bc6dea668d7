//! The polling coordinator.
//!
//! One [`IcaCoordinator`] owns the session, the per-resource cache entries
//! and the product registry for a single account. [`IcaCoordinator::refresh_data`]
//! is the periodic entry point: it keeps the login fresh, walks every cached
//! resource in dependency order and emits change events through the
//! background worker.
//!
//! All mutating paths take `&mut self`, so no two refresh passes (and
//! therefore no two logins) can overlap for one account.

use std::collections::{btree_map, BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use icasync_core::{
    diff::{get_diffs, keyed},
    models::{
        Article, AuthCredentials, AuthState, BaseItem, CurrentBonus, Offer,
        ProductRegistryEntry, ShoppingList, ShoppingListSync, Store, StoreOffers,
    },
    IcaEvent,
};
use icasync_fetch::{FetchError, IcaApi, IcaAuthenticator, NutritionClient};
use icasync_store::{keyed_path, load_json_opt, save_json, CacheEntry, Factory, SessionStore};

use crate::error::CoordinatorError;
use crate::registry::ProductRegistry;
use crate::worker::{BackgroundWorker, EventSink};

// ============================================================================
// Cache TTLs
// ============================================================================

/// Shared article catalog: changes rarely.
const ARTICLES_TTL_SECS: i64 = 24 * 60 * 60;
/// Favorite items.
const BASEITEMS_TTL_SECS: i64 = 60 * 60;
/// Bonus standing.
const BONUS_TTL_SECS: i64 = 60 * 60;
/// Favorite stores.
const FAVORITE_STORES_TTL_SECS: i64 = 24 * 60 * 60;
/// Per-store offer listings.
const OFFERS_TTL_SECS: i64 = 4 * 60 * 60;
/// Reconciled offer details; refreshed explicitly each pass.
const OFFER_DETAILS_TTL_SECS: i64 = 4 * 60 * 60;
/// Tracked shopping lists are forced every pass; the TTL only governs
/// ad-hoc reads between passes.
const SHOPPING_LISTS_TTL_SECS: i64 = 5 * 60;

/// Fallback article group for free-text items ("Unspecified").
const UNSPECIFIED_ARTICLE_GROUP: i64 = 12;

// ============================================================================
// Configuration
// ============================================================================

/// Static configuration for one coordinator instance.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Account identifier stamped onto every emitted event.
    pub uid: String,
    /// Offline ids of the shopping lists to track. Untracked lists are
    /// never fetched row-by-row and never produce events.
    pub tracked_lists: Vec<String>,
    /// Directory for cache mirrors.
    pub cache_dir: PathBuf,
    /// Directory for the durable session blob.
    pub config_dir: PathBuf,
}

// ============================================================================
// Coordinator
// ============================================================================

/// Periodic fetch-diff-emit driver for one account.
pub struct IcaCoordinator {
    authenticator: IcaAuthenticator,
    api: Arc<IcaApi>,
    nutrition: NutritionClient,
    session: SessionStore,
    worker: Arc<BackgroundWorker>,
    registry: ProductRegistry,
    registry_hydrated: bool,
    uid: String,
    cache_dir: PathBuf,
    logged_in: bool,

    articles: Arc<CacheEntry<Vec<Article>, FetchError>>,
    baseitems: Arc<CacheEntry<Vec<BaseItem>, FetchError>>,
    current_bonus: Arc<CacheEntry<CurrentBonus, FetchError>>,
    favorite_stores: Arc<CacheEntry<Vec<Store>, FetchError>>,
    shopping_lists: Arc<CacheEntry<Vec<ShoppingList>, FetchError>>,
    offers: Arc<CacheEntry<BTreeMap<i64, StoreOffers>, FetchError>>,
    offer_details: Arc<CacheEntry<Vec<Offer>, FetchError>>,
}

impl IcaCoordinator {
    /// Creates a coordinator against the production endpoints.
    pub fn new(
        credentials: AuthCredentials,
        session_state: Option<AuthState>,
        sink: Arc<dyn EventSink>,
        config: CoordinatorConfig,
    ) -> Result<Self, CoordinatorError> {
        let authenticator = IcaAuthenticator::new(credentials, session_state)?;
        let api = IcaApi::new()?;
        let nutrition = NutritionClient::new()?;
        Ok(Self::with_clients(authenticator, api, nutrition, sink, config))
    }

    /// Creates a coordinator from pre-built clients (the test seam).
    pub fn with_clients(
        authenticator: IcaAuthenticator,
        api: IcaApi,
        nutrition: NutritionClient,
        sink: Arc<dyn EventSink>,
        config: CoordinatorConfig,
    ) -> Self {
        let api = Arc::new(api);
        let worker = Arc::new(BackgroundWorker::new(sink));
        let uid = config.uid.clone();
        let cache_dir = config.cache_dir.clone();

        let articles = Arc::new(CacheEntry::with_disk(
            "articles",
            ARTICLES_TTL_SECS,
            articles_factory(&api),
            cache_dir.clone(),
        ));
        let baseitems = Arc::new(CacheEntry::with_disk(
            format!("{uid}.baseitems"),
            BASEITEMS_TTL_SECS,
            baseitems_factory(&api),
            cache_dir.clone(),
        ));
        let current_bonus = Arc::new(CacheEntry::with_disk(
            format!("{uid}.current_bonus"),
            BONUS_TTL_SECS,
            bonus_factory(&api, &worker, &uid),
            cache_dir.clone(),
        ));
        let favorite_stores = Arc::new(CacheEntry::with_disk(
            format!("{uid}.favorite_stores"),
            FAVORITE_STORES_TTL_SECS,
            favorite_stores_factory(&api),
            cache_dir.clone(),
        ));
        let shopping_lists = Arc::new(CacheEntry::with_disk(
            format!("{uid}.shopping_lists"),
            SHOPPING_LISTS_TTL_SECS,
            shopping_lists_factory(&api, config.tracked_lists.clone()),
            cache_dir.clone(),
        ));
        let offers = Arc::new(CacheEntry::with_disk(
            format!("{uid}.favorite_stores_offers"),
            OFFERS_TTL_SECS,
            offers_factory(&api, &favorite_stores),
            cache_dir.clone(),
        ));
        // The reconciled snapshot has exactly one producer,
        // update_offer_details; reads go through current_value, so the
        // factory only covers an empty cold start and never fetches.
        let offer_details = Arc::new(CacheEntry::with_disk(
            format!("{uid}.favorite_stores_offers_full"),
            OFFER_DETAILS_TTL_SECS,
            empty_offer_details_factory(),
            cache_dir.clone(),
        ));

        Self {
            authenticator,
            api,
            nutrition,
            session: SessionStore::at_dir(config.config_dir),
            worker,
            registry: ProductRegistry::new(),
            registry_hydrated: false,
            uid,
            cache_dir,
            logged_in: false,
            articles,
            baseitems,
            current_bonus,
            favorite_stores,
            shopping_lists,
            offers,
            offer_details,
        }
    }

    /// The event worker, for `mark_loaded`/`shutdown` and timer wiring.
    pub fn worker(&self) -> Arc<BackgroundWorker> {
        Arc::clone(&self.worker)
    }

    /// The decoded identity of the logged-in user, if known.
    pub fn user_name(&self) -> Option<String> {
        self.authenticator
            .auth_state()
            .user
            .as_ref()
            .map(|u| u.person_name.clone())
    }

    // ========================================================================
    // Refresh Cycle
    // ========================================================================

    /// Runs one refresh cycle over every cached resource.
    ///
    /// The first call always establishes a session; later calls refresh the
    /// token only when it is due. A 401 anywhere in the pass forces one
    /// token refresh and retries the whole pass exactly once; any other
    /// failure (or a failed retry) surfaces as
    /// [`CoordinatorError::UpdateFailed`] for the host to retry next cycle.
    #[instrument(skip(self))]
    pub async fn refresh_data(&mut self, invalidate: Option<bool>) -> Result<(), CoordinatorError> {
        self.hydrate_registry().await;
        self.ensure_session(false).await?;

        match self.refresh_pass(invalidate).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_unauthorized() => {
                warn!("Got 401 during refresh pass, refreshing token and retrying once");
                self.ensure_session(true).await?;
                self.refresh_pass(invalidate)
                    .await
                    .map_err(|e| CoordinatorError::UpdateFailed(e.to_string()))
            }
            Err(err) => Err(CoordinatorError::UpdateFailed(err.to_string())),
        }
    }

    async fn refresh_pass(&mut self, invalidate: Option<bool>) -> Result<(), FetchError> {
        // Shared catalog data first, then account data.
        self.articles.get_value(invalidate).await?;
        self.baseitems.get_value(invalidate).await?;
        self.current_bonus.get_value(invalidate).await?;
        self.refresh_shopping_lists().await?;
        self.favorite_stores.get_value(invalidate).await?;
        self.offers.get_value(invalidate).await?;
        self.update_offer_details().await?;
        Ok(())
    }

    /// Logs in (or refreshes) and propagates the session everywhere it is
    /// needed: the API client's auth key and the durable session blob.
    async fn ensure_session(&mut self, force: bool) -> Result<(), CoordinatorError> {
        let state = self.authenticator.ensure_login(force).await?;
        if let Some(token) = state.access_token() {
            self.api.set_auth_key(token).await;
        }
        if !self.logged_in {
            info!(user = ?state.user.as_ref().map(|u| &u.person_name), "Session established");
            self.logged_in = true;
        }
        if let Err(e) = self.session.save(&state).await {
            warn!(error = %e, "Failed to persist session blob");
        }
        Ok(())
    }

    // ========================================================================
    // Shopping Lists
    // ========================================================================

    /// Force-fetches the tracked lists and emits a `shopping_list_updated`
    /// event with row diffs for every list that changed.
    async fn refresh_shopping_lists(&mut self) -> Result<Vec<ShoppingList>, FetchError> {
        let previous = self.shopping_lists.current_value().await.unwrap_or_default();
        let updated = self.shopping_lists.get_value(Some(true)).await?;

        for list in &updated {
            let Some(old) = previous.iter().find(|l| l.offline_id == list.offline_id) else {
                continue;
            };
            let diffs = get_diffs(&keyed(&old.rows, row_key), &keyed(&list.rows, row_key));
            if !diffs.is_empty() {
                debug!(list = %list.offline_id, changes = diffs.len(), "Shopping list changed");
                self.worker.fire_or_queue_event(IcaEvent::shopping_list_updated(
                    &self.uid,
                    &list.offline_id,
                    &list.title,
                    &diffs,
                ));
            }
        }
        Ok(updated)
    }

    /// The tracked lists as last fetched.
    pub async fn tracked_shopping_lists(&self) -> Vec<ShoppingList> {
        self.shopping_lists.current_value().await.unwrap_or_default()
    }

    /// One tracked list by offline id, as last fetched.
    pub async fn get_shopping_list(&self, list_id: &str) -> Option<ShoppingList> {
        self.tracked_shopping_lists()
            .await
            .into_iter()
            .find(|l| l.offline_id == list_id)
    }

    /// Pushes a row-level sync and reconciles the local cache.
    ///
    /// The authoritative post-sync list replaces the cached copy in place;
    /// if the list is not cached locally the whole entry is invalidated so
    /// the next read re-fetches.
    #[instrument(skip(self, sync))]
    pub async fn sync_shopping_list(
        &mut self,
        sync: &ShoppingListSync,
    ) -> Result<ShoppingList, CoordinatorError> {
        sync.validate()?;
        let updated = self.api.sync_shopping_list(sync).await?;

        let mut lists = self.shopping_lists.current_value().await.unwrap_or_default();
        if let Some(slot) = lists.iter_mut().find(|l| l.offline_id == sync.offline_id) {
            *slot = updated.clone();
            self.shopping_lists.set_value(lists).await;
        } else {
            debug!(list = %sync.offline_id, "Synced list not cached, invalidating");
            self.shopping_lists.invalidate().await;
        }
        Ok(updated)
    }

    // ========================================================================
    // Baseitems
    // ========================================================================

    /// The favorite items, fetched when stale.
    pub async fn baseitems(&self) -> Result<Vec<BaseItem>, CoordinatorError> {
        Ok(self.baseitems.get_value(None).await?)
    }

    /// Adds a product to the favorite items by barcode.
    ///
    /// Resolves the barcode (vendor catalog first, nutrition database as the
    /// name-only fallback), appends an item with the next sort order and
    /// pushes the full set. The authoritative response is spliced into the
    /// cache; when the splice has nothing to work with the entry is
    /// invalidated instead.
    #[instrument(skip(self))]
    pub async fn add_baseitem(&mut self, ean: &str) -> Result<Vec<BaseItem>, CoordinatorError> {
        self.hydrate_registry().await;

        let mut item = match self.api.lookup_barcode(ean).await? {
            Some(product) => {
                self.record_catalog(ean, product.clone()).await;
                BaseItem {
                    id: Uuid::new_v4().to_string(),
                    text: product.name,
                    article_id: product.article_id,
                    article_group_id: product
                        .article_group_id
                        .or(Some(UNSPECIFIED_ARTICLE_GROUP)),
                    article_group_id_extended: product.expanded_article_group_id,
                    article_ean: Some(product.gtin),
                    sort_order: 0,
                }
            }
            None => {
                let facts = self.nutrition.lookup(ean).await?;
                let Some(name) = facts.as_ref().and_then(|f| f.product_name.clone()) else {
                    return Err(CoordinatorError::ProductNotFound(ean.to_string()));
                };
                if let Some(facts) = facts {
                    self.record_nutrition(ean, facts).await;
                }
                BaseItem {
                    id: Uuid::new_v4().to_string(),
                    text: name,
                    article_group_id: Some(UNSPECIFIED_ARTICLE_GROUP),
                    article_ean: Some(ean.to_string()),
                    ..Default::default()
                }
            }
        };

        let mut items = self.baseitems.get_value(Some(false)).await?;
        item.sort_order = items.last().map_or(0, |last| last.sort_order + 1);
        info!(ean = %ean, text = %item.text, "Adding baseitem");
        items.push(item);

        let response = self.api.sync_baseitems(&items).await?;
        if response.is_empty() && !items.is_empty() {
            // Server gave nothing to splice; drop the cache and re-fetch.
            self.baseitems.invalidate().await;
            return Ok(self.baseitems.get_value(Some(true)).await?);
        }
        self.baseitems.set_value(response.clone()).await;
        Ok(response)
    }

    // ========================================================================
    // Offers
    // ========================================================================

    /// The reconciled offer details as last computed.
    pub async fn offer_details(&self) -> Vec<Offer> {
        self.offer_details.current_value().await.unwrap_or_default()
    }

    /// One offer's listing record from the per-store feed.
    pub async fn get_offer_info(&self, offer_id: &str) -> Option<Offer> {
        let per_store = self.offers.current_value().await?;
        per_store
            .values()
            .flat_map(|s| s.offers.iter())
            .find(|o| o.id == offer_id)
            .cloned()
    }

    /// One offer's reconciled detail record.
    pub async fn get_offer_info_full(&self, offer_id: &str) -> Option<Offer> {
        self.offer_details()
            .await
            .into_iter()
            .find(|o| o.id == offer_id)
    }

    /// Fetches fresh offer details and reconciles them with the held set.
    ///
    /// Offers whose validity ended more than the grace period ago are
    /// dropped; fetched records merge over held ones field-by-field (old-only
    /// fields survive). Emits `offers_changed` with diffs when anything
    /// changed and `new_offers` with the previously-unseen records; every
    /// offer's barcodes feed the product registry.
    #[instrument(skip(self))]
    pub async fn update_offer_details(&mut self) -> Result<(), FetchError> {
        let by_store = self.offers.get_value(Some(false)).await?;
        let (store_ids, offer_ids) = offer_search_ids(&by_store);
        if store_ids.is_empty() {
            debug!("No favorite stores, skipping offer reconciliation");
            return Ok(());
        }

        let fetched = self.api.search_offers(&store_ids, &offer_ids).await?;
        let previous = self.offer_details.current_value().await.unwrap_or_default();
        let known_ids: BTreeSet<&str> = previous.iter().map(|o| o.id.as_str()).collect();
        let now = Utc::now();

        let mut merged: BTreeMap<String, Offer> = previous
            .iter()
            .filter(|o| !o.is_past_grace(now))
            .map(|o| (o.id.clone(), o.clone()))
            .collect();

        let mut fresh: Vec<Offer> = Vec::new();
        for offer in fetched {
            if !known_ids.contains(offer.id.as_str()) {
                fresh.push(offer.clone());
            }
            match merged.entry(offer.id.clone()) {
                btree_map::Entry::Occupied(mut held) => held.get_mut().merge_from(offer),
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(offer);
                }
            }
        }
        let reconciled: Vec<Offer> = merged.into_values().collect();

        // Feed the registry before events so a products_changed consumer
        // sees the offers already recorded.
        let mut new_eans: Vec<String> = Vec::new();
        for offer in &reconciled {
            for ean in &offer.eans {
                if self
                    .registry
                    .record_offer(ean, &offer.id, offer.name.as_deref())
                {
                    new_eans.push(ean.clone());
                }
            }
        }
        if !new_eans.is_empty() {
            self.worker
                .fire_or_queue_event(IcaEvent::products_changed(&self.uid, &new_eans));
            self.persist_registry().await;
        }

        let diffs = get_diffs(
            &keyed(&previous, |o: &Offer| Some(o.id.clone())),
            &keyed(&reconciled, |o: &Offer| Some(o.id.clone())),
        );
        if !diffs.is_empty() {
            info!(changes = diffs.len(), new = fresh.len(), "Offer snapshot changed");
            self.worker
                .fire_or_queue_event(IcaEvent::offers_changed(&self.uid, &diffs));
        }
        if !fresh.is_empty() {
            let payload = serde_json::to_value(&fresh).unwrap_or_default();
            self.worker
                .fire_or_queue_event(IcaEvent::new_offers(&self.uid, payload));
        }

        self.offer_details.set_value(reconciled).await;
        Ok(())
    }

    // ========================================================================
    // Products
    // ========================================================================

    /// Resolves a barcode across every known source.
    ///
    /// Vendor catalog first; the nutrition database fills in when the vendor
    /// does not know the barcode. Either result is merged into the registry.
    /// "Not found" means no source resolved it and no known offer references
    /// it.
    #[instrument(skip(self))]
    pub async fn lookup_product(
        &mut self,
        ean: &str,
    ) -> Result<ProductRegistryEntry, CoordinatorError> {
        self.hydrate_registry().await;

        match self.api.lookup_barcode(ean).await? {
            Some(product) => self.record_catalog(ean, product).await,
            None => {
                if let Some(facts) = self.nutrition.lookup(ean).await? {
                    self.record_nutrition(ean, facts).await;
                }
            }
        }

        match self.registry.get(ean) {
            Some(entry) if !entry.is_unknown() => Ok(entry.clone()),
            _ => Err(CoordinatorError::ProductNotFound(ean.to_string())),
        }
    }

    async fn record_catalog(&mut self, ean: &str, product: icasync_core::ProductLookup) {
        let created = self.registry.record_catalog(ean, product);
        if created {
            self.worker
                .fire_or_queue_event(IcaEvent::products_changed(&self.uid, &[ean.to_string()]));
        }
        self.persist_registry().await;
    }

    async fn record_nutrition(&mut self, ean: &str, facts: icasync_core::NutritionFacts) {
        let created = self.registry.record_nutrition(ean, facts);
        if created {
            self.worker
                .fire_or_queue_event(IcaEvent::products_changed(&self.uid, &[ean.to_string()]));
        }
        self.persist_registry().await;
    }

    // ========================================================================
    // Registry Persistence
    // ========================================================================

    fn registry_path(&self) -> PathBuf {
        keyed_path(&self.cache_dir, &format!("{}.product_registry", self.uid))
    }

    async fn hydrate_registry(&mut self) {
        if self.registry_hydrated {
            return;
        }
        self.registry_hydrated = true;
        if let Some(registry) = load_json_opt::<ProductRegistry>(&self.registry_path()).await {
            debug!(entries = registry.len(), "Hydrated product registry");
            self.registry = registry;
        }
    }

    async fn persist_registry(&self) {
        if let Err(e) = save_json(&self.registry_path(), &self.registry).await {
            warn!(error = %e, "Failed to mirror product registry to disk");
        }
    }
}

// ============================================================================
// Cache Factories
// ============================================================================

fn articles_factory(api: &Arc<IcaApi>) -> Factory<Vec<Article>, FetchError> {
    let api = Arc::clone(api);
    Arc::new(move || {
        let api = Arc::clone(&api);
        Box::pin(async move { api.get_articles().await })
    })
}

fn baseitems_factory(api: &Arc<IcaApi>) -> Factory<Vec<BaseItem>, FetchError> {
    let api = Arc::clone(api);
    Arc::new(move || {
        let api = Arc::clone(&api);
        Box::pin(async move { api.get_baseitems().await })
    })
}

fn bonus_factory(
    api: &Arc<IcaApi>,
    worker: &Arc<BackgroundWorker>,
    uid: &str,
) -> Factory<CurrentBonus, FetchError> {
    let api = Arc::clone(api);
    let worker = Arc::clone(worker);
    let uid = uid.to_string();
    Arc::new(move || {
        let api = Arc::clone(&api);
        let worker = Arc::clone(&worker);
        let uid = uid.clone();
        Box::pin(async move {
            let bonus = api.get_current_bonus().await?;
            let payload = serde_json::to_value(&bonus).unwrap_or_default();
            worker.fire_or_queue_event(IcaEvent::current_bonus_loaded(&uid, payload));
            Ok(bonus)
        })
    })
}

fn favorite_stores_factory(api: &Arc<IcaApi>) -> Factory<Vec<Store>, FetchError> {
    let api = Arc::clone(api);
    Arc::new(move || {
        let api = Arc::clone(&api);
        Box::pin(async move { api.get_favorite_stores().await })
    })
}

fn shopping_lists_factory(
    api: &Arc<IcaApi>,
    tracked: Vec<String>,
) -> Factory<Vec<ShoppingList>, FetchError> {
    let api = Arc::clone(api);
    Arc::new(move || {
        let api = Arc::clone(&api);
        let tracked = tracked.clone();
        Box::pin(async move {
            let all = api.get_shopping_lists().await?;
            let mut selected = Vec::with_capacity(tracked.len());
            for list in all {
                if tracked.contains(&list.offline_id) {
                    selected.push(api.get_shopping_list(&list.offline_id).await?);
                }
            }
            Ok(selected)
        })
    })
}

fn offers_factory(
    api: &Arc<IcaApi>,
    stores: &Arc<CacheEntry<Vec<Store>, FetchError>>,
) -> Factory<BTreeMap<i64, StoreOffers>, FetchError> {
    let api = Arc::clone(api);
    let stores = Arc::clone(stores);
    Arc::new(move || {
        let api = Arc::clone(&api);
        let stores = Arc::clone(&stores);
        Box::pin(async move {
            let stores = stores.get_value(None).await?;
            let store_ids: Vec<i64> = stores.iter().map(|s| s.id).collect();
            api.get_offers(&store_ids).await
        })
    })
}

/// Backing factory for the reconciled offer snapshot. The snapshot is only
/// ever written by [`IcaCoordinator::update_offer_details`] and read back
/// via `current_value`, so a cold cache starts empty instead of fetching.
fn empty_offer_details_factory() -> Factory<Vec<Offer>, FetchError> {
    Arc::new(|| Box::pin(async { Ok(Vec::new()) }))
}

// ============================================================================
// Helpers
// ============================================================================

/// Diff key for a shopping-list row: the stable offline id when present,
/// the server id otherwise.
fn row_key(row: &icasync_core::ShoppingListRow) -> Option<String> {
    row.offline_id
        .clone()
        .or_else(|| row.id.map(|id| id.to_string()))
}

/// Store ids and deduplicated, sorted offer ids of a per-store offer map.
fn offer_search_ids(by_store: &BTreeMap<i64, StoreOffers>) -> (Vec<i64>, Vec<String>) {
    let store_ids: Vec<i64> = by_store.keys().copied().collect();
    let offer_ids: BTreeSet<String> = by_store
        .values()
        .flat_map(|s| s.offers.iter())
        .map(|o| o.id.clone())
        .collect();
    (store_ids, offer_ids.into_iter().collect())
}

// ============================================================================
// Tests
// ============================================================================
