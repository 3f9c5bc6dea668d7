//! End-to-end refresh cycle tests against mock vendor servers.
//!
//! Drives a real coordinator through full refresh passes: fetch order,
//! shopping-list diff events, offer reconciliation events and the
//! 401-retry-once rule.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use icasync_core::events::{
    EVENT_CURRENT_BONUS_LOADED, EVENT_NEW_OFFERS, EVENT_OFFERS_CHANGED,
    EVENT_PRODUCTS_CHANGED, EVENT_SHOPPING_LIST_UPDATED,
};
use icasync_core::{AuthCredentials, AuthState, IcaEvent, OAuthClient, OAuthToken};
use icasync_coordinator::{CoordinatorConfig, CoordinatorError, EventSink, IcaCoordinator};
use icasync_fetch::{IcaApi, IcaAuthenticator, NutritionClient};

// ============================================================================
// Fixtures
// ============================================================================

struct RecordingSink {
    events: Mutex<Vec<IcaEvent>>,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    fn of_type(&self, event_type: &str) -> Vec<IcaEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: IcaEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn valid_session() -> AuthState {
    let mut token = OAuthToken {
        id_token: None,
        token_type: "bearer".into(),
        access_token: "access-live".into(),
        refresh_token: "refresh-live".into(),
        scope: "openid shopping".into(),
        expires_in: 2_592_000,
        expiry: None,
    };
    token.stamp_expiry(Utc::now());
    AuthState {
        client: Some(OAuthClient {
            client_id: "client-1".into(),
            client_secret: "secret-1".into(),
            scope: "openid shopping".into(),
        }),
        token: Some(token),
        user: None,
    }
}

struct Env {
    auth: MockServer,
    api: MockServer,
    nutrition: MockServer,
    sink: Arc<RecordingSink>,
    _dirs: (TempDir, TempDir),
    coordinator: IcaCoordinator,
}

async fn build_env() -> Env {
    let auth = MockServer::start().await;
    let api = MockServer::start().await;
    let nutrition = MockServer::start().await;

    let cache_dir = tempfile::tempdir().unwrap();
    let config_dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::new();

    let authenticator = IcaAuthenticator::with_base_url(
        AuthCredentials::new("198001019999", "hunter2"),
        Some(valid_session()),
        &auth.uri(),
    )
    .unwrap();
    let api_client = IcaApi::with_base_url(&api.uri()).unwrap();
    let nutrition_client = NutritionClient::with_base_url(&nutrition.uri()).unwrap();

    let config = CoordinatorConfig {
        uid: "acc-1".into(),
        tracked_lists: vec!["list-1".into()],
        cache_dir: cache_dir.path().to_path_buf(),
        config_dir: config_dir.path().to_path_buf(),
    };
    let coordinator = IcaCoordinator::with_clients(
        authenticator,
        api_client,
        nutrition_client,
        sink.clone() as Arc<dyn EventSink>,
        config,
    );

    Env {
        auth,
        api,
        nutrition,
        sink,
        _dirs: (cache_dir, config_dir),
        coordinator,
    }
}

fn tracked_list(rows: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "offlineId": "list-1",
        "title": "Veckohandling",
        "rows": rows,
    })
}

/// Mounts a complete, quiet vendor API for one account.
async fn mount_happy_api(env: &Env) {
    let api = &env.api;
    let base = "/sverige/digx/mobile";

    Mock::given(method("GET"))
        .and(path(format!("{base}/shoppinglistservice/v1/articles")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "articles": [{"id": 1, "name": "Mjölk", "parentId": 9}]
        })))
        .mount(api)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{base}/shoppinglistservice/v1/baseitems")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .mount(api)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{base}/bonusservice/v1/bonus/current")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "currentAmount": 120.5
        })))
        .mount(api)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{base}/shoppinglistservice/v1/shoppinglists")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "shoppingLists": [
                {"offlineId": "list-1", "title": "Veckohandling"},
                {"offlineId": "untracked", "title": "Annat"},
            ]
        })))
        .mount(api)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{base}/storeservice/v1/favorites")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "favoriteStores": [12]
        })))
        .mount(api)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{base}/storeservice/v1/stores/12")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 12, "marketingName": "ICA Kvantum"
        })))
        .mount(api)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{base}/offerservice/v1/offersdiscounts/12")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "storeId": 12,
            "offers": [{"id": "offer-1", "name": "Kaffe"}]
        })))
        .mount(api)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{base}/offerservice/v1/offers/search")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": "offer-1", "name": "Kaffe 500g", "eans": ["7310865004703"]}
        ])))
        .mount(api)
        .await;
}

// ============================================================================
// Happy Path
// ============================================================================

#[tokio::test]
async fn full_pass_populates_caches_and_emits_events() {
    let mut env = build_env().await;
    mount_happy_api(&env).await;

    // The first list snapshot has one row; the next pass sees two.
    Mock::given(method("GET"))
        .and(path(
            "/sverige/digx/mobile/shoppinglistservice/v1/shoppinglists/list-1",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(tracked_list(serde_json::json!([
            {"offlineId": "row-1", "productName": "Mjölk"}
        ]))))
        .up_to_n_times(1)
        .mount(&env.api)
        .await;
    Mock::given(method("GET"))
        .and(path(
            "/sverige/digx/mobile/shoppinglistservice/v1/shoppinglists/list-1",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(tracked_list(serde_json::json!([
            {"offlineId": "row-1", "productName": "Mjölk"},
            {"offlineId": "row-2", "productName": "Smör"}
        ]))))
        .mount(&env.api)
        .await;

    env.coordinator.refresh_data(None).await.unwrap();

    // Untracked lists are never fetched row-by-row.
    let lists = env.coordinator.tracked_shopping_lists().await;
    assert_eq!(lists.len(), 1);
    assert_eq!(lists[0].offline_id, "list-1");

    // Offer details come back reconciled from the search endpoint.
    let details = env.coordinator.offer_details().await;
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].name.as_deref(), Some("Kaffe 500g"));
    assert_eq!(
        env.coordinator
            .get_offer_info_full("offer-1")
            .await
            .unwrap()
            .eans,
        vec!["7310865004703".to_string()]
    );
    // The listing record (pre-reconciliation) is still reachable too.
    assert_eq!(
        env.coordinator
            .get_offer_info("offer-1")
            .await
            .unwrap()
            .name
            .as_deref(),
        Some("Kaffe")
    );

    // No auth traffic: the prior session token was still valid.
    assert!(env.auth.received_requests().await.unwrap().is_empty());
    assert!(env.nutrition.received_requests().await.unwrap().is_empty());

    // Second pass: only the forced resources refetch, and the changed list
    // produces a diff event.
    env.coordinator.refresh_data(None).await.unwrap();
    env.coordinator.worker().shutdown();

    assert_eq!(env.sink.of_type(EVENT_CURRENT_BONUS_LOADED).len(), 1);
    assert_eq!(env.sink.of_type(EVENT_OFFERS_CHANGED).len(), 1);
    assert_eq!(env.sink.of_type(EVENT_NEW_OFFERS).len(), 1);
    assert_eq!(env.sink.of_type(EVENT_PRODUCTS_CHANGED).len(), 1);

    let list_events = env.sink.of_type(EVENT_SHOPPING_LIST_UPDATED);
    assert_eq!(list_events.len(), 1);
    assert_eq!(
        list_events[0].payload["shopping_list_id"].as_str(),
        Some("list-1")
    );
    let diffs = list_events[0].payload["diffs"].as_array().unwrap();
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0]["op"].as_str(), Some("added"));
    assert_eq!(diffs[0]["key"].as_str(), Some("row-2"));
}

#[tokio::test]
async fn cold_offer_read_performs_no_fetch() {
    let env = build_env().await;

    // Nothing is mounted: reading the reconciled snapshot before any
    // refresh pass must stay local and come back empty.
    assert!(env.coordinator.offer_details().await.is_empty());
    assert!(env.coordinator.get_offer_info_full("offer-1").await.is_none());
    assert!(env.api.received_requests().await.unwrap().is_empty());
    assert!(env.auth.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn loaded_worker_emits_directly_during_pass() {
    let mut env = build_env().await;
    mount_happy_api(&env).await;
    Mock::given(method("GET"))
        .and(path(
            "/sverige/digx/mobile/shoppinglistservice/v1/shoppinglists/list-1",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(tracked_list(serde_json::json!([]))))
        .mount(&env.api)
        .await;

    env.coordinator.worker().mark_loaded();
    env.coordinator.refresh_data(None).await.unwrap();

    // Events arrive without any drain call.
    assert_eq!(env.sink.of_type(EVENT_CURRENT_BONUS_LOADED).len(), 1);
    assert_eq!(env.sink.of_type(EVENT_NEW_OFFERS).len(), 1);
}

// ============================================================================
// 401 Handling
// ============================================================================

/// Refresh grant mock for the auth server; the 401 path forces one.
async fn mount_token_refresh(env: &Env, times: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/v2/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "bearer",
                "access_token": "access-new",
                "refresh_token": "refresh-new",
                "expires_in": 2_592_000,
            })),
        )
        .expect(times)
        .mount(&env.auth)
        .await;
}

#[tokio::test]
async fn pass_retries_once_after_401() {
    let mut env = build_env().await;
    mount_token_refresh(&env, 1).await;

    // First articles call is rejected; everything after succeeds.
    Mock::given(method("GET"))
        .and(path("/sverige/digx/mobile/shoppinglistservice/v1/articles"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&env.api)
        .await;
    mount_happy_api(&env).await;
    Mock::given(method("GET"))
        .and(path(
            "/sverige/digx/mobile/shoppinglistservice/v1/shoppinglists/list-1",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(tracked_list(serde_json::json!([]))))
        .mount(&env.api)
        .await;

    env.coordinator.refresh_data(None).await.unwrap();
    assert_eq!(env.coordinator.tracked_shopping_lists().await.len(), 1);
}

#[tokio::test]
async fn persistent_401_surfaces_as_update_failed() {
    let mut env = build_env().await;
    mount_token_refresh(&env, 1).await;

    Mock::given(method("GET"))
        .and(path("/sverige/digx/mobile/shoppinglistservice/v1/articles"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&env.api)
        .await;

    let err = env.coordinator.refresh_data(None).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::UpdateFailed(_)));
}

#[tokio::test]
async fn non_auth_error_fails_without_token_refresh() {
    let mut env = build_env().await;

    Mock::given(method("GET"))
        .and(path("/sverige/digx/mobile/shoppinglistservice/v1/articles"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&env.api)
        .await;

    let err = env.coordinator.refresh_data(None).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::UpdateFailed(_)));
    // No forced token refresh for a 500.
    assert!(env.auth.received_requests().await.unwrap().is_empty());
}
