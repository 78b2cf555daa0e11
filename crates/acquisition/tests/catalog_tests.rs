//! Tests for catalog search and the search locator against a loopback
//! catalog.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use acquisition::{CatalogClient, CatalogConfig, GranuleLocator, RetryPolicy, Retrying, SearchLocator};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use modis_common::{BoundingBox, DateSpec, PipelineError, Product, TileId};
use serde_json::Value;
use test_utils::fixtures::{catalog, granules};
use test_utils::FakeServer;

#[derive(Clone)]
struct CatalogState {
    status: StatusCode,
    body: Value,
    hits: Arc<AtomicUsize>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
}

impl CatalogState {
    fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body,
            hits: Arc::new(AtomicUsize::new(0)),
            queries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

async fn search(State(state): State<CatalogState>, Query(params): Query<HashMap<String, String>>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    state.queries.lock().unwrap().push(params);
    (state.status, Json(state.body.clone())).into_response()
}

async fn catalog_server(state: CatalogState) -> FakeServer {
    let router = Router::new()
        .route("/search/granules.json", get(search))
        .with_state(state);
    FakeServer::start(router).await
}

fn client(server: &FakeServer) -> CatalogClient {
    let config = CatalogConfig {
        url: server.url("search/granules.json"),
        timeout_secs: 5,
        ..CatalogConfig::default()
    };
    CatalogClient::new(config, Product::default()).unwrap()
}

fn href(name: &str) -> String {
    format!("https://data.lpdaac.earthdatacloud.nasa.gov/lp-prod-protected/MOD13Q1.061/{}", name)
}

fn bbox() -> BoundingBox {
    BoundingBox::new(79.5, 28.0, 80.5, 28.5).unwrap()
}

fn dates() -> DateSpec {
    DateSpec::range(
        NaiveDate::from_ymd_opt(2023, 7, 28).unwrap(),
        NaiveDate::from_ymd_opt(2023, 8, 12).unwrap(),
    )
    .unwrap()
}

// ============================================================================
// Query construction
// ============================================================================

#[tokio::test]
async fn test_query_parameters() {
    let state = CatalogState::new(StatusCode::OK, catalog::empty_feed());
    let server = catalog_server(state.clone()).await;

    let found = client(&server).search(&dates(), &bbox()).await.unwrap();
    assert!(found.is_empty());

    let queries = state.queries.lock().unwrap().clone();
    assert_eq!(queries.len(), 1);
    let q = &queries[0];
    assert_eq!(q["short_name"], granules::SHORT_NAME);
    assert_eq!(q["version"], granules::VERSION);
    assert_eq!(q["temporal"], "2023-07-28T00:00:00Z,2023-08-12T23:59:59Z");
    assert_eq!(q["bounding_box"], "79.5,28,80.5,28.5");
    assert_eq!(q["page_size"], "2000");
}

// ============================================================================
// Response handling
// ============================================================================

#[tokio::test]
async fn test_results_mapped_to_tiles() {
    let h25 = href(granules::H25V06_NAME);
    let h26 = href(granules::H26V06_NAME);
    let state = CatalogState::new(StatusCode::OK, catalog::feed(&[&h26, &h25]));
    let server = catalog_server(state).await;

    let found = client(&server).search(&dates(), &bbox()).await.unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(found[0].tile, TileId::new(25, 6).unwrap());
    assert_eq!(found[0].remote_url, h25);
    assert_eq!(found[0].local_filename, "MOD13Q1.A2023209.h25v06.061.hdf");
    assert_eq!(found[1].tile, TileId::new(26, 6).unwrap());
    assert_eq!(found[1].date, NaiveDate::from_ymd_opt(2023, 7, 28).unwrap());
}

#[tokio::test]
async fn test_server_error_is_catalog_error() {
    let state = CatalogState::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        serde_json::json!({ "errors": ["search unavailable"] }),
    );
    let server = catalog_server(state).await;

    let err = client(&server).search(&dates(), &bbox()).await.unwrap_err();

    match err {
        PipelineError::Catalog(msg) => {
            assert!(msg.contains("500"));
            assert!(msg.contains("search unavailable"));
        }
        other => panic!("expected catalog error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_catalog_error() {
    let state = CatalogState::new(StatusCode::OK, serde_json::json!({ "feed": { "entry": "nope" } }));
    let server = catalog_server(state).await;

    let err = client(&server).search(&dates(), &bbox()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Catalog(_)));
}

// ============================================================================
// Search locator
// ============================================================================

#[tokio::test]
async fn test_locate_all_issues_one_query() {
    let h25 = href(granules::H25V06_NAME);
    let h26 = href(granules::H26V06_NAME);
    let state = CatalogState::new(StatusCode::OK, catalog::feed(&[&h25, &h26]));
    let server = catalog_server(state.clone()).await;
    let locator = SearchLocator::new(client(&server));

    let tiles: BTreeSet<TileId> = [TileId::new(25, 6).unwrap(), TileId::new(26, 6).unwrap()]
        .into_iter()
        .collect();
    let found = locator.locate_all(&tiles, &dates(), &bbox()).await.unwrap();

    assert_eq!(found.len(), 2);
    assert_eq!(state.hits.load(Ordering::SeqCst), 1);
    assert_eq!(locator.name(), "search");
}

#[tokio::test]
async fn test_locate_filters_to_tile() {
    let h25 = href(granules::H25V06_NAME);
    let h26 = href(granules::H26V06_NAME);
    let state = CatalogState::new(StatusCode::OK, catalog::feed(&[&h25, &h26]));
    let server = catalog_server(state).await;
    let locator = SearchLocator::new(client(&server));

    let found = locator
        .locate(TileId::new(26, 6).unwrap(), &dates(), &bbox())
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].tile, TileId::new(26, 6).unwrap());
}

#[tokio::test]
async fn test_retrying_locator_retries_catalog_errors() {
    let state = CatalogState::new(StatusCode::BAD_GATEWAY, serde_json::json!({}));
    let server = catalog_server(state.clone()).await;
    let policy = RetryPolicy {
        max_retries: 2,
        initial_delay_ms: 1,
        max_delay_ms: 5,
    };
    let locator = Retrying::new(SearchLocator::new(client(&server)), policy);

    let tiles: BTreeSet<TileId> = [TileId::new(25, 6).unwrap()].into_iter().collect();
    let err = locator.locate_all(&tiles, &dates(), &bbox()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Catalog(_)));
    assert_eq!(state.hits.load(Ordering::SeqCst), 3);
}
