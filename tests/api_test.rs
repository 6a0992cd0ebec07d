use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::NaiveDate;
use oil_regime::server::create_router;
use oil_regime::storage::{open_store, InMemoryStore, Store};
use oil_regime::types::{Forecast, GoldFeature, RegimeState};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn week(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

async fn seeded_store() -> Arc<dyn Store> {
    let store = Arc::new(InMemoryStore::new());
    store
        .upsert_features(&[
            GoldFeature { commodity: "wti".into(), week: week(1), feature_name: "price".into(), feature_value: 78.1 },
            GoldFeature { commodity: "wti".into(), week: week(8), feature_name: "price".into(), feature_value: 79.4 },
            GoldFeature { commodity: "wti".into(), week: week(8), feature_name: "inventory".into(), feature_value: 447.0 },
        ])
        .await
        .unwrap();
    store
        .upsert_regimes(&[
            RegimeState { commodity: "wti".into(), week: week(1), regime_label: "balanced".into(), regime_score: None },
            RegimeState { commodity: "wti".into(), week: week(8), regime_label: "tight_supply".into(), regime_score: Some(1.25) },
        ])
        .await
        .unwrap();
    store
        .upsert_forecasts(&[
            Forecast { commodity: "wti".into(), week: week(1), horizon_weeks: 4, forecast_value: 80.0 },
            Forecast { commodity: "wti".into(), week: week(8), horizon_weeks: 4, forecast_value: 81.5 },
        ])
        .await
        .unwrap();
    store
}

async fn get(store: Arc<dyn Store>, uri: &str) -> (StatusCode, Value) {
    let response = create_router(store)
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_is_ok() {
    let (status, body) = get(seeded_store().await, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn regime_returns_latest_week() {
    let (status, body) = get(seeded_store().await, "/regime/wti").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["commodity"], "wti");
    assert_eq!(body["week"], "2024-03-08");
    assert_eq!(body["regime_label"], "tight_supply");
    assert_eq!(body["regime_score"], 1.25);
}

#[tokio::test]
async fn regime_missing_commodity_is_404() {
    let (status, body) = get(seeded_store().await, "/regime/brent").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "No regime data found");
}

#[tokio::test]
async fn signals_are_newest_first_and_limited() {
    let (status, body) = get(seeded_store().await, "/signals/wti?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let signals = body["signals"].as_array().unwrap();
    assert_eq!(signals.len(), 2);
    assert_eq!(signals[0]["week"], "2024-03-08");
    assert_eq!(signals[0]["feature_name"], "inventory");
    assert_eq!(signals[1]["feature_name"], "price");

    let (_, body) = get(seeded_store().await, "/signals/wti").await;
    assert_eq!(body["signals"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn signals_limit_is_validated() {
    for uri in ["/signals/wti?limit=0", "/signals/wti?limit=5001", "/signals/wti?limit=abc"] {
        let (status, body) = get(seeded_store().await, uri).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
        assert!(body["detail"].is_string());
    }
    let (status, _) = get(seeded_store().await, "/signals/wti?limit=5000").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn signals_missing_commodity_is_404() {
    let (status, body) = get(seeded_store().await, "/signals/brent").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "No signals found");
}

#[tokio::test]
async fn forecast_defaults_to_four_weeks() {
    let (status, body) = get(seeded_store().await, "/forecasts/wti").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["horizon_weeks"], 4);
    assert_eq!(body["week"], "2024-03-08");
    assert_eq!(body["forecast_value"], 81.5);
}

#[tokio::test]
async fn forecast_unknown_horizon_is_404_and_zero_is_422() {
    let (status, body) = get(seeded_store().await, "/forecasts/wti?horizon_weeks=13").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], "No forecast found");

    let (status, _) = get(seeded_store().await, "/forecasts/wti?horizon_weeks=0").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn metrics_renders_after_recorder_install() {
    oil_regime::metrics::init_metrics();
    let store = seeded_store().await;
    let _ = get(store.clone(), "/health").await;
    let response = create_router(store)
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = String::from_utf8(hyper::body::to_bytes(response.into_body()).await.unwrap().to_vec()).unwrap();
    assert!(text.contains("oil_api_requests_total"));
}

#[tokio::test]
async fn store_errors_are_500_with_detail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("serving.db");
    let store = open_store(&format!("sqlite://{}", path.display())).await.unwrap();

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute(
        "INSERT INTO regime_states (commodity, week, regime_label) VALUES ('wti', 'not-a-date', 'balanced')",
        [],
    )
    .unwrap();
    drop(conn);

    let (status, body) = get(store, "/regime/wti").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("not-a-date"), "{detail}");
}
