// tests/api_http.rs
//
// HTTP-level tests for the control surface Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

mod common;

use serde_json::json;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use ai_news_alert::api::{self, AppState};
use common::*;

const BODY_LIMIT: usize = 1024 * 1024;

fn test_router(h: &Harness) -> Router {
    api::router(AppState::new(h.pipeline.clone()))
}

async fn call(app: Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Json) {
    let mut req = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    let v = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

#[tokio::test]
async fn health_returns_ok() {
    let h = launch(fast_config(vec![]), FixtureFetcher::default());
    let resp = test_router(&h)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn collect_then_summary_round_trip() {
    let fetcher = FixtureFetcher::default()
        .with("kr", vec![doc("NVIDIA GPU 반도체 AI 칩 공개", "국내일보", "https://kr.test/9", "ko")]);
    let h = launch(fast_config(vec![source("kr", "ko")]), fetcher);

    let (status, v) = call(test_router(&h), "POST", "/collect", Some(json!({ "force": true }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["outcome"], "started");
    assert!(v["cycle"].is_string());
    assert!(h.pipeline.wait_idle(WAIT).await);

    let (status, v) = call(test_router(&h), "GET", "/summary?limit=5&category=hardware", None).await;
    assert_eq!(status, StatusCode::OK);
    let items = v.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["category"], "AI 하드웨어");
    assert!(items[0]["trend"].is_string());

    let (_, v) = call(test_router(&h), "GET", "/summary?category=AI%20%EC%9C%A4%EB%A6%AC", None).await;
    assert!(v.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn collect_without_body_is_unforced() {
    let h = launch(fast_config(vec![]), FixtureFetcher::default());
    let (status, v) = call(test_router(&h), "POST", "/collect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["outcome"], "started");
}

#[tokio::test]
async fn bad_trend_level_is_400() {
    let h = launch(fast_config(vec![]), FixtureFetcher::default());
    let (status, v) = call(test_router(&h), "GET", "/summary?trend_level=extreme", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(v["error"].as_str().unwrap().contains("extreme"));
}

#[tokio::test]
async fn subscriptions_add_and_remove() {
    let h = launch(fast_config(vec![]), FixtureFetcher::default());

    let sub = json!({ "channel": "telegram", "target": "12345" });
    let (status, v) = call(test_router(&h), "POST", "/subscriptions", Some(sub.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["changed"], true);

    let (_, v) = call(test_router(&h), "POST", "/subscriptions", Some(sub.clone())).await;
    assert_eq!(v["changed"], false);

    let (_, status_json) = call(test_router(&h), "GET", "/status", None).await;
    assert_eq!(status_json["subscribers"]["telegram"], 1);
    let stages = status_json["stages"].as_array().unwrap();
    assert!(stages.iter().any(|s| s["name"] == "deliver.telegram.12345" && s["class"] == "sender"));

    let (status, v) = call(test_router(&h), "DELETE", "/subscriptions", Some(sub)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["changed"], true);
    assert!(!h.pipeline.registry().contains("deliver.telegram.12345"));
}

#[tokio::test]
async fn unknown_channel_is_400() {
    let h = launch(fast_config(vec![]), FixtureFetcher::default());
    let (status, _) = call(
        test_router(&h),
        "POST",
        "/subscriptions",
        Some(json!({ "channel": "sms", "target": "1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(test_router(&h), "POST", "/test/pager", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_reports_stages_and_dead_letters() {
    let h = launch(fast_config(vec![]), FixtureFetcher::default());
    let (status, v) = call(test_router(&h), "GET", "/status", None).await;
    assert_eq!(status, StatusCode::OK);

    let names: Vec<&str> = v["stages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["name"].as_str().unwrap())
        .collect();
    for stage in ["analyzer", "categorizer", "collector", "translator"] {
        assert!(names.contains(&stage), "missing {stage}");
    }
    assert!(v["stages"][0]["queue_depth"].is_u64());
    assert_eq!(v["dead_letters"], 0);
    assert_eq!(v["sources"]["domestic"], true);
}

#[tokio::test]
async fn sources_toggle_and_test_send() {
    let h = launch(fast_config(vec![]), FixtureFetcher::default());
    let (status, v) = call(test_router(&h), "POST", "/sources", Some(json!({ "international": false }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v, json!({ "domestic": true, "international": false }));

    h.pipeline.subscribe(ai_news_alert::notify::Channel::Email, "a@b.test").await.unwrap();
    let (status, v) = call(test_router(&h), "POST", "/test/email", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v[0]["target"], "a@b.test");
    assert_eq!(v[0]["ok"], true);
}

#[tokio::test]
async fn digest_route_validates_channel_and_sends() {
    let fetcher = FixtureFetcher::default()
        .with("kr", vec![doc("AI 칩 신제품 발표", "국내일보", "https://kr.test/30", "ko")]);
    let h = launch(fast_config(vec![source("kr", "ko")]), fetcher);
    h.pipeline.subscribe(ai_news_alert::notify::Channel::Email, "d@b.test").await.unwrap();
    run_cycle(&h.pipeline).await;

    let (status, _) = call(test_router(&h), "POST", "/digest/pager", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, v) = call(test_router(&h), "POST", "/digest/email?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v[0]["target"], "d@b.test");
    assert_eq!(v[0]["parts"], 1);
    assert_eq!(h.email.direct.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn dead_letters_empty_and_cancel() {
    let h = launch(fast_config(vec![]), FixtureFetcher::default());
    let (status, v) = call(test_router(&h), "GET", "/dead-letters?stage=translator", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v, json!([]));

    let (status, v) = call(test_router(&h), "POST", "/collect/cancel", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(v["cancelled"].is_null());
}
