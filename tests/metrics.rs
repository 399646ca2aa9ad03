// tests/metrics.rs
//
// The Prometheus recorder is process-global, so this file holds a single test.

mod common;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use ai_news_alert::metrics::Metrics;
use ai_news_alert::notify::Channel;
use common::*;

#[tokio::test]
async fn metrics_endpoint_contains_pipeline_series() {
    let metrics = Metrics::init(64).expect("first recorder install");
    assert!(Metrics::init(64).is_err(), "second install must fail, not panic");

    let fetcher = FixtureFetcher::default().with(
        "wire",
        vec![
            doc("AI chip demand soars", "Wire", "https://wire.test/m1", "en"),
            doc("AI chip demand soars!", "Wire", "https://wire.test/m2", "en"),
        ],
    );
    let h = launch(fast_config(vec![source("wire", "en")]), fetcher);
    h.pipeline.subscribe(Channel::Telegram, "9").await.unwrap();
    run_cycle(&h.pipeline).await;
    // back-to-back triggers: the second one is coalesced
    h.pipeline.start_collection(false).await.unwrap();
    h.pipeline.start_collection(false).await.unwrap();
    assert!(h.pipeline.wait_idle(WAIT).await);

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body = body::to_bytes(resp.into_body(), 1_048_576).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    for needle in [
        "broker_published_total",
        "broker_queue_depth",
        "broker_queue_capacity",
        "stage_processed_total",
        "dedup_suppressed_total",
        "cycles_started_total",
        "cycles_coalesced_total",
        "deliveries_total",
    ] {
        assert!(text.contains(needle), "missing series {needle}");
    }
}
