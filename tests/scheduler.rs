// tests/scheduler.rs
//
// Cycle triggering: coalescing, forcing, cancellation and the timer.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use ai_news_alert::cycle::TriggerOutcome;
use ai_news_alert::notify::Channel;
use ai_news_alert::scheduler::spawn_scheduler;
use common::*;

#[tokio::test]
async fn overlapping_trigger_is_coalesced_unless_forced() {
    let fetcher = FixtureFetcher::default()
        .with("kr", vec![doc("인공지능 뉴스", "국내일보", "https://kr.test/1", "ko")])
        .delayed(Duration::from_millis(300));
    let h = launch(fast_config(vec![source("kr", "ko")]), fetcher);

    let first = h.pipeline.start_collection(false).await.unwrap();
    assert!(first.started());

    let second = h.pipeline.start_collection(false).await.unwrap();
    assert_eq!(second, TriggerOutcome::Coalesced(first.token()));

    let forced = h.pipeline.start_collection(true).await.unwrap();
    assert!(forced.started());
    assert_ne!(forced.token(), first.token());
    assert_eq!(h.pipeline.get_status().cycle, Some(forced.token()));

    assert!(h.pipeline.wait_idle(WAIT).await);
    // once idle, a plain trigger opens a new cycle again
    assert!(h.pipeline.start_collection(false).await.unwrap().started());
    assert!(h.pipeline.wait_idle(WAIT).await);
}

#[tokio::test]
async fn cancelled_cycle_output_is_dropped_downstream() {
    let fetcher = FixtureFetcher::default()
        .with("kr", vec![doc("AI 반도체 수출 증가", "국내일보", "https://kr.test/2", "ko")])
        .delayed(Duration::from_millis(200));
    let h = launch(fast_config(vec![source("kr", "ko")]), fetcher);
    h.pipeline.subscribe(Channel::Telegram, "chat").await.unwrap();

    let outcome = h.pipeline.start_collection(false).await.unwrap();
    // the collector is mid-fetch; its handle() finishes but the output is dropped
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.pipeline.cancel_cycle(), Some(outcome.token()));

    assert!(h.pipeline.wait_idle(WAIT).await);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
    assert!(h.pipeline.history().is_empty());
    assert_eq!(h.telegram.count(), 0);
    // cancellation is not a failure
    assert_eq!(h.pipeline.get_status().dead_letters, 0);
    assert_eq!(h.pipeline.get_status().cycle, None);
}

#[tokio::test]
async fn timer_triggers_repeatedly() {
    let h = launch(fast_config(vec![source("kr", "ko")]), FixtureFetcher::default());
    let handle = spawn_scheduler(h.pipeline.clone(), Some(Duration::from_millis(40)))
        .expect("timer enabled");

    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.abort();
    assert!(h.fetcher.calls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn zero_interval_disables_the_timer() {
    let h = launch(fast_config(vec![]), FixtureFetcher::default());
    assert!(spawn_scheduler(h.pipeline.clone(), h.pipeline.config().scheduler_interval()).is_none());
}

#[tokio::test]
async fn timer_exits_after_shutdown() {
    let h = launch(fast_config(vec![]), FixtureFetcher::default());
    h.pipeline.shutdown().await.unwrap();
    let handle = spawn_scheduler(h.pipeline.clone(), Some(Duration::from_millis(10))).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("scheduler loop ended")
        .unwrap();
}
