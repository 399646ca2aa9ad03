// tests/pipeline_flow.rs
//
// End-to-end flows through the full pipeline with mock collaborators.
//
// Covered:
// - domestic items never pass through the translator
// - foreign items are translated before analysis
// - duplicate documents yield exactly one CategorizedNews, by title or by item id
// - fan-out: one item, 2 telegram + 1 email targets -> 3 deliveries
// - digest: recent items batched into one direct message per target

mod common;

use ai_news_alert::model::AnalysisSource;
use ai_news_alert::notify::Channel;
use common::*;

#[tokio::test]
async fn domestic_items_skip_translation_foreign_items_are_translated_first() {
    let fetcher = FixtureFetcher::default()
        .with("kr", vec![doc("인공지능 반도체 투자 확대", "국내일보", "https://kr.test/1", "ko")])
        .with("wire", vec![doc("OpenAI releases new GPT model", "Wire", "https://wire.test/1", "en")]);
    let h = launch(fast_config(vec![source("kr", "ko"), source("wire", "en")]), fetcher);
    h.pipeline.subscribe(Channel::Telegram, "chat-1").await.unwrap();

    run_cycle(&h.pipeline).await;

    let news = h.telegram.news.lock().unwrap().clone();
    assert_eq!(news.len(), 2);
    for n in &news {
        match n.analyzed().source() {
            AnalysisSource::Original(item) => assert_eq!(item.language(), "ko"),
            AnalysisSource::Translated(t) => {
                assert_eq!(t.original().language(), "en");
                // the analyzer saw the translated text, not the original
                assert!(n.analyzed().title().starts_with("[en->ko]"));
            }
        }
    }
    assert!(news.iter().any(|n| n.analyzed().source().is_translated()));
    assert!(news.iter().any(|n| !n.analyzed().source().is_translated()));

    let from = h.translator.from.lock().unwrap().clone();
    assert!(!from.is_empty());
    assert!(from.iter().all(|l| l == "en"), "translator saw {from:?}");

    let summary = h.pipeline.get_summary(10, None, None);
    assert_eq!(summary.len(), 2);
    assert_eq!(summary.iter().filter(|e| e.translated).count(), 1);
}

#[tokio::test]
async fn identical_fingerprints_yield_one_categorized_news() {
    let fetcher = FixtureFetcher::default().with(
        "wire",
        vec![
            doc("GPT-5 launch date confirmed", "Wire", "https://wire.test/a", "en"),
            doc("GPT-5 launch date confirmed!", "Wire", "https://wire.test/a?ref=rss", "en"),
        ],
    );
    let h = launch(fast_config(vec![source("wire", "en")]), fetcher);
    h.pipeline.subscribe(Channel::Email, "ops@news.test").await.unwrap();

    run_cycle(&h.pipeline).await;
    assert_eq!(h.email.count(), 1);
    assert_eq!(h.pipeline.history().len(), 1);

    // still within the TTL on the next cycle
    run_cycle(&h.pipeline).await;
    assert_eq!(h.email.count(), 1);
    assert_eq!(h.pipeline.get_status().dedup_entries, 2);
}

#[tokio::test]
async fn edited_title_under_same_url_yields_one_categorized_news() {
    let fetcher = FixtureFetcher::default().with(
        "wire",
        vec![
            doc("OpenAI ships GPT-5", "Wire", "https://wire.test/a", "en"),
            doc("OpenAI ships GPT-5 (updated)", "Wire", "https://wire.test/a", "en"),
        ],
    );
    let h = launch(fast_config(vec![source("wire", "en")]), fetcher);
    h.pipeline.subscribe(Channel::Email, "ops@news.test").await.unwrap();

    run_cycle(&h.pipeline).await;
    let ids: Vec<String> = h.email.delivered.lock().unwrap().iter().map(|(_, id)| id.clone()).collect();
    assert_eq!(ids.len(), 1, "delivered ids: {ids:?}");
    assert_eq!(h.pipeline.history().len(), 1);
}

#[tokio::test]
async fn one_item_fans_out_to_every_target() {
    let fetcher = FixtureFetcher::default()
        .with("kr", vec![doc("생성형 AI 서비스 출시", "국내일보", "https://kr.test/7", "ko")]);
    let h = launch(fast_config(vec![source("kr", "ko")]), fetcher);
    h.pipeline.subscribe(Channel::Telegram, "100").await.unwrap();
    h.pipeline.subscribe(Channel::Telegram, "200").await.unwrap();
    h.pipeline.subscribe(Channel::Email, "team@news.test").await.unwrap();

    run_cycle(&h.pipeline).await;

    assert_eq!(h.telegram.count() + h.email.count(), 3);
    let mut tg: Vec<String> = h.telegram.delivered.lock().unwrap().iter().map(|(t, _)| t.clone()).collect();
    tg.sort();
    assert_eq!(tg, vec!["100".to_string(), "200".to_string()]);

    // an unsubscribed target no longer receives anything
    h.pipeline.unsubscribe(Channel::Telegram, "200").await.unwrap();
    h.fetcher.set("kr", vec![doc("AI 규제 정책 발표", "국내일보", "https://kr.test/8", "ko")]);
    run_cycle(&h.pipeline).await;
    assert_eq!(h.telegram.count(), 3);
    assert_eq!(h.email.count(), 2);
}

#[tokio::test]
async fn source_toggles_limit_collection() {
    let fetcher = FixtureFetcher::default()
        .with("kr", vec![doc("인공지능 로봇 공개", "국내일보", "https://kr.test/3", "ko")])
        .with("wire", vec![doc("AI robotics startup raises funds", "Wire", "https://wire.test/3", "en")]);
    let h = launch(fast_config(vec![source("kr", "ko"), source("wire", "en")]), fetcher);

    let state = h.pipeline.configure_sources(None, Some(false));
    assert!(state.domestic && !state.international);

    run_cycle(&h.pipeline).await;
    let entries = h.pipeline.get_summary(10, None, None);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].language, "ko");
    assert!(h.translator.from.lock().unwrap().is_empty());
}

#[tokio::test]
async fn send_test_reaches_each_target_directly() {
    let h = launch(fast_config(vec![]), FixtureFetcher::default());
    h.pipeline.subscribe(Channel::Telegram, "1").await.unwrap();
    h.pipeline.subscribe(Channel::Telegram, "2").await.unwrap();

    let res = h.pipeline.send_test(Channel::Telegram).await.unwrap();
    assert_eq!(res.len(), 2);
    assert!(res.iter().all(|r| r.ok));
    assert_eq!(h.telegram.tests.load(std::sync::atomic::Ordering::SeqCst), 2);
    // no pipeline traffic for test messages
    assert_eq!(h.telegram.count(), 0);
}

#[tokio::test]
async fn digest_batches_recent_items_into_one_message_per_target() {
    let fetcher = FixtureFetcher::default().with(
        "kr",
        vec![
            doc("AI 반도체 수출 증가", "국내일보", "https://kr.test/20", "ko"),
            doc("생성형 AI 규제 논의", "국내일보", "https://kr.test/21", "ko"),
        ],
    );
    let h = launch(fast_config(vec![source("kr", "ko")]), fetcher);
    h.pipeline.subscribe(Channel::Email, "a@news.test").await.unwrap();
    h.pipeline.subscribe(Channel::Email, "b@news.test").await.unwrap();

    // nothing categorized yet: nothing sent
    assert!(h.pipeline.send_digest(Channel::Email, 10).await.unwrap().is_empty());

    run_cycle(&h.pipeline).await;
    assert_eq!(h.email.count(), 4);

    let res = h.pipeline.send_digest(Channel::Email, 10).await.unwrap();
    assert_eq!(res.len(), 2);
    assert!(res.iter().all(|r| r.ok));
    let direct = h.email.direct.lock().unwrap().clone();
    assert_eq!(direct.len(), 2);
    assert!(direct.iter().all(|(_, subject)| subject.starts_with("AI 뉴스 다이제스트 - ")));
    // the digest goes around the broker
    assert_eq!(h.email.count(), 4);
}
