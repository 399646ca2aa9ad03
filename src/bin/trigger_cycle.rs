//! One-shot collection run: force a cycle, wait for it to settle, print a digest.
//!
//! Usage: `trigger_cycle [wait_secs]` (default 120).

use std::time::Duration;

use ai_news_alert::notify::format::trend_marker;
use ai_news_alert::{Collaborators, NewsPipeline, PipelineConfig};
use anyhow::Context;

const DEFAULT_WAIT_SECS: u64 = 120;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let wait = std::env::args()
        .nth(1)
        .map(|s| s.parse::<u64>().context("wait_secs must be a number"))
        .transpose()?
        .unwrap_or(DEFAULT_WAIT_SECS);

    let config = PipelineConfig::load_default().context("loading pipeline config")?;
    let collaborators = Collaborators::from_env(&config)?;
    let pipeline = NewsPipeline::launch(config, collaborators)?;

    let outcome = pipeline.start_collection(true).await?;
    println!("cycle {} started", outcome.token());

    if !pipeline.wait_idle(Duration::from_secs(wait)).await {
        println!("cycle still running after {wait}s; reporting what finished");
    }

    let items = pipeline.get_summary(20, None, None);
    println!("{} item(s)", items.len());
    for e in &items {
        println!(
            "{} [{}] {} ({})",
            trend_marker(e.trend),
            e.category,
            e.title,
            e.source
        );
    }

    let status = pipeline.get_status();
    if status.dead_letters > 0 {
        println!("{} dead letter(s); see GET /dead-letters", status.dead_letters);
    }

    pipeline.shutdown().await?;
    Ok(())
}
