//! Message rendering for delivery channels.

use chrono::{DateTime, Utc};
use html_escape::encode_text;

use crate::history::HistoryEntry;
use crate::model::{CategorizedNews, TrendLevel};
use crate::notify::OutboundMessage;

/// Telegram's per-message limit, in characters.
pub const TELEGRAM_MAX_CHARS: usize = 4096;

pub fn trend_marker(level: TrendLevel) -> &'static str {
    match level {
        TrendLevel::High => "🔥",
        TrendLevel::Medium => "📈",
        TrendLevel::Low => "📉",
    }
}

pub fn render(news: &CategorizedNews) -> OutboundMessage {
    OutboundMessage {
        subject: format!("AI 뉴스: {}", news.analyzed().title()),
        text: render_text(news),
        html: Some(render_html(news)),
    }
}

pub fn render_text(news: &CategorizedNews) -> String {
    let a = news.analyzed();
    let mut parts = vec![
        "🤖 *AI 뉴스 알림*".to_string(),
        String::new(),
        format!("📰 *제목*: {}", a.title()),
        format!("🏷️ 카테고리: {}", news.category()),
        format!(
            "📈 트렌드 레벨: {} {}",
            trend_marker(news.trend()),
            news.trend().as_str().to_uppercase()
        ),
        String::new(),
        "📋 *요약*:".to_string(),
        a.summary().to_string(),
    ];

    if !a.key_points().is_empty() {
        parts.push(String::new());
        parts.push("🔑 *주요 포인트*:".to_string());
        for (i, p) in a.key_points().iter().take(3).enumerate() {
            parts.push(format!("{}. {p}", i + 1));
        }
    }
    if !news.tags().is_empty() {
        parts.push(String::new());
        let tags: Vec<&str> = news.tags().iter().take(5).map(String::as_str).collect();
        parts.push(format!("🏷️ 태그: {}", tags.join(", ")));
    }

    parts.push(String::new());
    parts.push(format!("🔗 [원문 기사]({})", news.item().url()));
    parts.push(String::new());
    parts.push(format!(
        "📊 중요도: {:.2} | AI 관련성: {:.2}",
        a.importance(),
        a.ai_relevance()
    ));
    parts.join("\n")
}

pub fn render_html(news: &CategorizedNews) -> String {
    let a = news.analyzed();
    let mut html = String::from("<html><body>");
    html.push_str(&format!("<h2>{}</h2>", encode_text(a.title())));
    html.push_str(&format!(
        "<p><strong>카테고리:</strong> {} &middot; <strong>트렌드:</strong> {} {}</p>",
        encode_text(news.category()),
        trend_marker(news.trend()),
        news.trend().as_str().to_uppercase()
    ));
    for line in a.summary().lines() {
        html.push_str(&format!("<p>{}</p>", encode_text(line)));
    }
    if !a.key_points().is_empty() {
        html.push_str("<p><strong>주요 포인트:</strong></p><ul>");
        for p in a.key_points().iter().take(3) {
            html.push_str(&format!("<li>{}</li>", encode_text(p)));
        }
        html.push_str("</ul>");
    }
    html.push_str(&format!(
        "<p><a href=\"{}\">원문 기사</a></p>",
        html_escape::encode_double_quoted_attribute(news.item().url())
    ));
    html.push_str("</body></html>");
    html
}

/// Several items in one message, most important first.
pub fn render_digest(entries: &[HistoryEntry], at: DateTime<Utc>) -> OutboundMessage {
    let mut items: Vec<&HistoryEntry> = entries.iter().collect();
    items.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    let date = at.format("%Y년 %m월 %d일").to_string();

    let mut text = vec![format!("AI 뉴스 알림 - {date}"), "=".repeat(50)];
    let mut html = format!("<html><body><h2>🤖 AI 뉴스 다이제스트</h2><p>📅 {date}</p><hr>");

    for e in &items {
        let trend = e.trend.as_str().to_uppercase();
        text.push(String::new());
        text.push(format!("제목: {}", e.title));
        text.push(format!("카테고리: {} | 트렌드: {} {trend}", e.category, trend_marker(e.trend)));
        text.push(String::new());
        text.push("요약:".to_string());
        text.push(e.summary.clone());

        html.push_str(&format!("<h3>{}</h3>", encode_text(&e.title)));
        html.push_str(&format!(
            "<p><strong>카테고리:</strong> {} | <strong>트렌드:</strong> {} {trend}</p>",
            encode_text(&e.category),
            trend_marker(e.trend)
        ));
        html.push_str("<p><strong>요약:</strong><br>");
        let lines: Vec<String> = e.summary.lines().map(|l| encode_text(l).to_string()).collect();
        html.push_str(&lines.join("<br>"));
        html.push_str("</p>");

        if !e.key_points.is_empty() {
            text.push(String::new());
            text.push("주요 포인트:".to_string());
            html.push_str("<p><strong>주요 포인트:</strong></p><ul>");
            for p in e.key_points.iter().take(3) {
                text.push(format!("- {p}"));
                html.push_str(&format!("<li>{}</li>", encode_text(p)));
            }
            html.push_str("</ul>");
        }

        text.push(String::new());
        text.push(format!("원문 링크: {}", e.url));
        text.push("-".repeat(30));
        html.push_str(&format!(
            "<p><a href=\"{}\">📰 원문 기사 보기</a></p><hr>",
            html_escape::encode_double_quoted_attribute(&e.url)
        ));
    }

    text.extend([String::new(), "---".to_string(), "AI 뉴스 알림 서비스".to_string()]);
    html.push_str("<p><em>이 메일은 AI 뉴스 알림 서비스에서 자동으로 발송되었습니다.</em></p></body></html>");

    OutboundMessage {
        subject: format!("AI 뉴스 다이제스트 - {date}"),
        text: text.join("\n"),
        html: Some(html),
    }
}

pub fn test_message() -> OutboundMessage {
    OutboundMessage {
        subject: "AI 뉴스 알림 테스트".to_string(),
        text: "🤖 *AI 뉴스 알림*\n\n테스트 메시지입니다. 알림 채널이 정상적으로 연결되었습니다.".to_string(),
        html: None,
    }
}

/// Split on line boundaries so every part fits `max` chars. A single line
/// longer than `max` is hard-split.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    let max = max.max(1);
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let mut line: String = line.to_string();
        let mut line_len = line.chars().count();

        while line_len > max {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current).trim_end().to_string());
                current_len = 0;
            }
            let head: String = line.chars().take(max).collect();
            line = line.chars().skip(max).collect();
            line_len -= max;
            parts.push(head);
        }

        // +1 for the newline joining it to `current`
        if current_len + line_len + 1 > max && !current.is_empty() {
            parts.push(std::mem::take(&mut current).trim_end().to_string());
            current_len = 0;
        }
        current.push_str(&line);
        current.push('\n');
        current_len += line_len + 1;
    }
    let tail = current.trim_end();
    if !tail.is_empty() {
        parts.push(tail.to_string());
    }
    parts
}
