//! Category catalog: weighted keyword sets, selection and tag generation.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

/// Generic tags appended after category keywords.
const TECH_TAGS: &[&str] = &["AI", "인공지능", "innovation", "혁신"];
const MAX_CATEGORY_TAGS: usize = 5;
const MAX_TAGS: usize = 8;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    /// term -> weight, in configured order
    #[serde(default)]
    pub keywords: Keywords,
}

/// Weighted terms in the order they were configured. A repeated term keeps
/// its first position and takes the last weight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Keywords(Vec<(String, f32)>);

impl Keywords {
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(k, w)| (k.as_str(), *w))
    }

    pub fn weight(&self, term: &str) -> Option<f32> {
        self.0.iter().find(|(k, _)| k == term).map(|(_, w)| *w)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn insert(&mut self, term: String, weight: f32) {
        match self.0.iter_mut().find(|(k, _)| *k == term) {
            Some(slot) => slot.1 = weight,
            None => self.0.push((term, weight)),
        }
    }
}

impl FromIterator<(String, f32)> for Keywords {
    fn from_iter<I: IntoIterator<Item = (String, f32)>>(iter: I) -> Self {
        let mut out = Keywords::default();
        for (k, w) in iter {
            out.insert(k, w);
        }
        out
    }
}

impl<'de> Deserialize<'de> for Keywords {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeywordsVisitor;

        impl<'de> Visitor<'de> for KeywordsVisitor {
            type Value = Keywords;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of term = weight")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Keywords, A::Error> {
                let mut out = Keywords::default();
                while let Some((term, weight)) = map.next_entry::<String, f32>()? {
                    out.insert(term, weight);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_map(KeywordsVisitor)
    }
}

impl Category {
    /// Sum of weights of keywords present in `lower_text` (already lowercased).
    fn score(&self, lower_text: &str) -> f32 {
        self.keywords
            .iter()
            .filter(|(k, _)| lower_text.contains(&k.to_lowercase()))
            .map(|(_, w)| w)
            .sum()
    }
}

/// Outcome of `CategoryCatalog::classify`.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category_id: String,
    pub category_name: String,
    pub score: f32,
    pub tags: Vec<String>,
}

/// Ordered list of categories. Order matters: it breaks score ties.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryCatalog {
    categories: Vec<Category>,
}

impl CategoryCatalog {
    /// Empty catalogs fall back to the built-in one.
    pub fn new(categories: Vec<Category>) -> Self {
        if categories.is_empty() {
            return Self::default();
        }
        Self { categories }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Highest-scoring category over `title + summary`; the first listed wins ties.
    pub fn classify(&self, title: &str, summary: &str) -> Classification {
        let text = format!("{title} {summary}").to_lowercase();

        let mut best_idx = 0usize;
        let mut best_score = f32::MIN;
        for (i, c) in self.categories.iter().enumerate() {
            let s = c.score(&text);
            // strict > keeps the earlier category on ties
            if s > best_score {
                best_idx = i;
                best_score = s;
            }
        }

        let winner = &self.categories[best_idx];
        Classification {
            category_id: winner.id.clone(),
            category_name: winner.name.clone(),
            score: best_score.max(0.0),
            tags: self.tags(&text, best_idx),
        }
    }

    fn tags(&self, lower_text: &str, winner: usize) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        'outer: for (i, c) in self.categories.iter().enumerate() {
            if i == winner {
                continue;
            }
            for (k, _) in c.keywords.iter() {
                if lower_text.contains(&k.to_lowercase()) && !tags.iter().any(|t| t == k) {
                    tags.push(k.to_string());
                    if tags.len() >= MAX_CATEGORY_TAGS {
                        break 'outer;
                    }
                }
            }
        }
        for t in TECH_TAGS {
            if tags.len() >= MAX_TAGS {
                break;
            }
            if lower_text.contains(&t.to_lowercase()) && !tags.iter().any(|x| x == t) {
                tags.push((*t).to_string());
            }
        }
        tags
    }
}

/// Longer phrases weigh more: (words * 0.5 + 0.5) scaled by the category weight.
fn weighted(category_weight: f32, terms: &[&str]) -> Keywords {
    terms
        .iter()
        .map(|t| {
            let words = t.split_whitespace().count() as f32;
            ((*t).to_string(), (words * 0.5 + 0.5) * category_weight)
        })
        .collect()
}

fn category(id: &str, name: &str, weight: f32, terms: &[&str]) -> Category {
    Category {
        id: id.to_string(),
        name: name.to_string(),
        keywords: weighted(weight, terms),
    }
}

impl Default for CategoryCatalog {
    fn default() -> Self {
        Self {
            categories: vec![
                category("ml", "머신러닝", 1.0, &[
                    "머신러닝", "machine learning", "ML", "알고리즘", "algorithm", "모델", "model",
                ]),
                category("dl", "딥러닝", 1.2, &[
                    "딥러닝", "deep learning", "DL", "신경망", "neural network", "CNN", "RNN",
                    "Transformer",
                ]),
                category("nlp", "자연어처리", 1.1, &[
                    "자연어처리", "NLP", "natural language processing", "언어 모델",
                    "language model", "GPT", "LLM", "대규모 언어 모델", "챗봇", "chatbot",
                ]),
                category("cv", "컴퓨터비전", 1.0, &[
                    "컴퓨터비전", "computer vision", "CV", "이미지 인식", "image recognition",
                    "객체 탐지", "object detection",
                ]),
                category("robotics", "로보틱스", 0.9, &[
                    "로보틱스", "robotics", "로봇", "robot", "자율주행", "autonomous", "드론", "drone",
                ]),
                category("enterprise", "기업 동향", 0.8, &[
                    "기업", "company", "투자", "investment", "인수", "acquisition", "출시", "launch",
                    "실적", "earnings",
                ]),
                category("research", "연구 개발", 0.9, &[
                    "연구", "research", "개발", "development", "논문", "paper", "발표",
                    "presentation", "실험", "experiment",
                ]),
                category("ethics", "AI 윤리", 1.0, &[
                    "윤리", "ethics", "안전", "safety", "규제", "regulation", "정책", "policy",
                    "편향", "bias",
                ]),
                category("generative", "생성 AI", 1.3, &[
                    "생성 AI", "generative AI", "생성형", "Stable Diffusion", "DALL-E",
                    "Midjourney", "이미지 생성", "text-to-image",
                ]),
                category("hardware", "AI 하드웨어", 0.9, &[
                    "GPU", "CPU", "칩", "chip", "반도체", "semiconductor", "NVIDIA", "TPU",
                    "하드웨어", "hardware",
                ]),
            ],
        }
    }
}
