//! # Popularity Scorer
//! Pure ranking of filtered items.
//!
//! ```text
//! score = source weight (default 5.0)
//!       + 2.0 per distinct high-importance keyword in lower(title + summary)
//!       + 1.0 per distinct medium-importance keyword
//!       + title length: +1.0 for 20..=80 chars, -0.5 above 100
//!       + summary length: +0.5 for 50..=200 chars, -1.0 below 20
//!       + 0.5 * pre-seeded score for social posts (when > 0)
//! clamped at 0.0
//! ```
//!
//! No I/O and no clock: identical input always yields identical output.

use crate::config::ScoringConfig;
use crate::ingest::types::Item;
use crate::source_weights::SourceWeights;

pub const HIGH_IMPORTANCE_BONUS: f64 = 2.0;
pub const MEDIUM_IMPORTANCE_BONUS: f64 = 1.0;
pub const SOCIAL_SCORE_FACTOR: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct PopularityScorer {
    weights: SourceWeights,
    high: Vec<String>,
    medium: Vec<String>,
}

impl PopularityScorer {
    pub fn from_config(cfg: &ScoringConfig) -> Self {
        Self {
            weights: SourceWeights::from_config(cfg),
            high: distinct_lowercase(&cfg.high_keywords),
            medium: distinct_lowercase(&cfg.medium_keywords),
        }
    }

    /// Score a single item from its fields only.
    pub fn score(&self, item: &Item) -> f64 {
        let mut score = self.weights.weight_for(&item.source);

        let text = format!("{} {}", item.title, item.summary).to_lowercase();
        let high_hits = self.high.iter().filter(|k| text.contains(k.as_str())).count();
        let medium_hits = self.medium.iter().filter(|k| text.contains(k.as_str())).count();
        score += HIGH_IMPORTANCE_BONUS * high_hits as f64;
        score += MEDIUM_IMPORTANCE_BONUS * medium_hits as f64;

        score += title_length_adjustment(item.title.chars().count());
        score += summary_length_adjustment(item.summary.chars().count());

        if self.weights.is_social(&item.source) && item.score > 0.0 {
            score += SOCIAL_SCORE_FACTOR * item.score;
        }

        score.max(0.0)
    }

    /// Assign scores and sort descending. `sort_by` is stable, so ties keep arrival order.
    pub fn score_and_rank(&self, mut items: Vec<Item>) -> Vec<Item> {
        for it in items.iter_mut() {
            it.score = self.score(it);
        }
        items.sort_by(|a, b| b.score.total_cmp(&a.score));
        items
    }
}

impl Default for PopularityScorer {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

fn title_length_adjustment(len: usize) -> f64 {
    if (20..=80).contains(&len) {
        1.0
    } else if len > 100 {
        -0.5
    } else {
        0.0
    }
}

fn summary_length_adjustment(len: usize) -> f64 {
    if (50..=200).contains(&len) {
        0.5
    } else if len < 20 {
        -1.0
    } else {
        0.0
    }
}

fn distinct_lowercase(words: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(words.len());
    for w in words {
        let w = w.trim().to_lowercase();
        if !w.is_empty() && !out.contains(&w) {
            out.push(w);
        }
    }
    out
}
