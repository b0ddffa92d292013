//! # Source Weights
//!
//! Fixed per-origin base scores used by the popularity scorer.
//!
//! - Lookup is by *exact* source label (feeds and social accounts are configured
//!   with stable display names, so no fuzzy matching).
//! - Unknown sources fall back to the default weight (5.0).
//! - Social-origin sources are recognised by their label prefix (`"Twitter - "`).

use std::collections::HashMap;

use crate::config::ScoringConfig;

/// Exact-label weight table plus the social-origin prefix.
#[derive(Debug, Clone)]
pub struct SourceWeights {
    default_weight: f64,
    weights: HashMap<String, f64>,
    social_prefix: String,
}

impl SourceWeights {
    pub fn from_config(cfg: &ScoringConfig) -> Self {
        Self {
            default_weight: cfg.default_weight.max(0.0),
            weights: cfg
                .source_weights
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            social_prefix: cfg.social_prefix.clone(),
        }
    }

    /// Base score for a source label.
    pub fn weight_for(&self, source: &str) -> f64 {
        self.weights
            .get(source)
            .copied()
            .unwrap_or(self.default_weight)
    }

    /// True for posts collected from a social account.
    pub fn is_social(&self, source: &str) -> bool {
        !self.social_prefix.is_empty() && source.starts_with(&self.social_prefix)
    }

    pub fn default_weight(&self) -> f64 {
        self.default_weight
    }
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w() -> SourceWeights {
        SourceWeights::default()
    }

    #[test]
    fn exact_match() {
        assert!((w().weight_for("ITmedia AI+") - 7.0).abs() < 1e-9);
        assert!((w().weight_for("Twitter - みのるん") - 7.5).abs() < 1e-9);
    }

    #[test]
    fn lookup_is_case_sensitive_and_exact() {
        assert!((w().weight_for("itmedia ai+") - 5.0).abs() < 1e-9);
        assert!((w().weight_for("ITmedia AI+ extra") - 5.0).abs() < 1e-9);
    }

    #[test]
    fn default_weight_used() {
        let c = w();
        assert!((c.weight_for("TotallyUnknown") - c.default_weight()).abs() < 1e-9);
    }

    #[test]
    fn social_prefix_detection() {
        let c = w();
        assert!(c.is_social("Twitter - usutaku"));
        assert!(!c.is_social("Zenn AI"));
        assert!(!c.is_social("Twitter"));
    }
}
