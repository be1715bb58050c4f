pub mod orchestrator;
pub mod user;

use crate::{ScanConfig, SuspicionReason};

/// OR-combination of the per-user thresholds. Any single signal suffices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuspicionRule {
    pub flagged_ratio: f64,
    pub duplicates: usize,
    pub variation_pairs: usize,
}

impl SuspicionRule {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            flagged_ratio: config.flagged_ratio_threshold,
            duplicates: config.duplicate_threshold,
            variation_pairs: config.variation_pair_threshold,
        }
    }

    /// Every signal that crossed its threshold; empty means not suspected.
    pub fn evaluate(
        &self,
        total: usize,
        flagged: usize,
        duplicates: usize,
        variation_pairs: usize,
    ) -> Vec<SuspicionReason> {
        let mut reasons = Vec::new();

        if total > 0 && flagged as f64 / total as f64 > self.flagged_ratio {
            reasons.push(SuspicionReason::FlaggedRatio { flagged, total });
        }

        if duplicates > self.duplicates {
            reasons.push(SuspicionReason::DuplicateImages { count: duplicates });
        }

        if variation_pairs > self.variation_pairs {
            reasons.push(SuspicionReason::SimilarVariations {
                pairs: variation_pairs,
            });
        }

        reasons
    }
}

impl Default for SuspicionRule {
    fn default() -> Self {
        Self::from_config(&ScanConfig::default())
    }
}
