//! Batch scoring with per-item failure isolation

use crate::error::ScoringResult;
use crate::scorer::Scorer;
use crate::types::request::ReturnRequest;
use crate::types::score::ScoreResult;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Counts over a scored batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total_processed: usize,
    pub flagged_count: usize,
    pub failed_count: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[ScoringResult<ScoreResult>]) -> Self {
        outcomes.iter().fold(Self::default(), |mut summary, outcome| {
            summary.total_processed += 1;
            match outcome {
                Ok(result) if result.is_flagged => summary.flagged_count += 1,
                Ok(_) => {}
                Err(_) => summary.failed_count += 1,
            }
            summary
        })
    }
}

/// Fans a list of requests through the scorer.
#[derive(Clone)]
pub struct BatchCoordinator {
    scorer: Arc<Scorer>,
}

impl BatchCoordinator {
    pub fn new(scorer: Arc<Scorer>) -> Self {
        Self { scorer }
    }

    /// One outcome per request, in input order. A failing item never aborts
    /// its siblings.
    pub fn score_batch(&self, requests: &[ReturnRequest]) -> Vec<ScoringResult<ScoreResult>> {
        let outcomes: Vec<_> = requests.iter().map(|r| self.scorer.score(r)).collect();
        debug!(
            batch_size = requests.len(),
            failed = outcomes.iter().filter(|o| o.is_err()).count(),
            "Batch scored"
        );
        outcomes
    }

    /// Score pre-parsed items, passing parse failures through in place.
    pub fn score_parsed(
        &self,
        items: Vec<ScoringResult<ReturnRequest>>,
    ) -> Vec<ScoringResult<ScoreResult>> {
        items
            .into_iter()
            .map(|item| item.and_then(|request| self.scorer.score(&request)))
            .collect()
    }
}
