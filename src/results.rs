// src/results.rs - Orchestration outcome and stats types

use serde::Serialize;
use std::time::Duration;

use crate::models::{MatchQuality, MatchRecord};

/// Result of one instant-match orchestration run.
#[derive(Debug, Clone)]
pub struct InstantMatchOutcome {
    /// Created (or refreshed) match records, best candidate first.
    pub matches: Vec<MatchRecord>,
    pub quality: MatchQuality,
    pub stats: MatchingStats,
}

/// Per-run counters, logged by the runner and exported to monitoring.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchingStats {
    /// Pool size before eligibility filtering.
    pub candidates_total: usize,
    /// Candidates surviving the accepting/hidden filter.
    pub candidates_eligible: usize,
    /// Candidates skipped because they were not accepting or hidden.
    pub candidates_skipped: usize,
    /// Match rows newly inserted this run.
    pub matches_created: usize,
    /// Match rows that already existed and were refreshed.
    pub matches_reused: usize,
    /// Per-candidate writes that failed and were skipped.
    pub writes_failed: usize,
    #[serde(skip)]
    pub processing_time: Duration,
}
