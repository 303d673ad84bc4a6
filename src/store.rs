// src/store.rs - Abstract persistence collaborator consumed by the engine
//
// The engine never talks to a database directly; it depends on this trait.
// The Postgres implementation lives in `db.rs`, an in-memory double for
// orchestrator tests lives behind `#[cfg(test)]` below.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;

use crate::models::{
    AvailabilitySlot, MatchId, MatchStatus, PatientId, TherapistCandidate, TherapistId,
};

/// Filter criteria for the therapist pool read. Verified status is implied;
/// city and modality narrow the pool when present.
#[derive(Debug, Clone, Default)]
pub struct TherapistPoolFilter {
    pub city: Option<String>,
    pub modality: Option<String>,
}

/// One match row to create or refresh. Safe to apply twice for the same
/// (patient, therapist) pair without producing two rows.
#[derive(Debug, Clone)]
pub struct MatchUpsert {
    pub patient_id: PatientId,
    pub therapist_id: TherapistId,
    pub status: MatchStatus,
    pub secure_token: String,
    pub metadata: serde_json::Value,
}

/// Result of an upsert: the row id and whether a new row was inserted (false
/// means the pair already existed and was refreshed).
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub match_id: MatchId,
    pub inserted: bool,
}

/// Persistence operations the engine depends on. All reads are snapshots;
/// the upsert is the idempotency boundary for concurrent orchestration runs.
pub trait MatchStore: Send + Sync {
    /// Fetch verified, visible therapists matching the filter.
    fn fetch_therapist_pool(
        &self,
        filter: &TherapistPoolFilter,
    ) -> impl Future<Output = Result<Vec<TherapistCandidate>>> + Send;

    /// Fetch active availability slots for the given therapists, keyed by
    /// therapist id. Therapists without slots are simply absent.
    fn fetch_active_slots(
        &self,
        therapist_ids: &[TherapistId],
    ) -> impl Future<Output = Result<HashMap<TherapistId, Vec<AvailabilitySlot>>>> + Send;

    /// Count matches the patient initiated directly since the cutoff.
    fn count_recent_patient_initiated(
        &self,
        patient_id: &PatientId,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Create or refresh the match row for (patient, therapist). A
    /// duplicate-key conflict is not an error: it reports `inserted: false`.
    fn upsert_match(
        &self,
        upsert: &MatchUpsert,
    ) -> impl Future<Output = Result<UpsertOutcome>> + Send;

    /// Transition a match row from one of `from` to `to`. Returns whether a
    /// row actually transitioned, so callers can reject invalid lifecycle
    /// moves without a separate read.
    fn update_match_status(
        &self,
        id: &MatchId,
        from: &[MatchStatus],
        to: MatchStatus,
    ) -> impl Future<Output = Result<bool>> + Send;
}
