// src/events.rs - Fire-and-forget notify/track side-effects
//
// The engine only builds payloads; delivery (email, analytics, CRM) is the
// sink's concern and is never awaited for correctness.

use log::info;
use serde::Serialize;

use crate::models::{MatchQuality, MismatchReason, PatientId, TherapistId};

/// Emitted after every orchestration run, carrying the mismatch-reason
/// aggregate across the selected candidates.
#[derive(Debug, Clone, Serialize)]
pub struct MatchSummaryEvent {
    pub patient_id: PatientId,
    pub match_type: MatchQuality,
    pub therapist_ids: Vec<TherapistId>,
    pub reasons: Vec<MismatchReason>,
}

/// Emitted when the selected candidates share unresolved mismatches: demand
/// the current therapist pool cannot serve.
#[derive(Debug, Clone, Serialize)]
pub struct BusinessOpportunityEvent {
    pub patient_id: PatientId,
    pub match_type: MatchQuality,
    pub therapist_ids: Vec<TherapistId>,
    pub reasons: Vec<MismatchReason>,
}

/// Side-effect sink. Implementations must not block the orchestration run;
/// failures are their own concern.
pub trait EventSink: Send + Sync {
    fn match_summary(&self, event: MatchSummaryEvent);
    fn business_opportunity(&self, event: BusinessOpportunityEvent);
}

/// Default sink used by the runner binary: structured log lines.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn match_summary(&self, event: MatchSummaryEvent) {
        info!(
            "Match summary computed: patient={}, quality={}, therapists={:?}, reasons={:?}",
            event.patient_id,
            event.match_type.as_str(),
            event.therapist_ids,
            event.reasons
        );
    }

    fn business_opportunity(&self, event: BusinessOpportunityEvent) {
        info!(
            "Business opportunity: patient={}, quality={}, unmet={:?}",
            event.patient_id,
            event.match_type.as_str(),
            event.reasons
        );
    }
}
