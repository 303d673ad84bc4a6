// src/matching/orchestrator.rs - Instant-match creation and patient contact flows

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::{debug, info, warn};
use serde_json::json;
use std::time::Instant;

use crate::config::MatchingConfig;
use crate::events::{BusinessOpportunityEvent, EventSink, MatchSummaryEvent};
use crate::matching::availability::has_matching_slot;
use crate::matching::mismatch::{self, MismatchSummary};
use crate::matching::rate_limit::{check_contact_allowed_with_limit, ContactRateDecision};
use crate::models::{
    MatchId, MatchQuality, MatchRecord, MatchStatus, MismatchReason, PatientId,
    PatientPreference, TherapistCandidate, TherapistId,
};
use crate::results::{InstantMatchOutcome, MatchingStats};
use crate::store::{MatchStore, MatchUpsert, TherapistPoolFilter};
use crate::utils::generate_secure_token;

/// One candidate after evaluation, before ranking.
struct ScoredCandidate<'a> {
    therapist: &'a TherapistCandidate,
    summary: MismatchSummary,
    /// Ordinal score for the instant path: minus the mismatch count. The
    /// full weighted scoring serves the match-detail ranking instead.
    score: i32,
    has_availability: bool,
}

/// Result of a patient-initiated contact attempt.
#[derive(Debug, Clone)]
pub struct ContactOutcome {
    pub decision: ContactRateDecision,
    /// Present iff the contact was allowed and persisted.
    pub match_id: Option<MatchId>,
}

/// Creates up to `config.max_instant_matches` match records for one patient,
/// exactly once per (patient, therapist) pair.
///
/// Availability is a tie-break, never a hard filter: a perfect fit with no
/// near-term slot still outranks a worse fit that happens to have one.
/// Failed reads abort the run; failed writes skip that candidate and
/// continue. If candidates were selected but every write failed, the run
/// errors so monitoring can tell it apart from "no eligible therapists".
pub async fn create_instant_matches<S, E>(
    store: &S,
    events: &E,
    config: &MatchingConfig,
    patient_id: &PatientId,
    preferences: &PatientPreference,
    filter: &TherapistPoolFilter,
    today: NaiveDate,
) -> Result<InstantMatchOutcome>
where
    S: MatchStore,
    E: EventSink,
{
    let start_time = Instant::now();
    let mut stats = MatchingStats::default();

    let pool = store
        .fetch_therapist_pool(filter)
        .await
        .context("Instant match: failed to fetch therapist pool")?;
    stats.candidates_total = pool.len();

    let eligible: Vec<&TherapistCandidate> = pool
        .iter()
        .filter(|t| t.accepts_new_patients() && !t.hidden)
        .collect();
    stats.candidates_eligible = eligible.len();
    stats.candidates_skipped = stats.candidates_total - stats.candidates_eligible;
    debug!(
        "Instant match: patient {}: {} candidates, {} eligible",
        patient_id, stats.candidates_total, stats.candidates_eligible
    );

    if eligible.is_empty() {
        stats.processing_time = start_time.elapsed();
        events.match_summary(MatchSummaryEvent {
            patient_id: patient_id.clone(),
            match_type: MatchQuality::None,
            therapist_ids: Vec::new(),
            reasons: Vec::new(),
        });
        return Ok(InstantMatchOutcome {
            matches: Vec::new(),
            quality: MatchQuality::None,
            stats,
        });
    }

    let eligible_ids: Vec<TherapistId> = eligible.iter().map(|t| t.id.clone()).collect();
    let slots_by_therapist = store
        .fetch_active_slots(&eligible_ids)
        .await
        .context("Instant match: failed to fetch availability slots")?;

    let mut scored: Vec<ScoredCandidate> = eligible
        .iter()
        .map(|therapist| {
            let summary = mismatch::evaluate(preferences, therapist);
            let slots = slots_by_therapist
                .get(&therapist.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            ScoredCandidate {
                score: -(summary.reasons.len() as i32),
                has_availability: has_matching_slot(
                    slots,
                    preferences.time_slots.as_deref(),
                    today,
                    config.lookahead_days,
                ),
                therapist,
                summary,
            }
        })
        .collect();

    // Stable sort: best fit first, availability breaks ties, remaining ties
    // keep the pool's input order for reproducibility.
    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(b.has_availability.cmp(&a.has_availability))
    });
    scored.truncate(config.max_instant_matches);

    let quality = match scored.first() {
        None => MatchQuality::None,
        Some(top) if top.summary.is_perfect() => MatchQuality::Exact,
        Some(_) => MatchQuality::Partial,
    };

    let secure_token = generate_secure_token();
    let mut matches = Vec::new();

    for candidate in &scored {
        let upsert = MatchUpsert {
            patient_id: patient_id.clone(),
            therapist_id: candidate.therapist.id.clone(),
            status: MatchStatus::Suggested,
            secure_token: secure_token.clone(),
            metadata: json!({
                "mismatch_reasons": candidate.summary.reasons,
                "instant_score": candidate.score,
                "has_availability": candidate.has_availability,
            }),
        };
        match store.upsert_match(&upsert).await {
            Ok(outcome) => {
                if outcome.inserted {
                    stats.matches_created += 1;
                } else {
                    stats.matches_reused += 1;
                }
                matches.push(MatchRecord {
                    id: outcome.match_id,
                    patient_id: patient_id.clone(),
                    therapist_id: candidate.therapist.id.clone(),
                    status: MatchStatus::Suggested,
                    secure_token: secure_token.clone(),
                    metadata: upsert.metadata.clone(),
                    created_at: Utc::now(),
                });
            }
            Err(e) => {
                stats.writes_failed += 1;
                warn!(
                    "Instant match: failed to persist match for patient {} / therapist {}: {}",
                    patient_id, candidate.therapist.id, e
                );
            }
        }
    }

    if matches.is_empty() {
        return Err(anyhow!(
            "Instant match: all {} match writes failed for patient {}",
            scored.len(),
            patient_id
        ));
    }

    let therapist_ids: Vec<TherapistId> =
        matches.iter().map(|m| m.therapist_id.clone()).collect();
    let reasons = aggregate_reasons(&scored);

    events.match_summary(MatchSummaryEvent {
        patient_id: patient_id.clone(),
        match_type: quality,
        therapist_ids: therapist_ids.clone(),
        reasons: reasons.clone(),
    });
    if !reasons.is_empty() {
        events.business_opportunity(BusinessOpportunityEvent {
            patient_id: patient_id.clone(),
            match_type: quality,
            therapist_ids,
            reasons,
        });
    }

    stats.processing_time = start_time.elapsed();
    info!(
        "Instant match: patient {}: {} matches ({} new, {} reused, {} failed), quality {}",
        patient_id,
        matches.len(),
        stats.matches_created,
        stats.matches_reused,
        stats.writes_failed,
        quality.as_str()
    );

    Ok(InstantMatchOutcome {
        matches,
        quality,
        stats,
    })
}

/// Records that a patient initiated direct contact with one therapist,
/// bounded by the rolling 24h contact limit. Denial is a regular outcome,
/// not an error.
pub async fn record_patient_contact<S: MatchStore>(
    store: &S,
    config: &MatchingConfig,
    patient_id: &PatientId,
    therapist_id: &TherapistId,
    now: DateTime<Utc>,
) -> Result<ContactOutcome> {
    let cutoff = now - Duration::hours(24);
    let recent = store
        .count_recent_patient_initiated(patient_id, cutoff)
        .await
        .context("Contact: failed to count recent patient-initiated matches")?;

    let decision = check_contact_allowed_with_limit(recent, config.daily_contact_limit);
    if !decision.allowed {
        info!(
            "Contact: patient {} over daily limit ({} in last 24h)",
            patient_id, decision.count
        );
        return Ok(ContactOutcome {
            decision,
            match_id: None,
        });
    }

    let upsert = MatchUpsert {
        patient_id: patient_id.clone(),
        therapist_id: therapist_id.clone(),
        status: MatchStatus::Proposed,
        secure_token: generate_secure_token(),
        metadata: json!({ "patient_initiated": true }),
    };
    let outcome = store
        .upsert_match(&upsert)
        .await
        .context("Contact: failed to persist patient-initiated match")?;

    Ok(ContactOutcome {
        decision,
        match_id: Some(outcome.match_id),
    })
}

/// Marks a suggested/proposed match as picked by the patient. Returns false
/// when the row is missing or already past that point in its lifecycle.
pub async fn select_match<S: MatchStore>(store: &S, match_id: &MatchId) -> Result<bool> {
    store
        .update_match_status(
            match_id,
            &[MatchStatus::Suggested, MatchStatus::Proposed],
            MatchStatus::PatientSelected,
        )
        .await
        .context("Select: failed to update match status")
}

/// Union of mismatch reasons across the selected candidates, in the fixed
/// gender/location/modality order.
fn aggregate_reasons(selected: &[ScoredCandidate]) -> Vec<MismatchReason> {
    [
        MismatchReason::Gender,
        MismatchReason::Location,
        MismatchReason::Modality,
    ]
    .into_iter()
    .filter(|reason| selected.iter().any(|c| c.summary.has(*reason)))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::CapturingSink;
    use crate::models::{
        AvailabilitySlot, Gender, GenderPreference, SessionFormat, SlotKind, TherapistProfile,
    };
    use crate::store::testing::MemoryStore;

    // 2025-06-02 is a Monday.
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn patient_id() -> PatientId {
        PatientId("p1".into())
    }

    fn therapist(id: &str, gender: Gender, modality: &str) -> TherapistCandidate {
        TherapistCandidate {
            id: TherapistId(id.into()),
            gender: Some(gender),
            city: Some("Berlin".into()),
            session_preferences: vec![SessionFormat::Online],
            modalities: vec![modality.into()],
            accepting_new: Some(true),
            hidden: false,
            profile: TherapistProfile::default(),
        }
    }

    fn berlin_online_narm_patient() -> PatientPreference {
        PatientPreference {
            city: Some("Berlin".into()),
            session_preference: Some(SessionFormat::Online),
            specializations: Some(vec!["narm".into()]),
            gender_preference: Some(GenderPreference::Female),
            ..Default::default()
        }
    }

    fn morning_slot(therapist: &str, day_of_week: u8) -> AvailabilitySlot {
        AvailabilitySlot {
            id: format!("slot-{}", therapist),
            therapist_id: TherapistId(therapist.into()),
            day_of_week: Some(day_of_week),
            time_local: "09:00".into(),
            format: SessionFormat::Online,
            kind: SlotKind::FullSession,
            active: true,
            is_recurring: true,
            specific_date: None,
            end_date: None,
        }
    }

    async fn run(
        store: &MemoryStore,
        sink: &CapturingSink,
        preferences: &PatientPreference,
    ) -> Result<InstantMatchOutcome> {
        create_instant_matches(
            store,
            sink,
            &MatchingConfig::default(),
            &patient_id(),
            preferences,
            &TherapistPoolFilter::default(),
            monday(),
        )
        .await
    }

    #[tokio::test]
    async fn test_end_to_end_ranking_and_quality() {
        let store = MemoryStore::with_pool(vec![
            therapist("t1", Gender::Female, "NARM"),
            therapist("t2", Gender::Male, "NARM"),
        ]);
        let sink = CapturingSink::default();
        let outcome = run(&store, &sink, &berlin_online_narm_patient())
            .await
            .unwrap();

        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.matches[0].therapist_id.0, "t1");
        assert_eq!(outcome.matches[1].therapist_id.0, "t2");
        // Quality is defined over the top-ranked candidate, which is perfect.
        assert_eq!(outcome.quality, MatchQuality::Exact);

        let stored = store.stored_matches();
        assert_eq!(stored.len(), 2);
        for row in &stored {
            assert_eq!(row.status, MatchStatus::Suggested);
        }
        // One shared token reveals the whole run.
        assert_eq!(stored[0].secure_token, stored[1].secure_token);

        let t2_row = stored.iter().find(|m| m.therapist_id.0 == "t2").unwrap();
        assert_eq!(
            t2_row.metadata["mismatch_reasons"],
            serde_json::json!(["gender"])
        );
    }

    #[tokio::test]
    async fn test_orchestration_is_idempotent() {
        let store = MemoryStore::with_pool(vec![
            therapist("t1", Gender::Female, "narm"),
            therapist("t2", Gender::Female, "hakomi"),
        ]);
        let sink = CapturingSink::default();
        let prefs = PatientPreference::default();

        let first = run(&store, &sink, &prefs).await.unwrap();
        let second = run(&store, &sink, &prefs).await.unwrap();

        assert_eq!(first.stats.matches_created, 2);
        assert_eq!(second.stats.matches_created, 0);
        assert_eq!(second.stats.matches_reused, 2);

        // Exactly one row per therapist, upserted twice, never duplicated.
        let stored = store.stored_matches();
        assert_eq!(stored.len(), 2);
        for row in &stored {
            assert_eq!(row.upsert_count, 2);
        }
    }

    #[tokio::test]
    async fn test_truncates_to_max_candidates() {
        let store = MemoryStore::with_pool(
            (1..=5)
                .map(|i| therapist(&format!("t{}", i), Gender::Female, "narm"))
                .collect(),
        );
        let sink = CapturingSink::default();
        let outcome = run(&store, &sink, &PatientPreference::default())
            .await
            .unwrap();

        assert_eq!(outcome.matches.len(), 3);
        // Ties keep pool order.
        let ids: Vec<_> = outcome.matches.iter().map(|m| m.therapist_id.0.clone()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn test_availability_is_tiebreak_not_filter() {
        let mut store = MemoryStore::with_pool(vec![
            // Perfect fit, no bookable slot in the horizon.
            therapist("t-perfect", Gender::Female, "narm"),
            // Worse fit (gender), but has a matching slot.
            therapist("t-available", Gender::Male, "narm"),
            // Equal fit to t-perfect, with a slot: availability breaks the tie.
            therapist("t-perfect-available", Gender::Female, "narm"),
        ]);
        store.slots.insert(
            TherapistId("t-available".into()),
            vec![morning_slot("t-available", 2)],
        );
        store.slots.insert(
            TherapistId("t-perfect-available".into()),
            vec![morning_slot("t-perfect-available", 2)],
        );

        let prefs = PatientPreference {
            gender_preference: Some(GenderPreference::Female),
            specializations: Some(vec!["narm".into()]),
            time_slots: Some(vec!["Morgens (8–12 Uhr)".into()]),
            ..Default::default()
        };
        let sink = CapturingSink::default();
        let outcome = run(&store, &sink, &prefs).await.unwrap();

        let ids: Vec<_> = outcome.matches.iter().map(|m| m.therapist_id.0.clone()).collect();
        // Fit dominates availability; within equal fit, availability wins;
        // the slotless perfect match still beats the available worse match.
        assert_eq!(ids, vec!["t-perfect-available", "t-perfect", "t-available"]);
    }

    #[tokio::test]
    async fn test_partial_write_failure_continues() {
        let mut store = MemoryStore::with_pool(vec![
            therapist("t1", Gender::Female, "narm"),
            therapist("t2", Gender::Female, "narm"),
            therapist("t3", Gender::Female, "narm"),
        ]);
        store.failing_writes.insert(TherapistId("t2".into()));

        let sink = CapturingSink::default();
        let outcome = run(&store, &sink, &PatientPreference::default())
            .await
            .unwrap();

        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.stats.writes_failed, 1);
        assert_eq!(outcome.quality, MatchQuality::Exact);
        let ids: Vec<_> = outcome.matches.iter().map(|m| m.therapist_id.0.clone()).collect();
        assert_eq!(ids, vec!["t1", "t3"]);
    }

    #[tokio::test]
    async fn test_total_write_failure_is_an_error() {
        let mut store = MemoryStore::with_pool(vec![therapist("t1", Gender::Female, "narm")]);
        store.failing_writes.insert(TherapistId("t1".into()));

        let sink = CapturingSink::default();
        let result = run(&store, &sink, &PatientPreference::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_no_eligible_therapists_is_quality_none() {
        let mut not_accepting = therapist("t1", Gender::Female, "narm");
        not_accepting.accepting_new = Some(false);
        let mut hidden = therapist("t2", Gender::Female, "narm");
        hidden.hidden = true;
        let store = MemoryStore::with_pool(vec![not_accepting, hidden]);

        let sink = CapturingSink::default();
        let outcome = run(&store, &sink, &PatientPreference::default())
            .await
            .unwrap();

        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.quality, MatchQuality::None);
        assert_eq!(outcome.stats.candidates_skipped, 2);
    }

    #[tokio::test]
    async fn test_events_carry_reason_aggregate() {
        let store = MemoryStore::with_pool(vec![
            therapist("t1", Gender::Male, "narm"),
            therapist("t2", Gender::Male, "hakomi"),
        ]);
        let sink = CapturingSink::default();
        let prefs = PatientPreference {
            gender_preference: Some(GenderPreference::Female),
            specializations: Some(vec!["narm".into()]),
            ..Default::default()
        };
        let outcome = run(&store, &sink, &prefs).await.unwrap();
        assert_eq!(outcome.quality, MatchQuality::Partial);

        let summaries = sink.summaries.lock().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(
            summaries[0].reasons,
            vec![MismatchReason::Gender, MismatchReason::Modality]
        );

        let opportunities = sink.opportunities.lock().unwrap();
        assert_eq!(opportunities.len(), 1);
        assert_eq!(opportunities[0].patient_id, patient_id());
    }

    #[tokio::test]
    async fn test_no_business_opportunity_when_all_perfect() {
        let store = MemoryStore::with_pool(vec![therapist("t1", Gender::Female, "narm")]);
        let sink = CapturingSink::default();
        run(&store, &sink, &PatientPreference::default())
            .await
            .unwrap();

        assert_eq!(sink.summaries.lock().unwrap().len(), 1);
        assert!(sink.opportunities.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_patient_contact_respects_daily_limit() {
        let mut store = MemoryStore::with_pool(vec![therapist("t1", Gender::Female, "narm")]);
        store.patient_initiated_count = 3;

        let outcome = record_patient_contact(
            &store,
            &MatchingConfig::default(),
            &patient_id(),
            &TherapistId("t1".into()),
            Utc::now(),
        )
        .await
        .unwrap();

        assert!(!outcome.decision.allowed);
        assert_eq!(outcome.decision.count, 3);
        assert!(outcome.match_id.is_none());
        assert!(store.stored_matches().is_empty());
    }

    #[tokio::test]
    async fn test_patient_contact_persists_when_allowed() {
        let mut store = MemoryStore::with_pool(vec![therapist("t1", Gender::Female, "narm")]);
        store.patient_initiated_count = 2;

        let outcome = record_patient_contact(
            &store,
            &MatchingConfig::default(),
            &patient_id(),
            &TherapistId("t1".into()),
            Utc::now(),
        )
        .await
        .unwrap();

        assert!(outcome.decision.allowed);
        assert!(outcome.match_id.is_some());

        let stored = store.stored_matches();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, MatchStatus::Proposed);
        assert_eq!(stored[0].metadata["patient_initiated"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_select_match_transitions_only_from_open_states() {
        let store = MemoryStore::with_pool(vec![
            therapist("t1", Gender::Female, "narm"),
            therapist("t2", Gender::Female, "narm"),
        ]);
        let sink = CapturingSink::default();
        let outcome = run(&store, &sink, &PatientPreference::default())
            .await
            .unwrap();

        let match_id = outcome.matches[0].id.clone();
        assert!(select_match(&store, &match_id).await.unwrap());
        // Second selection is a no-op: the row left the open states.
        assert!(!select_match(&store, &match_id).await.unwrap());

        let selected = store
            .stored_matches()
            .into_iter()
            .find(|m| m.id == match_id)
            .unwrap();
        assert_eq!(selected.status, MatchStatus::PatientSelected);
    }
}
