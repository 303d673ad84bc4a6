// src/matching/scoring.rs - Match and platform scoring plus the ranked candidate path

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::MatchingConfig;
use crate::matching::availability::has_matching_slot;
use crate::matching::mismatch::{self, MismatchSummary};
use crate::models::{
    AvailabilitySlot, PatientPreference, SlotKind, TherapistCandidate, TherapistId,
};

/// Baseline for a candidate with zero mismatch reasons.
pub const MATCH_SCORE_MAX: i32 = 100;
/// Deducted once per mismatch reason, independently, floored at zero.
const MISMATCH_PENALTY: i32 = 25;
/// Patient-fit outweighs platform quality by half again per point.
const MATCH_SCORE_WEIGHT: f64 = 1.5;

/// Upper bound of the therapist-intrinsic platform score.
pub const PLATFORM_SCORE_MAX: i32 = 65;
const PHOTO_POINTS: i32 = 10;
const PROFILE_SECTION_POINTS: i32 = 5;
const EXPERIENCE_POINTS_CAP: i32 = 15;
const INTRO_SLOT_POINTS: i32 = 5;
const INTRO_SLOT_POINTS_CAP: i32 = 10;
const FULL_SLOT_POINTS: i32 = 3;
const FULL_SLOT_POINTS_CAP: i32 = 15;

/// Patient-specific fit score in `[0, 100]`: baseline minus a fixed penalty
/// per mismatch reason.
pub fn match_score(summary: &MismatchSummary) -> i32 {
    let penalty = MISMATCH_PENALTY * summary.reasons.len() as i32;
    (MATCH_SCORE_MAX - penalty).max(0)
}

/// Therapist-intrinsic quality score in `[0, 65]`, independent of any
/// patient. Monotonic in every input; each signal saturates at its cap.
pub fn platform_score(
    therapist: &TherapistCandidate,
    intro_slot_count: usize,
    full_slot_count: usize,
) -> i32 {
    let profile = &therapist.profile;
    let mut score = 0;

    if filled(&profile.photo_url) {
        score += PHOTO_POINTS;
    }
    for section in [&profile.about_me, &profile.approach, &profile.qualifications] {
        if filled(section) {
            score += PROFILE_SECTION_POINTS;
        }
    }
    score += profile
        .years_experience
        .unwrap_or(0)
        .clamp(0, EXPERIENCE_POINTS_CAP);
    score += (intro_slot_count as i32 * INTRO_SLOT_POINTS).min(INTRO_SLOT_POINTS_CAP);
    score += (full_slot_count as i32 * FULL_SLOT_POINTS).min(FULL_SLOT_POINTS_CAP);

    score.min(PLATFORM_SCORE_MAX)
}

/// Single ranking key combining both scores.
pub fn total_score(match_score: i32, platform_score: i32) -> f64 {
    match_score as f64 * MATCH_SCORE_WEIGHT + platform_score as f64
}

fn filled(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// One fully scored candidate as served to the match-detail page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub therapist_id: TherapistId,
    pub match_score: i32,
    pub platform_score: i32,
    pub total_score: f64,
    pub mismatch: MismatchSummary,
    pub has_availability: bool,
    pub is_perfect: bool,
}

/// Scores and ranks the whole candidate pool for one patient.
///
/// Sort key is descending `total_score`; the sort is stable, so ties keep
/// the pool's input order and repeated calls are reproducible. A candidate
/// is perfect iff it has zero mismatch reasons, or its total score clears
/// the configured threshold despite a soft mismatch.
pub fn rank_candidates(
    patient: &PatientPreference,
    pool: &[TherapistCandidate],
    slots_by_therapist: &HashMap<TherapistId, Vec<AvailabilitySlot>>,
    today: NaiveDate,
    config: &MatchingConfig,
) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = pool
        .iter()
        .map(|therapist| {
            let slots = slots_by_therapist
                .get(&therapist.id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            score_candidate(patient, therapist, slots, today, config)
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(Ordering::Equal)
    });
    ranked
}

fn score_candidate(
    patient: &PatientPreference,
    therapist: &TherapistCandidate,
    slots: &[AvailabilitySlot],
    today: NaiveDate,
    config: &MatchingConfig,
) -> RankedCandidate {
    let summary = mismatch::evaluate(patient, therapist);
    let match_score = match_score(&summary);

    let intro_slots = count_active(slots, SlotKind::IntroCall);
    let full_slots = count_active(slots, SlotKind::FullSession);
    let platform_score = platform_score(therapist, intro_slots, full_slots);

    let total = total_score(match_score, platform_score);
    let has_availability = has_matching_slot(
        slots,
        patient.time_slots.as_deref(),
        today,
        config.lookahead_days,
    );

    RankedCandidate {
        therapist_id: therapist.id.clone(),
        match_score,
        platform_score,
        total_score: total,
        is_perfect: summary.is_perfect() || total >= config.perfect_total_score,
        mismatch: summary,
        has_availability,
    }
}

fn count_active(slots: &[AvailabilitySlot], kind: SlotKind) -> usize {
    slots.iter().filter(|s| s.active && s.kind == kind).count()
}
