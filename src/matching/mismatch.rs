// src/matching/mismatch.rs - Structured mismatch evaluation for one patient/therapist pair

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::matching::normalize::normalize_modality_set;
use crate::models::{GenderPreference, MismatchReason, PatientPreference, TherapistCandidate};

/// Result of evaluating one candidate against one patient's preferences.
///
/// `reasons` is ordered (gender, location, modality) so downstream payloads
/// and metadata stay deterministic.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MismatchSummary {
    pub reasons: Vec<MismatchReason>,
}

impl MismatchSummary {
    pub fn is_perfect(&self) -> bool {
        self.reasons.is_empty()
    }

    pub fn has(&self, reason: MismatchReason) -> bool {
        self.reasons.contains(&reason)
    }
}

/// Computes the set of mismatch reasons for one candidate.
///
/// Total and side-effect-free: each rule is evaluated independently, absent
/// or malformed patient fields degrade to "no preference" and absent
/// therapist fields to "no capability". Never errors.
pub fn evaluate(patient: &PatientPreference, therapist: &TherapistCandidate) -> MismatchSummary {
    let mut reasons = Vec::new();

    if gender_mismatch(patient, therapist) {
        reasons.push(MismatchReason::Gender);
    }
    if location_mismatch(patient, therapist) {
        reasons.push(MismatchReason::Location);
    }
    if modality_mismatch(patient, therapist) {
        reasons.push(MismatchReason::Modality);
    }

    MismatchSummary { reasons }
}

/// Flagged iff the patient holds a specific gender preference and the
/// therapist's gender is known and differs. `no_preference` never flags.
fn gender_mismatch(patient: &PatientPreference, therapist: &TherapistCandidate) -> bool {
    let wanted = match patient.gender_preference {
        Some(GenderPreference::Male) => crate::models::Gender::Male,
        Some(GenderPreference::Female) => crate::models::Gender::Female,
        Some(GenderPreference::NoPreference) | None => return false,
    };
    match therapist.gender {
        Some(actual) => actual != wanted,
        None => false,
    }
}

/// Flagged iff the patient requires session formats and the therapist's
/// offered formats have no overlap with them. A therapist offering nothing
/// bookable mismatches every format requirement.
fn location_mismatch(patient: &PatientPreference, therapist: &TherapistCandidate) -> bool {
    let requested = patient.requested_formats();
    if requested.is_empty() {
        return false;
    }
    let offered: HashSet<_> = therapist.session_preferences.iter().collect();
    !requested.iter().any(|format| offered.contains(format))
}

/// Flagged iff the patient requested specializations and, after
/// normalization, none of the therapist's modalities intersect them.
fn modality_mismatch(patient: &PatientPreference, therapist: &TherapistCandidate) -> bool {
    let wanted = match &patient.specializations {
        Some(labels) => normalize_modality_set(labels),
        None => return false,
    };
    if wanted.is_empty() {
        return false;
    }
    let offered = normalize_modality_set(&therapist.modalities);
    wanted.is_disjoint(&offered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, SessionFormat, TherapistId, TherapistProfile};

    fn therapist() -> TherapistCandidate {
        TherapistCandidate {
            id: TherapistId("t1".into()),
            gender: Some(Gender::Male),
            city: Some("Berlin".into()),
            session_preferences: vec![SessionFormat::Online],
            modalities: vec!["NARM".into(), "Somatic Experiencing®".into()],
            accepting_new: Some(true),
            hidden: false,
            profile: TherapistProfile::default(),
        }
    }

    #[test]
    fn test_empty_preferences_always_perfect() {
        let summary = evaluate(&PatientPreference::default(), &therapist());
        assert!(summary.is_perfect());
        assert!(summary.reasons.is_empty());
    }

    #[test]
    fn test_no_preference_gender_never_flags() {
        let prefs = PatientPreference {
            gender_preference: Some(GenderPreference::NoPreference),
            ..Default::default()
        };
        for gender in [Some(Gender::Male), Some(Gender::Female), Some(Gender::NonBinary), None] {
            let mut t = therapist();
            t.gender = gender;
            assert!(!evaluate(&prefs, &t).has(MismatchReason::Gender));
        }
    }

    #[test]
    fn test_gender_mismatch_requires_known_differing_gender() {
        let prefs = PatientPreference {
            gender_preference: Some(GenderPreference::Female),
            ..Default::default()
        };

        let mut t = therapist();
        assert!(evaluate(&prefs, &t).has(MismatchReason::Gender));

        t.gender = Some(Gender::Female);
        assert!(!evaluate(&prefs, &t).has(MismatchReason::Gender));

        // Unknown gender degrades to "no capability known", not a mismatch.
        t.gender = None;
        assert!(!evaluate(&prefs, &t).has(MismatchReason::Gender));

        t.gender = Some(Gender::NonBinary);
        assert!(evaluate(&prefs, &t).has(MismatchReason::Gender));
    }

    #[test]
    fn test_location_mismatch_on_disjoint_formats() {
        let prefs = PatientPreference {
            session_preference: Some(SessionFormat::InPerson),
            ..Default::default()
        };
        let summary = evaluate(&prefs, &therapist());
        assert!(summary.has(MismatchReason::Location));

        // Multi-valued preference with one overlapping format matches.
        let prefs = PatientPreference {
            session_preferences: Some(vec![SessionFormat::InPerson, SessionFormat::Online]),
            ..Default::default()
        };
        assert!(!evaluate(&prefs, &therapist()).has(MismatchReason::Location));
    }

    #[test]
    fn test_therapist_offering_nothing_mismatches_any_format_request() {
        let prefs = PatientPreference {
            session_preference: Some(SessionFormat::Online),
            ..Default::default()
        };
        let mut t = therapist();
        t.session_preferences = vec![];
        assert!(evaluate(&prefs, &t).has(MismatchReason::Location));

        // But no format request means no flag even with nothing offered.
        assert!(!evaluate(&PatientPreference::default(), &t).has(MismatchReason::Location));
    }

    #[test]
    fn test_modality_matching_is_normalization_robust() {
        let prefs = PatientPreference {
            specializations: Some(vec!["somatic_experiencing".into()]),
            ..Default::default()
        };
        assert!(!evaluate(&prefs, &therapist()).has(MismatchReason::Modality));

        let prefs = PatientPreference {
            specializations: Some(vec!["Hakomi".into()]),
            ..Default::default()
        };
        assert!(evaluate(&prefs, &therapist()).has(MismatchReason::Modality));
    }

    #[test]
    fn test_unusable_specializations_degrade_to_no_preference() {
        let prefs = PatientPreference {
            specializations: Some(vec!["®".into(), "  ".into()]),
            ..Default::default()
        };
        assert!(evaluate(&prefs, &therapist()).is_perfect());
    }

    #[test]
    fn test_reasons_are_independent_and_ordered() {
        let prefs = PatientPreference {
            gender_preference: Some(GenderPreference::Female),
            session_preference: Some(SessionFormat::InPerson),
            specializations: Some(vec!["Hakomi".into()]),
            ..Default::default()
        };
        let summary = evaluate(&prefs, &therapist());
        assert_eq!(
            summary.reasons,
            vec![
                MismatchReason::Gender,
                MismatchReason::Location,
                MismatchReason::Modality
            ]
        );
        assert!(!summary.is_perfect());
    }
}
