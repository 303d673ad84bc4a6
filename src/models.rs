// src/models.rs - Core domain types for the matching engine

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a therapist row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TherapistId(pub String);

/// Unique identifier of a patient lead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatientId(pub String);

/// Unique identifier of a match row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchId(pub String);

impl fmt::Display for TherapistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Therapist gender as recorded on the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::NonBinary => "non_binary",
        }
    }

    /// Parses a stored gender value. Unknown strings map to `None` so that
    /// malformed rows degrade to "gender unknown" rather than failing.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "male" | "m" => Some(Gender::Male),
            "female" | "f" => Some(Gender::Female),
            "non_binary" | "non-binary" | "nonbinary" => Some(Gender::NonBinary),
            _ => None,
        }
    }
}

/// Patient-side gender preference from the intake form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderPreference {
    Male,
    Female,
    NoPreference,
}

impl GenderPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenderPreference::Male => "male",
            GenderPreference::Female => "female",
            GenderPreference::NoPreference => "no_preference",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "male" => Some(GenderPreference::Male),
            "female" => Some(GenderPreference::Female),
            "no_preference" | "none" | "any" => Some(GenderPreference::NoPreference),
            _ => None,
        }
    }
}

/// Session delivery format, offered by therapists and requested by patients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionFormat {
    Online,
    InPerson,
}

impl SessionFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionFormat::Online => "online",
            SessionFormat::InPerson => "in_person",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "online" | "video" => Some(SessionFormat::Online),
            "in_person" | "in-person" | "inperson" | "offline" => Some(SessionFormat::InPerson),
            _ => None,
        }
    }
}

/// Kind of bookable slot: a short introductory call or a full session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    IntroCall,
    FullSession,
}

impl SlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::IntroCall => "intro_call",
            SlotKind::FullSession => "full_session",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "intro_call" | "intro" => Some(SlotKind::IntroCall),
            "full_session" | "full" | "session" => Some(SlotKind::FullSession),
            _ => None,
        }
    }
}

/// Lifecycle state of a match row.
///
/// Instant matches are created as `Suggested`; patient-initiated direct
/// contact creates `Proposed`. `Accepted`/`Rejected` are set by the therapist
/// response flow, which lives outside this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Proposed,
    Suggested,
    PatientSelected,
    Accepted,
    Rejected,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Proposed => "proposed",
            MatchStatus::Suggested => "suggested",
            MatchStatus::PatientSelected => "patient_selected",
            MatchStatus::Accepted => "accepted",
            MatchStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "proposed" => Some(MatchStatus::Proposed),
            "suggested" => Some(MatchStatus::Suggested),
            "patient_selected" => Some(MatchStatus::PatientSelected),
            "accepted" => Some(MatchStatus::Accepted),
            "rejected" => Some(MatchStatus::Rejected),
            _ => None,
        }
    }
}

/// Overall quality of an orchestration result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchQuality {
    Exact,
    Partial,
    None,
}

impl MatchQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchQuality::Exact => "exact",
            MatchQuality::Partial => "partial",
            MatchQuality::None => "none",
        }
    }
}

/// Structured reason why a candidate is not a perfect fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchReason {
    Gender,
    Location,
    Modality,
}

impl MismatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MismatchReason::Gender => "gender",
            MismatchReason::Location => "location",
            MismatchReason::Modality => "modality",
        }
    }
}

/// Patient preferences derived from the intake form.
///
/// Every field is optional: an absent field means "no preference" and matches
/// anything. `session_preferences` generalizes the older single-valued
/// `session_preference`; both may be present on real leads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientPreference {
    pub city: Option<String>,
    pub session_preference: Option<SessionFormat>,
    pub session_preferences: Option<Vec<SessionFormat>>,
    pub specializations: Option<Vec<String>>,
    pub gender_preference: Option<GenderPreference>,
    pub time_slots: Option<Vec<String>>,
}

impl PatientPreference {
    /// The set of session formats the patient requires. The multi-valued
    /// field wins when present and non-empty; otherwise the single-valued
    /// one; otherwise empty, meaning no format requirement.
    pub fn requested_formats(&self) -> Vec<SessionFormat> {
        if let Some(formats) = &self.session_preferences {
            if !formats.is_empty() {
                return formats.clone();
            }
        }
        self.session_preference.into_iter().collect()
    }
}

/// Versioned profile attributes used as quality signals by the scoring
/// engine. Absent fields count as "not filled in".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TherapistProfile {
    pub photo_url: Option<String>,
    pub about_me: Option<String>,
    pub approach: Option<String>,
    pub qualifications: Option<String>,
    pub years_experience: Option<i32>,
}

/// Read-only projection of a therapist record as consumed by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TherapistCandidate {
    pub id: TherapistId,
    pub gender: Option<Gender>,
    pub city: Option<String>,
    /// Formats the therapist offers. Empty means nothing bookable.
    pub session_preferences: Vec<SessionFormat>,
    /// Raw modality labels, pre-normalization.
    pub modalities: Vec<String>,
    /// Absent means accepting (default true).
    pub accepting_new: Option<bool>,
    /// Administratively hidden profiles never enter matching.
    pub hidden: bool,
    pub profile: TherapistProfile,
}

impl TherapistCandidate {
    pub fn accepts_new_patients(&self) -> bool {
        self.accepting_new.unwrap_or(true)
    }
}

/// One recurring or one-off availability slot belonging to a therapist.
///
/// Invariant: a recurring slot has `specific_date = None`; a one-off slot has
/// `is_recurring = false` and derives its weekday from `specific_date`.
/// Day-of-week indices use 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: String,
    pub therapist_id: TherapistId,
    pub day_of_week: Option<u8>,
    /// Local start time, "HH:MM".
    pub time_local: String,
    pub format: SessionFormat,
    pub kind: SlotKind,
    pub active: bool,
    pub is_recurring: bool,
    pub specific_date: Option<NaiveDate>,
    /// Optional bound for a recurring series.
    pub end_date: Option<NaiveDate>,
}

impl AvailabilitySlot {
    /// Weekday index (0 = Sunday) this slot occurs on, if derivable.
    pub fn weekday_index(&self) -> Option<u8> {
        if self.is_recurring {
            self.day_of_week
        } else {
            self.specific_date
                .map(|d| d.weekday().num_days_from_sunday() as u8)
        }
    }

    /// Local start hour parsed from `time_local`. Malformed times yield
    /// `None` and the slot simply never matches a time-of-day window.
    pub fn start_hour(&self) -> Option<u32> {
        let hour = self.time_local.split(':').next()?.trim();
        hour.parse::<u32>().ok().filter(|h| *h < 24)
    }
}

/// A persisted match between one patient and one therapist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub patient_id: PatientId,
    pub therapist_id: TherapistId,
    pub status: MatchStatus,
    /// Opaque token shared by all matches of one orchestration run, so a
    /// single link can reveal the whole set.
    pub secure_token: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_formats_prefers_multi_valued_field() {
        let prefs = PatientPreference {
            session_preference: Some(SessionFormat::Online),
            session_preferences: Some(vec![SessionFormat::InPerson, SessionFormat::Online]),
            ..Default::default()
        };
        assert_eq!(
            prefs.requested_formats(),
            vec![SessionFormat::InPerson, SessionFormat::Online]
        );
    }

    #[test]
    fn test_requested_formats_falls_back_to_single_field() {
        let prefs = PatientPreference {
            session_preference: Some(SessionFormat::Online),
            session_preferences: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(prefs.requested_formats(), vec![SessionFormat::Online]);

        let no_prefs = PatientPreference::default();
        assert!(no_prefs.requested_formats().is_empty());
    }

    #[test]
    fn test_accepting_new_defaults_to_true() {
        let mut therapist = TherapistCandidate {
            id: TherapistId("t1".into()),
            gender: None,
            city: None,
            session_preferences: vec![],
            modalities: vec![],
            accepting_new: None,
            hidden: false,
            profile: TherapistProfile::default(),
        };
        assert!(therapist.accepts_new_patients());
        therapist.accepting_new = Some(false);
        assert!(!therapist.accepts_new_patients());
    }

    #[test]
    fn test_one_off_slot_weekday_derived_from_date() {
        let slot = AvailabilitySlot {
            id: "s1".into(),
            therapist_id: TherapistId("t1".into()),
            day_of_week: None,
            time_local: "09:30".into(),
            format: SessionFormat::Online,
            kind: SlotKind::FullSession,
            active: true,
            is_recurring: false,
            // 2025-06-01 is a Sunday.
            specific_date: NaiveDate::from_ymd_opt(2025, 6, 1),
            end_date: None,
        };
        assert_eq!(slot.weekday_index(), Some(0));
        assert_eq!(slot.start_hour(), Some(9));
    }

    #[test]
    fn test_start_hour_rejects_malformed_times() {
        let mut slot = AvailabilitySlot {
            id: "s1".into(),
            therapist_id: TherapistId("t1".into()),
            day_of_week: Some(1),
            time_local: "garbage".into(),
            format: SessionFormat::Online,
            kind: SlotKind::FullSession,
            active: true,
            is_recurring: true,
            specific_date: None,
            end_date: None,
        };
        assert_eq!(slot.start_hour(), None);
        slot.time_local = "25:00".into();
        assert_eq!(slot.start_hour(), None);
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            MatchStatus::Proposed,
            MatchStatus::Suggested,
            MatchStatus::PatientSelected,
            MatchStatus::Accepted,
            MatchStatus::Rejected,
        ] {
            assert_eq!(MatchStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(MatchStatus::parse("bogus"), None);
    }
}
