// src/lib.rs - Patient-to-therapist matching and ranking engine
//
// Library consumed by the directory's HTTP route handlers: scores and ranks
// therapist candidates against a patient's intake preferences, creates a
// bounded set of match records exactly once per patient, and rate-limits
// direct contact attempts. Persistence and notification delivery live
// behind the `store` and `events` traits.

pub mod config;
pub mod db;
pub mod events;
pub mod matching;
pub mod models;
pub mod results;
pub mod store;
pub mod utils;

pub use config::MatchingConfig;
pub use matching::orchestrator::{create_instant_matches, record_patient_contact, select_match};
pub use matching::scoring::rank_candidates;
pub use results::InstantMatchOutcome;
pub use store::{MatchStore, TherapistPoolFilter};
