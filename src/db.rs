// src/db.rs - PostgreSQL connection pool and MatchStore implementation

use anyhow::{Context, Result};
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};
use std::collections::HashMap;
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Config, NoTls, Row as PgRow};
use uuid::Uuid;

use crate::models::{
    AvailabilitySlot, Gender, GenderPreference, MatchId, MatchStatus, PatientId,
    PatientPreference, SessionFormat, SlotKind, TherapistCandidate, TherapistId,
    TherapistProfile,
};
use crate::store::{MatchStore, MatchUpsert, TherapistPoolFilter, UpsertOutcome};

pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// Match rows in these states are past the patient's reach; a re-run must
/// not pull them back to `suggested`.
const SETTLED_STATUSES: [MatchStatus; 3] = [
    MatchStatus::PatientSelected,
    MatchStatus::Accepted,
    MatchStatus::Rejected,
];

/// Reads environment variables and constructs a PostgreSQL config.
fn build_pg_config() -> Config {
    let mut config = Config::new();
    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port_str = std::env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string());
    let port = port_str.parse::<u16>().unwrap_or(5432);
    let dbname = std::env::var("POSTGRES_DB").unwrap_or_else(|_| "directory".to_string());
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = std::env::var("POSTGRES_PASSWORD").unwrap_or_default();

    info!(
        "DB Config: Host={}, Port={}, DB={}, User={}",
        host, port, dbname, user
    );
    config
        .host(&host)
        .port(port)
        .dbname(&dbname)
        .user(&user)
        .password(&password);
    config.application_name("therapist_matching_engine");
    config.connect_timeout(Duration::from_secs(10));
    config
}

/// Initializes the database connection pool.
pub async fn connect() -> Result<PgPool> {
    let config = build_pg_config();
    info!("Connecting to PostgreSQL database...");
    let manager = PostgresConnectionManager::new(config, NoTls);

    let pool = Pool::builder()
        .max_size(16)
        .min_idle(Some(1))
        .idle_timeout(Some(Duration::from_secs(180)))
        .connection_timeout(Duration::from_secs(15))
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;

    // Test connection
    let conn = pool
        .get()
        .await
        .context("Failed to get test connection from pool")?;
    conn.query_one("SELECT 1", &[])
        .await
        .context("Test query 'SELECT 1' failed")?;
    info!("Database connection pool initialized successfully.");
    Ok(pool.clone())
}

/// Postgres-backed implementation of the engine's persistence collaborator.
#[derive(Clone)]
pub struct PgMatchStore {
    pool: PgPool,
}

impl PgMatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads one lead's intake preferences for the runner binary. Absent
    /// columns degrade to "no preference".
    pub async fn fetch_patient_preferences(
        &self,
        patient_id: &PatientId,
    ) -> Result<Option<PatientPreference>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for lead read")?;

        let row = conn
            .query_opt(
                "SELECT city, session_preference, session_preferences,
                        specializations, gender_preference, time_slots
                 FROM public.lead
                 WHERE id = $1",
                &[&patient_id.0],
            )
            .await
            .context("Failed to query lead preferences")?;

        Ok(row.map(|row| PatientPreference {
            city: row.get("city"),
            session_preference: row
                .get::<_, Option<String>>("session_preference")
                .and_then(|raw| SessionFormat::parse(&raw)),
            session_preferences: row
                .get::<_, Option<Vec<String>>>("session_preferences")
                .map(|raw| raw.iter().filter_map(|f| SessionFormat::parse(f)).collect()),
            specializations: row.get("specializations"),
            gender_preference: row
                .get::<_, Option<String>>("gender_preference")
                .and_then(|raw| GenderPreference::parse(&raw)),
            time_slots: row.get("time_slots"),
        }))
    }
}

fn therapist_from_row(row: &PgRow) -> TherapistCandidate {
    TherapistCandidate {
        id: TherapistId(row.get("id")),
        gender: row
            .get::<_, Option<String>>("gender")
            .and_then(|raw| Gender::parse(&raw)),
        city: row.get("city"),
        session_preferences: row
            .get::<_, Option<Vec<String>>>("session_preferences")
            .unwrap_or_default()
            .iter()
            .filter_map(|f| SessionFormat::parse(f))
            .collect(),
        modalities: row
            .get::<_, Option<Vec<String>>>("modalities")
            .unwrap_or_default(),
        accepting_new: row.get("accepting_new"),
        hidden: row.get::<_, Option<bool>>("hidden").unwrap_or(false),
        profile: TherapistProfile {
            photo_url: row.get("photo_url"),
            about_me: row.get("about_me"),
            approach: row.get("approach"),
            qualifications: row.get("qualifications"),
            years_experience: row.get("years_experience"),
        },
    }
}

fn slot_from_row(row: &PgRow) -> Option<AvailabilitySlot> {
    let format_raw: String = row.get("format");
    let Some(format) = SessionFormat::parse(&format_raw) else {
        warn!(
            "Skipping availability slot {} with unknown format {:?}",
            row.get::<_, String>("id"),
            format_raw
        );
        return None;
    };
    let kind = row
        .get::<_, Option<String>>("kind")
        .and_then(|raw| SlotKind::parse(&raw))
        .unwrap_or(SlotKind::FullSession);

    Some(AvailabilitySlot {
        id: row.get("id"),
        therapist_id: TherapistId(row.get("therapist_id")),
        day_of_week: row
            .get::<_, Option<i32>>("day_of_week")
            .and_then(|d| u8::try_from(d).ok()),
        time_local: row.get("time_local"),
        format,
        kind,
        active: row.get("active"),
        is_recurring: row.get("is_recurring"),
        specific_date: row.get::<_, Option<NaiveDate>>("specific_date"),
        end_date: row.get::<_, Option<NaiveDate>>("end_date"),
    })
}

impl MatchStore for PgMatchStore {
    async fn fetch_therapist_pool(
        &self,
        filter: &TherapistPoolFilter,
    ) -> Result<Vec<TherapistCandidate>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for therapist pool read")?;

        let mut query = String::from(
            "SELECT id, gender, city, session_preferences, modalities,
                    accepting_new, hidden, photo_url, about_me, approach,
                    qualifications, years_experience
             FROM public.therapist
             WHERE status = 'verified' AND hidden = false",
        );
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::new();
        if let Some(city) = &filter.city {
            params.push(city);
            query.push_str(&format!(" AND city = ${}", params.len()));
        }
        if let Some(modality) = &filter.modality {
            params.push(modality);
            query.push_str(&format!(" AND ${} = ANY(modalities)", params.len()));
        }
        // Stable pool order keeps ranking ties deterministic.
        query.push_str(" ORDER BY id");

        let rows = conn
            .query(&query, &params)
            .await
            .context("Failed to query therapist pool")?;
        Ok(rows.iter().map(therapist_from_row).collect())
    }

    async fn fetch_active_slots(
        &self,
        therapist_ids: &[TherapistId],
    ) -> Result<HashMap<TherapistId, Vec<AvailabilitySlot>>> {
        if therapist_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for slot read")?;

        let ids: Vec<&str> = therapist_ids.iter().map(|id| id.0.as_str()).collect();
        let rows = conn
            .query(
                "SELECT id, therapist_id, day_of_week, time_local, format, kind,
                        active, is_recurring, specific_date, end_date
                 FROM public.availability_slot
                 WHERE therapist_id = ANY($1) AND active = true
                 ORDER BY therapist_id, day_of_week, time_local",
                &[&ids],
            )
            .await
            .context("Failed to query availability slots")?;

        let mut by_therapist: HashMap<TherapistId, Vec<AvailabilitySlot>> = HashMap::new();
        for row in &rows {
            if let Some(slot) = slot_from_row(row) {
                by_therapist
                    .entry(slot.therapist_id.clone())
                    .or_default()
                    .push(slot);
            }
        }
        Ok(by_therapist)
    }

    async fn count_recent_patient_initiated(
        &self,
        patient_id: &PatientId,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for contact count")?;

        let row = conn
            .query_one(
                "SELECT COUNT(*) AS contact_count
                 FROM public.patient_match
                 WHERE patient_id = $1
                   AND created_at >= $2
                   AND (metadata ->> 'patient_initiated')::boolean IS TRUE",
                &[&patient_id.0, &since],
            )
            .await
            .context("Failed to count recent patient-initiated matches")?;
        Ok(row.get("contact_count"))
    }

    async fn upsert_match(&self, upsert: &MatchUpsert) -> Result<UpsertOutcome> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for match upsert")?;

        let existing = conn
            .query_opt(
                "SELECT id, status FROM public.patient_match
                 WHERE patient_id = $1 AND therapist_id = $2",
                &[&upsert.patient_id.0, &upsert.therapist_id.0],
            )
            .await
            .context("Failed to check existing match")?;

        if let Some(row) = existing {
            let id: String = row.get("id");
            let current = MatchStatus::parse(&row.get::<_, String>("status"));
            // A settled row keeps its status and token; only metadata and
            // the touch timestamp are refreshed.
            let next_status = match current {
                Some(status) if SETTLED_STATUSES.contains(&status) => status,
                _ => upsert.status,
            };
            conn.execute(
                "UPDATE public.patient_match
                 SET status = $1, metadata = $2, updated_at = CURRENT_TIMESTAMP
                 WHERE id = $3",
                &[&next_status.as_str(), &upsert.metadata, &id],
            )
            .await
            .context(format!("Failed to update match id {}", id))?;
            return Ok(UpsertOutcome {
                match_id: MatchId(id),
                inserted: false,
            });
        }

        let new_id = Uuid::new_v4().to_string();
        let inserted = conn
            .query_opt(
                "INSERT INTO public.patient_match
                     (id, patient_id, therapist_id, status, secure_token, metadata, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, CURRENT_TIMESTAMP)
                 ON CONFLICT (patient_id, therapist_id) DO NOTHING
                 RETURNING id",
                &[
                    &new_id,
                    &upsert.patient_id.0,
                    &upsert.therapist_id.0,
                    &upsert.status.as_str(),
                    &upsert.secure_token,
                    &upsert.metadata,
                ],
            )
            .await
            .context("Failed to insert match")?;

        match inserted {
            Some(row) => Ok(UpsertOutcome {
                match_id: MatchId(row.get("id")),
                inserted: true,
            }),
            None => {
                // Lost a race with a concurrent run; the unique constraint
                // made the insert a no-op. Re-read and proceed as existing.
                let row = conn
                    .query_one(
                        "SELECT id FROM public.patient_match
                         WHERE patient_id = $1 AND therapist_id = $2",
                        &[&upsert.patient_id.0, &upsert.therapist_id.0],
                    )
                    .await
                    .context("Failed to re-read match after conflict")?;
                Ok(UpsertOutcome {
                    match_id: MatchId(row.get("id")),
                    inserted: false,
                })
            }
        }
    }

    async fn update_match_status(
        &self,
        id: &MatchId,
        from: &[MatchStatus],
        to: MatchStatus,
    ) -> Result<bool> {
        let conn = self
            .pool
            .get()
            .await
            .context("Failed to get DB connection for status update")?;

        let from_states: Vec<&str> = from.iter().map(MatchStatus::as_str).collect();
        let updated = conn
            .execute(
                "UPDATE public.patient_match
                 SET status = $1, updated_at = CURRENT_TIMESTAMP
                 WHERE id = $2 AND status = ANY($3)",
                &[&to.as_str(), &id.0, &from_states],
            )
            .await
            .context(format!("Failed to update status of match id {}", id))?;
        Ok(updated > 0)
    }
}
