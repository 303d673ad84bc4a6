// src/main.rs - Runs one instant-match orchestration for a lead

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::Parser;
use log::{info, warn};
use std::path::Path;

use matching_lib::db::{self, PgMatchStore};
use matching_lib::events::LogEventSink;
use matching_lib::models::{PatientId, SessionFormat};
use matching_lib::utils::first_non_empty;
use matching_lib::{create_instant_matches, MatchingConfig, TherapistPoolFilter};

#[derive(Parser, Debug)]
#[command(name = "instant_match", about = "Create instant matches for one lead")]
struct Args {
    /// Lead id to match.
    #[arg(long)]
    patient_id: String,

    /// Restrict the therapist pool to one city.
    #[arg(long)]
    city: Option<String>,

    /// Restrict the therapist pool to one modality identifier.
    #[arg(long)]
    modality: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let args = Args::parse();

    let env_paths = [".env", ".env.local", "../.env"];
    let mut loaded_env = false;
    for path in env_paths.iter() {
        if Path::new(path).exists() {
            match dotenv::from_path(path) {
                Ok(_) => {
                    info!("Loaded environment variables from {}", path);
                    loaded_env = true;
                }
                Err(e) => warn!("Failed to load environment from {}: {}", path, e),
            }
            if loaded_env {
                break;
            }
        }
    }
    if !loaded_env {
        info!("No .env file found, using environment variables from system");
    }

    let pool = db::connect().await.context("Database connection failed")?;
    let store = PgMatchStore::new(pool);
    let config = MatchingConfig::from_env();

    let patient_id = PatientId(args.patient_id.clone());
    let preferences = store
        .fetch_patient_preferences(&patient_id)
        .await
        .context("Failed to load lead preferences")?
        .ok_or_else(|| anyhow!("No lead found with id {}", args.patient_id))?;

    // Narrow the pool by city only for leads that cannot do online
    // sessions; an explicit --city always wins.
    let in_person_only = preferences.requested_formats() == vec![SessionFormat::InPerson];
    let city = first_non_empty([
        args.city.as_deref(),
        if in_person_only {
            preferences.city.as_deref()
        } else {
            None
        },
    ]);
    let filter = TherapistPoolFilter {
        city: city.map(String::from),
        modality: args.modality,
    };

    let outcome = create_instant_matches(
        &store,
        &LogEventSink,
        &config,
        &patient_id,
        &preferences,
        &filter,
        Utc::now().date_naive(),
    )
    .await
    .context("Instant match run failed")?;

    info!(
        "Done: quality={}, {} match(es) [{} new, {} reused, {} failed] from {} eligible candidates in {:?}",
        outcome.quality.as_str(),
        outcome.matches.len(),
        outcome.stats.matches_created,
        outcome.stats.matches_reused,
        outcome.stats.writes_failed,
        outcome.stats.candidates_eligible,
        outcome.stats.processing_time
    );
    for record in &outcome.matches {
        info!(
            "  therapist={} status={} token={}",
            record.therapist_id,
            record.status.as_str(),
            record.secure_token
        );
    }

    Ok(())
}
