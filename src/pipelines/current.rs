//! Hourly ingestion pipeline: fetch → normalize → upsert.
//!
//! One run per city per hour. Stages are strictly sequential; the city upsert
//! must complete first because the reading is keyed by the returned city id.
//! A failure at any stage ends the run and leaves earlier writes committed.

use sqlx::PgPool;

use crate::db::queries;
use crate::errors::PipelineError;
use crate::services::normalize::{normalize_city, normalize_reading};
use crate::services::retry::{with_policy, DB_POLICY};
use crate::services::weatherapi::WeatherApiClient;

/// Ingest the current conditions for one city. Returns the reading's
/// surrogate id (the pre-existing one if this hour was already ingested).
pub async fn run_current_weather_pipeline(
    pool: &PgPool,
    client: &WeatherApiClient,
    city: &str,
) -> Result<i32, PipelineError> {
    let payload = client.fetch_current(city).await?;

    let new_city = normalize_city(&payload)?;
    let reading = normalize_reading(&payload)?;

    let city_id = with_policy(&DB_POLICY, "city upsert", || {
        queries::upsert_city(pool, &new_city)
    })
    .await?;

    let reading_id = with_policy(&DB_POLICY, "weather reading upsert", || {
        queries::upsert_weather_reading(pool, &reading, city_id)
    })
    .await?;

    tracing::info!(
        "Ingested reading {} for {} ({} {} {}) at {} {}",
        reading_id,
        city,
        new_city.name,
        new_city.region,
        new_city.country,
        reading.date,
        reading.time,
    );

    Ok(reading_id)
}
