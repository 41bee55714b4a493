//! Nightly aggregation pipeline.
//!
//! Resolves the previous calendar day in the city's own timezone, fetches the
//! historical payload for its astro block, and aggregates the stored hourly
//! readings into a daily summary. A city that has never been ingested is a
//! defined no-op, not an error: its first summary can only exist once at
//! least one hourly run has created the city row.

use chrono::NaiveDate;
use chrono_tz::Tz;
use sqlx::PgPool;

use crate::db::queries;
use crate::errors::PipelineError;
use crate::services::aggregate::{aggregate_daily, previous_local_date};
use crate::services::normalize::{normalize_astro, normalize_city};
use crate::services::retry::{with_policy, DB_POLICY};
use crate::services::weatherapi::WeatherApiClient;

/// How a nightly run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum DailyOutcome {
    /// Summary upserted for the given local date.
    Completed { summary_id: i32, date: NaiveDate },
    /// The city has no row in the store yet; nothing was written.
    SkippedUnknownCity { date: NaiveDate },
}

/// Aggregate yesterday's readings for one city into a daily summary.
///
/// The lookup key is the natural key from the API's own `location` block, not
/// the configured display name, so it matches whatever the hourly pipeline
/// stored.
pub async fn run_daily_analysis_pipeline(
    pool: &PgPool,
    client: &WeatherApiClient,
    city: &str,
    timezone: Tz,
) -> Result<DailyOutcome, PipelineError> {
    let date = previous_local_date(timezone);

    let payload = client.fetch_history(city, date).await?;
    let astro = normalize_astro(&payload)?;
    let location = normalize_city(&payload)?;

    let city_id = with_policy(&DB_POLICY, "city lookup", || {
        queries::lookup_city_id(pool, &location.name, &location.region, &location.country)
    })
    .await?;

    let Some(city_id) = city_id else {
        tracing::info!(
            "No city row for {} ({} {} {}), skipping daily analysis for {}",
            city,
            location.name,
            location.region,
            location.country,
            date,
        );
        return Ok(DailyOutcome::SkippedUnknownCity { date });
    };

    let readings = with_policy(&DB_POLICY, "readings fetch", || {
        queries::readings_for_day(pool, city_id, date)
    })
    .await?;

    let summary = aggregate_daily(city_id, date, &readings, &astro)?;

    let summary_id = with_policy(&DB_POLICY, "daily summary upsert", || {
        queries::upsert_daily_summary(pool, &summary)
    })
    .await?;

    tracing::info!(
        "Daily analysis {} for {} on {}: {} readings, avg {:.1}°C",
        summary_id,
        city,
        date,
        readings.len(),
        summary.avg_temp_c,
    );

    Ok(DailyOutcome::Completed { summary_id, date })
}
