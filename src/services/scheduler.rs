//! In-process driver for the hourly and nightly pipelines.
//!
//! One hourly loop ingests all configured cities shortly after each hour
//! boundary, with a small stagger between cities; one nightly loop per city
//! wakes late in that city's own local evening and aggregates the previous
//! local day. Pipeline failures are logged and recorded in the shared state —
//! a failed run never takes the loop down.
//!
//! The pipelines themselves stay plain async functions, so an external
//! scheduler can drive them instead of these loops without touching the core.
//!
//! State is in-memory (`Arc<RwLock<SchedulerState>>`), exposed via the
//! status endpoint; nothing is persisted across restarts.

use chrono::{DateTime, Days, Duration, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::config::CityJob;
use crate::pipelines::current::run_current_weather_pipeline;
use crate::pipelines::daily::{run_daily_analysis_pipeline, DailyOutcome};
use crate::services::weatherapi::WeatherApiClient;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Offset after the hour boundary before the hourly cycle starts (seconds).
/// Gives the upstream API time to publish the new observation.
const HOURLY_OFFSET_SECS: i64 = 9 * 60;

/// Stagger between consecutive cities within one hourly cycle (seconds).
const CITY_STAGGER_SECS: u64 = 60;

/// Local wall-clock time at which a city's nightly aggregation runs.
const NIGHTLY_RUN_HOUR: u32 = 23;
const NIGHTLY_RUN_MINUTE: u32 = 20;

/// Stagger between cities' nightly run times (minutes per city index).
const NIGHTLY_STAGGER_MINS: u32 = 2;

// ---------------------------------------------------------------------------
// Scheduler state (in-memory, shared via Arc<RwLock<>>)
// ---------------------------------------------------------------------------

/// Last-run bookkeeping for one city, exposed via the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CityRunStatus {
    pub city: String,
    pub hourly_last_run_at: Option<DateTime<Utc>>,
    /// "pending", "ok: ...", "skipped: ...", or "error: ..."
    pub hourly_last_result: String,
    pub nightly_last_run_at: Option<DateTime<Utc>>,
    pub nightly_last_result: String,
}

impl CityRunStatus {
    fn new(city: &str) -> Self {
        Self {
            city: city.to_string(),
            hourly_last_run_at: None,
            hourly_last_result: "pending".to_string(),
            nightly_last_run_at: None,
            nightly_last_result: "pending".to_string(),
        }
    }
}

/// Global scheduler state.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SchedulerState {
    pub active: bool,
    pub next_hourly_cycle_at: Option<DateTime<Utc>>,
    pub last_hourly_cycle_ms: Option<u64>,
    pub total_hourly_cycles: u64,
    pub total_nightly_runs: u64,
    pub cities: Vec<CityRunStatus>,
}

impl SchedulerState {
    pub fn new() -> Self {
        Self {
            active: true,
            next_hourly_cycle_at: None,
            last_hourly_cycle_ms: None,
            total_hourly_cycles: 0,
            total_nightly_runs: 0,
            cities: Vec::new(),
        }
    }
}

/// Shared scheduler state handle.
pub type SharedSchedulerState = Arc<RwLock<SchedulerState>>;

fn city_entry<'a>(cities: &'a mut Vec<CityRunStatus>, city: &str) -> &'a mut CityRunStatus {
    if let Some(pos) = cities.iter().position(|c| c.city == city) {
        &mut cities[pos]
    } else {
        cities.push(CityRunStatus::new(city));
        cities.last_mut().unwrap()
    }
}

// ---------------------------------------------------------------------------
// Wake-time calculation
// ---------------------------------------------------------------------------

/// Floor a datetime to the start of its hour.
fn floor_to_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive()
        .and_hms_opt(dt.time().hour(), 0, 0)
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or(dt)
}

/// The first instant strictly after `after` that lies on an hour boundary.
fn next_hour(after: DateTime<Utc>) -> DateTime<Utc> {
    floor_to_hour(after) + Duration::hours(1)
}

/// The next UTC instant whose wall clock in `tz` reads `target`.
///
/// If `target` falls in a DST gap on the candidate day (a spring-forward
/// transition swallowed it), that day is skipped.
fn next_local_occurrence(now_utc: DateTime<Utc>, tz: Tz, target: NaiveTime) -> DateTime<Utc> {
    let local_now = now_utc.with_timezone(&tz);
    let mut date = local_now.date_naive();
    if local_now.time() >= target {
        date = date + Days::new(1);
    }
    loop {
        if let Some(dt) = tz.from_local_datetime(&date.and_time(target)).earliest() {
            return dt.with_timezone(&Utc);
        }
        date = date + Days::new(1);
    }
}

async fn sleep_until_instant(target: DateTime<Utc>) {
    let millis = (target - Utc::now()).num_milliseconds().max(0) as u64;
    tokio::time::sleep(std::time::Duration::from_millis(millis)).await;
}

async fn sleep_secs(secs: u64) {
    tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

/// Run the hourly ingestion cycle forever. Spawn via `tokio::spawn`.
pub async fn run_hourly_ingestion(
    pool: PgPool,
    client: WeatherApiClient,
    jobs: Vec<CityJob>,
    state: SharedSchedulerState,
) {
    tracing::info!("Hourly ingestion loop started for {} cities", jobs.len());

    loop {
        let wake = next_hour(Utc::now()) + Duration::seconds(HOURLY_OFFSET_SECS);
        {
            let mut s = state.write().await;
            s.next_hourly_cycle_at = Some(wake);
        }
        sleep_until_instant(wake).await;

        let cycle_start = Utc::now();
        let runs = jobs.iter().enumerate().map(|(i, job)| {
            let pool = &pool;
            let client = &client;
            async move {
                sleep_secs(i as u64 * CITY_STAGGER_SECS).await;
                let result = run_current_weather_pipeline(pool, client, &job.city).await;
                (job.city.clone(), result)
            }
        });
        let results = join_all(runs).await;

        let cycle_ms = (Utc::now() - cycle_start).num_milliseconds().max(0) as u64;
        let mut s = state.write().await;
        for (city, result) in results {
            let outcome = match result {
                Ok(reading_id) => format!("ok: reading {}", reading_id),
                Err(e) => {
                    tracing::error!("Hourly ingestion failed for {}: {}", city, e);
                    format!("error: {}", e)
                }
            };
            let entry = city_entry(&mut s.cities, &city);
            entry.hourly_last_run_at = Some(Utc::now());
            entry.hourly_last_result = outcome;
        }
        s.total_hourly_cycles += 1;
        s.last_hourly_cycle_ms = Some(cycle_ms);

        tracing::info!(
            "Hourly cycle {} complete in {}ms",
            s.total_hourly_cycles,
            cycle_ms,
        );
    }
}

/// Run one city's nightly aggregation forever. Spawn via `tokio::spawn`,
/// once per configured city; `city_index` staggers sibling run times.
pub async fn run_nightly_aggregation(
    pool: PgPool,
    client: WeatherApiClient,
    job: CityJob,
    city_index: usize,
    state: SharedSchedulerState,
) {
    let run_at = nightly_run_time(city_index);
    tracing::info!(
        "Nightly aggregation loop started for {} at {} local ({})",
        job.city,
        run_at,
        job.timezone,
    );

    loop {
        let wake = next_local_occurrence(Utc::now(), job.timezone, run_at);
        sleep_until_instant(wake).await;

        let result = run_daily_analysis_pipeline(&pool, &client, &job.city, job.timezone).await;
        let outcome = match result {
            Ok(DailyOutcome::Completed { summary_id, date }) => {
                format!("ok: summary {} for {}", summary_id, date)
            }
            Ok(DailyOutcome::SkippedUnknownCity { date }) => {
                format!("skipped: city not ingested yet ({})", date)
            }
            Err(e) => {
                tracing::error!("Nightly aggregation failed for {}: {}", job.city, e);
                format!("error: {}", e)
            }
        };

        let mut s = state.write().await;
        let entry = city_entry(&mut s.cities, &job.city);
        entry.nightly_last_run_at = Some(Utc::now());
        entry.nightly_last_result = outcome;
        s.total_nightly_runs += 1;
    }
}

/// Local run time for the city at `index`, staggered so sibling runs do not
/// hit the API at the same instant.
fn nightly_run_time(index: usize) -> NaiveTime {
    let minute = NIGHTLY_RUN_MINUTE + (index as u32 % 20) * NIGHTLY_STAGGER_MINS;
    NaiveTime::from_hms_opt(NIGHTLY_RUN_HOUR, minute, 0)
        .unwrap_or_else(|| NaiveTime::from_hms_opt(NIGHTLY_RUN_HOUR, NIGHTLY_RUN_MINUTE, 0).unwrap())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
