//! Daily statistics over one city's hourly readings.
//!
//! The nightly pipeline anchors to the city's own wall clock: "yesterday" is
//! resolved in the city's IANA timezone, not the host's. Aggregation itself
//! is pure; the wind aggregates in m/s are derived from their km/h
//! counterparts so the two columns can never drift apart.

use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::db::models::{NewDailySummary, WeatherReading};
use crate::errors::PipelineError;
use crate::services::normalize::AstroFields;

/// The previous calendar day in `tz`, as of now.
pub fn previous_local_date(tz: Tz) -> NaiveDate {
    previous_local_date_at(Utc::now(), tz)
}

/// The previous calendar day in `tz`, as of `now_utc`.
///
/// Calendar subtraction on the local date, not 24 hours of absolute time:
/// shortly after midnight on the day following a DST transition the previous
/// local day is still the transition day, even though it lasted 23 or 25
/// hours.
pub fn previous_local_date_at(now_utc: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now_utc.with_timezone(&tz).date_naive() - Days::new(1)
}

/// Aggregate one local day's readings plus its astro block into a summary.
///
/// Zero readings is a defined error, not a degenerate summary: a day with no
/// observations means the hourly ingestion did not run, and max/mean are
/// undefined over an empty set.
pub fn aggregate_daily(
    city_id: i32,
    date: NaiveDate,
    readings: &[WeatherReading],
    astro: &AstroFields,
) -> Result<NewDailySummary, PipelineError> {
    if readings.is_empty() {
        return Err(PipelineError::NoReadings { city_id, date });
    }
    let count = readings.len() as f64;

    let max_temp_c = fold_max(readings.iter().map(|r| r.temp_c));
    let min_temp_c = readings
        .iter()
        .map(|r| r.temp_c)
        .fold(f64::INFINITY, f64::min);
    let avg_temp_c = readings.iter().map(|r| r.temp_c).sum::<f64>() / count;

    let max_wind_speed_kph = fold_max(readings.iter().map(|r| r.wind_speed_kph));
    let avg_wind_speed_kph = readings.iter().map(|r| r.wind_speed_kph).sum::<f64>() / count;

    let total_precip_mm = readings.iter().map(|r| r.precip_mm).sum::<f64>();
    let avg_humidity = readings.iter().map(|r| f64::from(r.humidity_perc)).sum::<f64>() / count;

    Ok(NewDailySummary {
        city_id,
        date,
        max_temp_c,
        min_temp_c,
        avg_temp_c,
        max_wind_speed_kph,
        // Derived from the kph aggregates, never maximized/averaged in mps
        // space directly.
        max_wind_speed_mps: max_wind_speed_kph / 3.6,
        avg_wind_speed_kph,
        avg_wind_speed_mps: avg_wind_speed_kph / 3.6,
        total_precip_mm,
        avg_humidity_perc: avg_humidity as i32,
        sunrise: astro.sunrise,
        sunset: astro.sunset,
        moonrise: astro.moonrise,
        moonset: astro.moonset,
        moon_phase: astro.moon_phase.clone(),
    })
}

fn fold_max(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(f64::NEG_INFINITY, f64::max)
}
