//! Repository for city, current_weather and daily_weather_analyses writes.
//!
//! All three tables carry a natural-key uniqueness constraint; every insert
//! goes through `ON CONFLICT ON CONSTRAINT ... DO UPDATE` with an
//! identity-preserving assignment so the statement always returns the
//! surrogate id of the affected row, whether it was just inserted or already
//! existed. After each upsert the table's id sequence is resynchronized to
//! `MAX(id)` inside the same transaction (see DESIGN.md on the resync).
//!
//! Idempotence contract: upserting the same natural key twice yields the same
//! id both times and exactly one row. This is enforced by the store-level
//! constraints and exercised against a live database, not unit tested here.

use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Transaction};

use super::models::{NewCity, NewDailySummary, NewWeatherReading, WeatherReading};

/// Upsert a city, returning its surrogate id.
///
/// On conflict the row's `name` is reassigned to itself — a no-op update that
/// forces Postgres to return the pre-existing id.
pub async fn upsert_city(pool: &PgPool, city: &NewCity) -> Result<i32, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let id: i32 = sqlx::query_scalar(
        "INSERT INTO city (name, region, country, time_zone, latitude, longitude)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT ON CONSTRAINT city_unique_constraint
         DO UPDATE SET name = EXCLUDED.name
         RETURNING id",
    )
    .bind(&city.name)
    .bind(&city.region)
    .bind(&city.country)
    .bind(&city.time_zone)
    .bind(city.latitude)
    .bind(city.longitude)
    .fetch_one(&mut *tx)
    .await?;

    resync_id_sequence(&mut tx, "city").await?;
    tx.commit().await?;
    Ok(id)
}

/// Upsert an hourly reading for a city, returning its surrogate id.
///
/// Conflicts on (city_id, date, time) perform a no-op `date` reassignment so
/// repeated ingestion of the same hour is idempotent.
pub async fn upsert_weather_reading(
    pool: &PgPool,
    reading: &NewWeatherReading,
    city_id: i32,
) -> Result<i32, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let id: i32 = sqlx::query_scalar(
        "INSERT INTO current_weather (
            city_id, date, time, temp_c, feels_like_c,
            weather_condition_code, weather_condition_text, weather_condition_icon,
            wind_speed_kph, wind_speed_mps, wind_dir,
            pressure_mb, precip_mm, humidity_perc, cloud_perc, uv_index
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ON CONFLICT ON CONSTRAINT weather_unique_constraint
        DO UPDATE SET date = EXCLUDED.date
        RETURNING id",
    )
    .bind(city_id)
    .bind(reading.date)
    .bind(reading.time)
    .bind(reading.temp_c)
    .bind(reading.feels_like_c)
    .bind(reading.weather_condition_code)
    .bind(&reading.weather_condition_text)
    .bind(&reading.weather_condition_icon)
    .bind(reading.wind_speed_kph)
    .bind(reading.wind_speed_mps)
    .bind(&reading.wind_dir)
    .bind(reading.pressure_mb)
    .bind(reading.precip_mm)
    .bind(reading.humidity_perc)
    .bind(reading.cloud_perc)
    .bind(reading.uv_index)
    .fetch_one(&mut *tx)
    .await?;

    resync_id_sequence(&mut tx, "current_weather").await?;
    tx.commit().await?;
    Ok(id)
}

/// Upsert a daily summary, returning its surrogate id.
pub async fn upsert_daily_summary(
    pool: &PgPool,
    summary: &NewDailySummary,
) -> Result<i32, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let id: i32 = sqlx::query_scalar(
        "INSERT INTO daily_weather_analyses (
            city_id, date,
            max_temp_c, min_temp_c, avg_temp_c,
            max_wind_speed_kph, max_wind_speed_mps,
            avg_wind_speed_kph, avg_wind_speed_mps,
            total_precip_mm, avg_humidity_perc,
            sunrise, sunset, moonrise, moonset, moon_phase
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ON CONFLICT ON CONSTRAINT daily_weather_unique_constraint
        DO UPDATE SET date = EXCLUDED.date
        RETURNING id",
    )
    .bind(summary.city_id)
    .bind(summary.date)
    .bind(summary.max_temp_c)
    .bind(summary.min_temp_c)
    .bind(summary.avg_temp_c)
    .bind(summary.max_wind_speed_kph)
    .bind(summary.max_wind_speed_mps)
    .bind(summary.avg_wind_speed_kph)
    .bind(summary.avg_wind_speed_mps)
    .bind(summary.total_precip_mm)
    .bind(summary.avg_humidity_perc)
    .bind(summary.sunrise)
    .bind(summary.sunset)
    .bind(summary.moonrise)
    .bind(summary.moonset)
    .bind(&summary.moon_phase)
    .fetch_one(&mut *tx)
    .await?;

    resync_id_sequence(&mut tx, "daily_weather_analyses").await?;
    tx.commit().await?;
    Ok(id)
}

/// Resolve a city's natural key to its surrogate id.
///
/// `None` is not an error: it signals the city has never been ingested, which
/// the nightly pipeline treats as a successful no-op.
pub async fn lookup_city_id(
    pool: &PgPool,
    name: &str,
    region: &str,
    country: &str,
) -> Result<Option<i32>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT id FROM city WHERE name = $1 AND region = $2 AND country = $3",
    )
    .bind(name)
    .bind(region)
    .bind(country)
    .fetch_optional(pool)
    .await
}

/// All readings for a city on a given date, ordered by time of day.
pub async fn readings_for_day(
    pool: &PgPool,
    city_id: i32,
    date: NaiveDate,
) -> Result<Vec<WeatherReading>, sqlx::Error> {
    sqlx::query_as::<_, WeatherReading>(
        "SELECT id, city_id, date, time, temp_c, feels_like_c,
                weather_condition_code, weather_condition_text, weather_condition_icon,
                wind_speed_kph, wind_speed_mps, wind_dir,
                pressure_mb, precip_mm, humidity_perc, cloud_perc, uv_index
         FROM current_weather
         WHERE city_id = $1 AND date = $2
         ORDER BY time",
    )
    .bind(city_id)
    .bind(date)
    .fetch_all(pool)
    .await
}

/// Set a table's id sequence to the current `MAX(id)`.
///
/// Runs inside the caller's upsert transaction so the resync commits
/// atomically with the write it follows. The table name is always one of the
/// three fixed repository tables, never user input.
async fn resync_id_sequence(
    tx: &mut Transaction<'_, Postgres>,
    table: &str,
) -> Result<(), sqlx::Error> {
    let stmt = format!(
        "SELECT setval(pg_get_serial_sequence('{}', 'id'), (SELECT MAX(id) FROM {}))",
        table, table
    );
    sqlx::query(&stmt).execute(&mut **tx).await?;
    Ok(())
}
