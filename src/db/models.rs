use chrono::{NaiveDate, NaiveTime};
use sqlx::FromRow;

/// A normalized city, ready for upsert. Natural key: (name, region, country).
/// The surrogate `id` is assigned by the store on first insert and returned
/// unchanged by every later upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCity {
    pub name: String,
    pub region: String,
    pub country: String,
    pub time_zone: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// A normalized hourly observation, ready for upsert once a city id is known.
/// Natural key: (city_id, date, time).
///
/// Invariant: `wind_speed_mps` is always `wind_speed_kph / 3.6`, derived at
/// normalization time and never set independently.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWeatherReading {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub temp_c: f64,
    pub feels_like_c: f64,
    pub weather_condition_code: i32,
    pub weather_condition_text: String,
    pub weather_condition_icon: String,
    pub wind_speed_kph: f64,
    pub wind_speed_mps: f64,
    pub wind_dir: String,
    pub pressure_mb: f64,
    pub precip_mm: f64,
    pub humidity_perc: i32,
    pub cloud_perc: i32,
    pub uv_index: f64,
}

/// A stored hourly observation, as read back for aggregation.
#[derive(Debug, Clone, FromRow)]
#[allow(dead_code)] // All fields populated by FromRow; aggregation reads a subset
pub struct WeatherReading {
    pub id: i32,
    pub city_id: i32,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub temp_c: f64,
    pub feels_like_c: f64,
    pub weather_condition_code: i32,
    pub weather_condition_text: String,
    pub weather_condition_icon: String,
    pub wind_speed_kph: f64,
    pub wind_speed_mps: f64,
    pub wind_dir: String,
    pub pressure_mb: f64,
    pub precip_mm: f64,
    pub humidity_perc: i32,
    pub cloud_perc: i32,
    pub uv_index: f64,
}

/// A daily per-city summary, ready for upsert. Natural key: (city_id, date).
///
/// The mps wind aggregates are derived from their kph counterparts
/// (`kph / 3.6`), never independently aggregated in mps space.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDailySummary {
    pub city_id: i32,
    pub date: NaiveDate,
    pub max_temp_c: f64,
    pub min_temp_c: f64,
    pub avg_temp_c: f64,
    pub max_wind_speed_kph: f64,
    pub max_wind_speed_mps: f64,
    pub avg_wind_speed_kph: f64,
    pub avg_wind_speed_mps: f64,
    pub total_precip_mm: f64,
    pub avg_humidity_perc: i32,
    pub sunrise: NaiveTime,
    pub sunset: NaiveTime,
    pub moonrise: NaiveTime,
    pub moonset: NaiveTime,
    pub moon_phase: String,
}
