//! Payload normalization for weatherapi.com responses.
//!
//! Pure mapping from raw JSON payloads into typed records. Every required
//! key is looked up explicitly; an absent or mistyped field fails the whole
//! mapping with the full dotted path, and no partial record escapes. Unit
//! and format conversions (kph → m/s, wind degree → compass point, combined
//! timestamp → date + time, 12-hour → 24-hour astro times) happen here and
//! nowhere else.

use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;

use crate::db::models::{NewCity, NewWeatherReading};
use crate::errors::PipelineError;

/// Astronomical events for one day, times already in 24-hour form.
#[derive(Debug, Clone, PartialEq)]
pub struct AstroFields {
    pub sunrise: NaiveTime,
    pub sunset: NaiveTime,
    pub moonrise: NaiveTime,
    pub moonset: NaiveTime,
    pub moon_phase: String,
}

/// 16-point compass rose, 22.5° per sector, N at 0°.
const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Map a wind direction in degrees to its compass label.
///
/// The +0.5 offset rounds to the nearest sector, so each label owns the
/// 22.5° band centred on its heading; the mod 16 wraps 348.75°..360° back
/// onto N.
pub fn degrees_to_compass(degrees: f64) -> &'static str {
    let index = (degrees / 22.5 + 0.5) as usize % 16;
    COMPASS_POINTS[index]
}

/// Map `location` into a city record. All fields copied verbatim.
pub fn normalize_city(payload: &Value) -> Result<NewCity, PipelineError> {
    Ok(NewCity {
        name: str_field(payload, "location.name")?,
        region: str_field(payload, "location.region")?,
        country: str_field(payload, "location.country")?,
        time_zone: str_field(payload, "location.tz_id")?,
        latitude: f64_field(payload, "location.lat")?,
        longitude: f64_field(payload, "location.lon")?,
    })
}

/// Map `current` into an hourly reading.
///
/// Splits `last_updated` ("YYYY-MM-DD HH:MM") into date and time, derives
/// `wind_speed_mps` from `wind_kph` and the compass label from `wind_degree`;
/// everything else is a verbatim copy.
pub fn normalize_reading(payload: &Value) -> Result<NewWeatherReading, PipelineError> {
    let last_updated = str_field(payload, "current.last_updated")?;
    let (date, time) = split_last_updated(&last_updated)?;

    let wind_speed_kph = f64_field(payload, "current.wind_kph")?;
    let wind_degree = f64_field(payload, "current.wind_degree")?;

    Ok(NewWeatherReading {
        date,
        time,
        temp_c: f64_field(payload, "current.temp_c")?,
        feels_like_c: f64_field(payload, "current.feelslike_c")?,
        weather_condition_code: i32_field(payload, "current.condition.code")?,
        weather_condition_text: str_field(payload, "current.condition.text")?,
        weather_condition_icon: str_field(payload, "current.condition.icon")?,
        wind_speed_kph,
        wind_speed_mps: wind_speed_kph / 3.6,
        wind_dir: degrees_to_compass(wind_degree).to_string(),
        pressure_mb: f64_field(payload, "current.pressure_mb")?,
        precip_mm: f64_field(payload, "current.precip_mm")?,
        humidity_perc: i32_field(payload, "current.humidity")?,
        cloud_perc: i32_field(payload, "current.cloud")?,
        uv_index: f64_field(payload, "current.uv")?,
    })
}

/// Map the astro block of a historical payload into [`AstroFields`],
/// converting each event time from 12-hour with meridiem to 24-hour.
pub fn normalize_astro(payload: &Value) -> Result<AstroFields, PipelineError> {
    const ASTRO: &str = "forecast.forecastday.0.astro";
    Ok(AstroFields {
        sunrise: astro_time(payload, "sunrise")?,
        sunset: astro_time(payload, "sunset")?,
        moonrise: astro_time(payload, "moonrise")?,
        moonset: astro_time(payload, "moonset")?,
        moon_phase: str_field(payload, &format!("{}.moon_phase", ASTRO))?,
    })
}

fn astro_time(payload: &Value, event: &str) -> Result<NaiveTime, PipelineError> {
    let path = format!("forecast.forecastday.0.astro.{}", event);
    let raw = str_field(payload, &path)?;
    NaiveTime::parse_from_str(&raw, "%I:%M %p").map_err(|_| {
        PipelineError::MalformedPayload(format!(
            "invalid `{}`: '{}' is not a 12-hour clock time",
            path, raw
        ))
    })
}

/// Split the combined "last updated" timestamp into date and time components.
fn split_last_updated(raw: &str) -> Result<(NaiveDate, NaiveTime), PipelineError> {
    let malformed = || {
        PipelineError::MalformedPayload(format!(
            "invalid `current.last_updated`: '{}' is not 'YYYY-MM-DD HH:MM'",
            raw
        ))
    };
    let (date_part, time_part) = raw
        .trim()
        .split_once(char::is_whitespace)
        .ok_or_else(&malformed)?;
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| malformed())?;
    let time = NaiveTime::parse_from_str(time_part, "%H:%M").map_err(|_| malformed())?;
    Ok((date, time))
}

// --- Dotted-path field access ---
//
// Path segments are object keys, or array indices when the segment parses as
// a number ("forecast.forecastday.0.astro"). The error always carries the
// full requested path.

fn field<'a>(payload: &'a Value, path: &str) -> Result<&'a Value, PipelineError> {
    let mut current = payload;
    for segment in path.split('.') {
        current = match segment.parse::<usize>() {
            Ok(index) => current.get(index),
            Err(_) => current.get(segment),
        }
        .ok_or_else(|| PipelineError::MalformedPayload(format!("missing field `{}`", path)))?;
    }
    Ok(current)
}

fn str_field(payload: &Value, path: &str) -> Result<String, PipelineError> {
    field(payload, path)?
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| PipelineError::MalformedPayload(format!("field `{}` is not a string", path)))
}

fn f64_field(payload: &Value, path: &str) -> Result<f64, PipelineError> {
    field(payload, path)?
        .as_f64()
        .ok_or_else(|| PipelineError::MalformedPayload(format!("field `{}` is not a number", path)))
}

/// Integer field; whole-valued floats are accepted since the upstream
/// serializer is not consistent about integer representation.
fn i32_field(payload: &Value, path: &str) -> Result<i32, PipelineError> {
    let value = field(payload, path)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|v| v.fract() == 0.0).map(|v| v as i64))
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| {
            PipelineError::MalformedPayload(format!("field `{}` is not an integer", path))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current_payload() -> Value {
        serde_json::json!({
            "location": {
                "name": "Sofia",
                "region": "Grad Sofiya",
                "country": "Bulgaria",
                "tz_id": "Europe/Sofia",
                "lat": 42.68,
                "lon": 23.31
            },
            "current": {
                "last_updated": "2024-05-01 14:30",
                "temp_c": 18.0,
                "feelslike_c": 17.2,
                "condition": {
                    "code": 1003,
                    "text": "Partly cloudy",
                    "icon": "//cdn.weatherapi.com/weather/64x64/day/116.png"
                },
                "wind_kph": 10.8,
                "wind_degree": 30,
                "pressure_mb": 1012.0,
                "precip_mm": 0.2,
                "humidity": 60,
                "cloud": 25,
                "uv": 4.0
            }
        })
    }

    fn history_payload() -> Value {
        serde_json::json!({
            "location": {
                "name": "Sofia",
                "region": "Grad Sofiya",
                "country": "Bulgaria",
                "tz_id": "Europe/Sofia",
                "lat": 42.68,
                "lon": 23.31
            },
            "forecast": {
                "forecastday": [
                    {
                        "astro": {
                            "sunrise": "06:32 AM",
                            "sunset": "08:24 PM",
                            "moonrise": "02:05 AM",
                            "moonset": "12:40 PM",
                            "moon_phase": "Waning Crescent"
                        }
                    }
                ]
            }
        })
    }

    #[test]
    fn test_normalize_city_copies_location_verbatim() {
        let city = normalize_city(&current_payload()).unwrap();
        assert_eq!(city.name, "Sofia");
        assert_eq!(city.region, "Grad Sofiya");
        assert_eq!(city.country, "Bulgaria");
        assert_eq!(city.time_zone, "Europe/Sofia");
        assert_eq!(city.latitude, 42.68);
        assert_eq!(city.longitude, 23.31);
    }

    #[test]
    fn test_normalize_reading_direct_fields() {
        let reading = normalize_reading(&current_payload()).unwrap();
        assert_eq!(reading.temp_c, 18.0);
        assert_eq!(reading.feels_like_c, 17.2);
        assert_eq!(reading.weather_condition_code, 1003);
        assert_eq!(reading.weather_condition_text, "Partly cloudy");
        assert_eq!(reading.pressure_mb, 1012.0);
        assert_eq!(reading.precip_mm, 0.2);
        assert_eq!(reading.humidity_perc, 60);
        assert_eq!(reading.cloud_perc, 25);
        assert_eq!(reading.uv_index, 4.0);
    }

    #[test]
    fn test_normalize_reading_splits_last_updated() {
        let reading = normalize_reading(&current_payload()).unwrap();
        assert_eq!(reading.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(reading.time, NaiveTime::from_hms_opt(14, 30, 0).unwrap());
    }

    #[test]
    fn test_normalize_reading_derives_mps_from_kph() {
        let reading = normalize_reading(&current_payload()).unwrap();
        assert_eq!(reading.wind_speed_kph, 10.8);
        assert!((reading.wind_speed_mps - 10.8 / 3.6).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_reading_wind_dir() {
        // 30° sits in the NNE sector (22.5°..45° centre band)
        let reading = normalize_reading(&current_payload()).unwrap();
        assert_eq!(reading.wind_dir, "NNE");
    }

    #[test]
    fn test_compass_boundaries() {
        assert_eq!(degrees_to_compass(0.0), "N");
        assert_eq!(degrees_to_compass(11.24), "N");
        assert_eq!(degrees_to_compass(11.25), "NNE");
        assert_eq!(degrees_to_compass(349.0), "N");
        assert_eq!(degrees_to_compass(360.0), "N");
    }

    #[test]
    fn test_compass_cardinal_points() {
        assert_eq!(degrees_to_compass(90.0), "E");
        assert_eq!(degrees_to_compass(180.0), "S");
        assert_eq!(degrees_to_compass(270.0), "W");
        assert_eq!(degrees_to_compass(337.5), "NNW");
    }

    #[test]
    fn test_missing_field_names_full_path() {
        let mut payload = current_payload();
        payload["current"]["condition"]
            .as_object_mut()
            .unwrap()
            .remove("code");
        match normalize_reading(&payload) {
            Err(PipelineError::MalformedPayload(msg)) => {
                assert!(msg.contains("current.condition.code"), "got: {}", msg);
            }
            other => panic!("expected malformed payload, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_location_key_fails_city() {
        let mut payload = current_payload();
        payload["location"].as_object_mut().unwrap().remove("tz_id");
        assert!(matches!(
            normalize_city(&payload),
            Err(PipelineError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_bad_last_updated_format() {
        let mut payload = current_payload();
        payload["current"]["last_updated"] = serde_json::json!("yesterday at noon");
        assert!(matches!(
            normalize_reading(&payload),
            Err(PipelineError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_normalize_astro_converts_to_24_hour() {
        let astro = normalize_astro(&history_payload()).unwrap();
        assert_eq!(astro.sunrise, NaiveTime::from_hms_opt(6, 32, 0).unwrap());
        assert_eq!(astro.sunset, NaiveTime::from_hms_opt(20, 24, 0).unwrap());
        assert_eq!(astro.moonrise, NaiveTime::from_hms_opt(2, 5, 0).unwrap());
        assert_eq!(astro.moonset, NaiveTime::from_hms_opt(12, 40, 0).unwrap());
        assert_eq!(astro.moon_phase, "Waning Crescent");
    }

    #[test]
    fn test_normalize_astro_midnight_noon() {
        let mut payload = history_payload();
        let astro = &mut payload["forecast"]["forecastday"][0]["astro"];
        astro["sunrise"] = serde_json::json!("12:01 AM");
        astro["sunset"] = serde_json::json!("12:01 PM");
        let parsed = normalize_astro(&payload).unwrap();
        assert_eq!(parsed.sunrise, NaiveTime::from_hms_opt(0, 1, 0).unwrap());
        assert_eq!(parsed.sunset, NaiveTime::from_hms_opt(12, 1, 0).unwrap());
    }

    #[test]
    fn test_normalize_astro_missing_day_entry() {
        let payload = serde_json::json!({"forecast": {"forecastday": []}});
        match normalize_astro(&payload) {
            Err(PipelineError::MalformedPayload(msg)) => {
                assert!(msg.contains("forecast.forecastday.0.astro"), "got: {}", msg);
            }
            other => panic!("expected malformed payload, got {:?}", other),
        }
    }

    #[test]
    fn test_normalize_astro_unparseable_time() {
        let mut payload = history_payload();
        payload["forecast"]["forecastday"][0]["astro"]["moonrise"] =
            serde_json::json!("No moonrise");
        assert!(matches!(
            normalize_astro(&payload),
            Err(PipelineError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_integer_humidity_from_float_payload() {
        // weatherapi sometimes serializes integers as floats
        let mut payload = current_payload();
        payload["current"]["humidity"] = serde_json::json!(60.0);
        assert_eq!(normalize_reading(&payload).unwrap().humidity_perc, 60);
    }

    #[test]
    fn test_fractional_humidity_rejected() {
        let mut payload = current_payload();
        payload["current"]["humidity"] = serde_json::json!(60.5);
        assert!(matches!(
            normalize_reading(&payload),
            Err(PipelineError::MalformedPayload(_))
        ));
    }
}
