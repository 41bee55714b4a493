use chrono_tz::Tz;

/// One city the scheduler drives: the display name sent to the weather API
/// plus the IANA timezone used to resolve its local calendar day.
#[derive(Debug, Clone)]
pub struct CityJob {
    pub city: String,
    pub timezone: Tz,
}

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub weather_api_key: String,
    pub weather_api_base_url: String,
    pub port: u16,
    /// Cities ingested hourly and summarized nightly.
    pub cities: Vec<CityJob>,
}

/// Default city roster when `CITIES` is unset.
const DEFAULT_CITIES: &str =
    "Sofia=Europe/Sofia,Rome=Europe/Rome,London=Europe/London,New York=America/New_York";

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            weather_api_key: std::env::var("WEATHER_API_KEY")
                .expect("WEATHER_API_KEY must be set"),
            weather_api_base_url: std::env::var("WEATHER_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.weatherapi.com".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("PORT must be a valid u16"),
            cities: parse_cities(
                &std::env::var("CITIES").unwrap_or_else(|_| DEFAULT_CITIES.to_string()),
            )
            .expect("CITIES must be a comma-separated list of City=IANA/Zone pairs"),
        }
    }
}

/// Parse a `City=Zone,City=Zone` list into city jobs.
///
/// City names may contain spaces ("New York"); zones must be valid IANA
/// identifiers. Empty entries are skipped; an empty result is an error so a
/// misconfigured service fails at startup rather than idling forever.
pub fn parse_cities(raw: &str) -> Result<Vec<CityJob>, String> {
    let mut jobs = Vec::new();
    for entry in raw.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (city, zone) = entry
            .split_once('=')
            .ok_or_else(|| format!("expected City=Zone, got '{}'", entry))?;
        let city = city.trim();
        let zone = zone.trim();
        if city.is_empty() {
            return Err(format!("empty city name in '{}'", entry));
        }
        let timezone: Tz = zone
            .parse()
            .map_err(|_| format!("unknown IANA timezone '{}'", zone))?;
        jobs.push(CityJob {
            city: city.to_string(),
            timezone,
        });
    }
    if jobs.is_empty() {
        return Err("no cities configured".to_string());
    }
    Ok(jobs)
}
