//! weatherapi.com client.
//!
//! Fetches current conditions and single-day history as raw JSON. The two
//! endpoints share one GET-and-validate path; payload interpretation lives in
//! the normalizer, so a schema change upstream fails at the mapping boundary
//! with a field-level error rather than here.

use chrono::NaiveDate;
use serde_json::Value;

use crate::errors::PipelineError;
use crate::services::retry::{with_policy, RetryPolicy, FETCH_POLICY};

/// Path of the "current conditions" endpoint.
const CURRENT_PATH: &str = "/v1/current.json";
/// Path of the "single historical day" endpoint.
const HISTORY_PATH: &str = "/v1/history.json";

/// Client for the weatherapi.com realtime and history APIs.
#[derive(Debug, Clone)]
pub struct WeatherApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl WeatherApiClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            retry: FETCH_POLICY,
        }
    }

    /// Replace the retry policy. Tests use this to shrink delays.
    #[cfg(test)]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// URL of the current-conditions endpoint for a city.
    pub fn current_url(&self, city: &str) -> String {
        format!(
            "{}{}?key={}&q={}",
            self.base_url, CURRENT_PATH, self.api_key, city
        )
    }

    /// URL of the historical endpoint for a city and calendar date.
    pub fn history_url(&self, city: &str, date: NaiveDate) -> String {
        format!(
            "{}{}?key={}&q={}&dt={}",
            self.base_url,
            HISTORY_PATH,
            self.api_key,
            city,
            date.format("%Y-%m-%d")
        )
    }

    /// Fetch current conditions for a city.
    pub async fn fetch_current(&self, city: &str) -> Result<Value, PipelineError> {
        let url = self.current_url(city);
        with_policy(&self.retry, "current weather fetch", || self.get_json(&url)).await
    }

    /// Fetch one historical day for a city.
    pub async fn fetch_history(&self, city: &str, date: NaiveDate) -> Result<Value, PipelineError> {
        let url = self.history_url(city, date);
        with_policy(&self.retry, "historical weather fetch", || {
            self.get_json(&url)
        })
        .await
    }

    /// One GET attempt: validate the status, parse the body as JSON.
    async fn get_json(&self, url: &str) -> Result<Value, PipelineError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::Fetch {
                url: url.to_string(),
                reason: format!("request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(PipelineError::Fetch {
                url: url.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        response.json().await.map_err(|e| PipelineError::Fetch {
            url: url.to_string(),
            reason: format!("JSON parse error: {}", e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quick_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            delay: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_current_url_shape() {
        let client = WeatherApiClient::new("https://api.weatherapi.com", "k123");
        assert_eq!(
            client.current_url("Sofia"),
            "https://api.weatherapi.com/v1/current.json?key=k123&q=Sofia"
        );
    }

    #[test]
    fn test_history_url_shape() {
        let client = WeatherApiClient::new("https://api.weatherapi.com/", "k123");
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(
            client.history_url("New York", date),
            "https://api.weatherapi.com/v1/history.json?key=k123&q=New York&dt=2024-05-01"
        );
    }

    #[tokio::test]
    async fn test_fetch_current_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/current.json"))
            .and(query_param("q", "Sofia"))
            .and(query_param("key", "k123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"location": {"name": "Sofia"}})),
            )
            .mount(&server)
            .await;

        let client =
            WeatherApiClient::new(&server.uri(), "k123").with_retry_policy(quick_retry());
        let payload = client.fetch_current("Sofia").await.unwrap();
        assert_eq!(payload["location"]["name"], "Sofia");
    }

    #[tokio::test]
    async fn test_fetch_error_carries_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/current.json"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client =
            WeatherApiClient::new(&server.uri(), "bad-key").with_retry_policy(quick_retry());
        match client.fetch_current("Sofia").await {
            Err(PipelineError::Fetch { url, reason }) => {
                assert!(url.contains("/v1/current.json"));
                assert!(url.contains("q=Sofia"));
                assert!(reason.contains("403"));
            }
            other => panic!("expected fetch error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_fetch_retries_exhaust_on_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/current.json"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3) // initial attempt + 2 retries
            .mount(&server)
            .await;

        let client =
            WeatherApiClient::new(&server.uri(), "k123").with_retry_policy(quick_retry());
        assert!(client.fetch_current("Sofia").await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_history_sends_date() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/history.json"))
            .and(query_param("dt", "2024-03-10"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"forecast": {}})),
            )
            .mount(&server)
            .await;

        let client =
            WeatherApiClient::new(&server.uri(), "k123").with_retry_policy(quick_retry());
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert!(client.fetch_history("Rome", date).await.is_ok());
    }

    #[tokio::test]
    async fn test_non_json_body_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/current.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let client =
            WeatherApiClient::new(&server.uri(), "k123").with_retry_policy(quick_retry());
        assert!(matches!(
            client.fetch_current("Sofia").await,
            Err(PipelineError::Fetch { .. })
        ));
    }
}
