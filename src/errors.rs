use chrono::NaiveDate;

/// Errors that terminate a pipeline run.
///
/// Stage failures are never caught and converted mid-pipeline; they propagate
/// to the caller and the enclosing run ends. Writes committed before the
/// failure point stay committed — the pipelines are not transactional
/// end-to-end.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The weather API request failed or returned a non-success status.
    /// Carries the full request URL for operator diagnosis.
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// A required key was absent from an API payload, or a field could not
    /// be parsed. Not retried — the payload will not improve on a retry.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stage exceeded its overall timeout budget, retries included.
    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: &'static str, seconds: u64 },

    /// Nightly aggregation found zero readings for the target day. A summary
    /// is never fabricated from an empty day; this usually means the hourly
    /// ingestion did not run.
    #[error("no weather readings for city {city_id} on {date}")]
    NoReadings { city_id: i32, date: NaiveDate },
}
