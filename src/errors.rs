//! Typed error hierarchy for HikeBot.
//!
//! - `HikeError`: social/auth domain failures surfaced to API callers
//! - `LlmError`: language-model client failures
//! - `ReportError`: trip-report lookups
//! - `SeedError`: offline trail seeding

use thiserror::Error;

/// Domain errors from the API and dashboard handlers.
#[derive(Debug, Error)]
pub enum HikeError {
    #[error("User not found")]
    UserNotFound,

    #[error("Group {id} not found")]
    GroupNotFound { id: String },

    #[error("Request not found")]
    RequestNotFound,

    #[error("Not a member of group {group_id}")]
    NotMember { group_id: String },

    #[error("{0}")]
    Forbidden(String),

    #[error("Invalid auth headers")]
    Unauthorized,

    #[error("{0}")]
    Validation(String),

}

/// Errors from the OpenAI-compatible completion client.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("LLM response had no choices")]
    EmptyResponse,

    #[error("LLM response was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Errors from trip-report lookups.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Errors from the offline trail seeder.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Place '{place}' could not be geocoded")]
    PlaceNotFound { place: String },

    #[error("Overpass request failed: {0}")]
    Overpass(String),

    #[error("Geocoding failed: {0}")]
    Geocode(String),

    #[error("Invalid point '{0}': expected LAT,LON")]
    InvalidPoint(String),

    #[error("Invalid table name '{0}'")]
    InvalidTable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
