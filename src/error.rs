//! Error handling

use axum::response::IntoResponse;
use tracing::info;

/// Errors raised by the pipeline, the activation flow and their collaborators.
#[derive(Debug, thiserror::Error)]
pub enum WallpaperError {
    /// The prompt run did not complete within the polling budget
    #[error("provider timed out after {attempts} attempts")]
    ProviderTimeout {
        /// How many polls were made before giving up
        attempts: u32,
    },
    /// An upstream API rejected the call or failed
    #[error("{0}")]
    Provider(String),
    /// An upstream call failed in a way that may succeed if repeated
    #[error("transient provider error: {0}")]
    Transient(String),
    /// Provider content could not be parsed at all
    #[error("malformed provider content: {0}")]
    MalformedContent(String),
    /// Parsed content failed structural validation
    #[error("schema violation: {0}")]
    SchemaViolation(String),
    /// The provider returned zero usable items
    #[error("{0} returned nothing")]
    EmptyResult(String),
    /// The provider answered with something other than the expected shape
    #[error("unexpected reply shape: {0}")]
    UnexpectedShape(String),
    /// Object storage failure
    #[error("storage error: {0}")]
    Storage(String),
    /// Image CDN failure
    #[error("image cdn error: {0}")]
    Cdn(String),
    /// Downloaded bytes were not a decodable image
    #[error("image decode error: {0}")]
    ImageDecode(String),
    /// When DB operations fail
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    /// When a requested resource is not found
    #[error("not found: {0}")]
    NotFound(String),
    /// Missing or invalid admin token
    #[error("unauthorized")]
    Unauthorized,
    /// The service is missing configuration for the request
    #[error("configuration error: {0}")]
    Config(String),
}

impl WallpaperError {
    /// True for failures the caller may retry within a bounded budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WallpaperError::Transient(_))
    }
}

impl From<reqwest::Error> for WallpaperError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            WallpaperError::Transient(err.to_string())
        } else {
            WallpaperError::Provider(err.to_string())
        }
    }
}

impl From<object_store::Error> for WallpaperError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => WallpaperError::NotFound(path),
            other => WallpaperError::Storage(other.to_string()),
        }
    }
}

impl From<image::ImageError> for WallpaperError {
    fn from(err: image::ImageError) -> Self {
        WallpaperError::ImageDecode(err.to_string())
    }
}

impl From<url::ParseError> for WallpaperError {
    fn from(err: url::ParseError) -> Self {
        WallpaperError::Config(err.to_string())
    }
}

impl IntoResponse for WallpaperError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            WallpaperError::Unauthorized => {
                info!("Unauthorized request received");
                axum::http::StatusCode::UNAUTHORIZED
            }
            WallpaperError::NotFound(what) => {
                info!("404 {what}");
                axum::http::StatusCode::NOT_FOUND
            }
            WallpaperError::Config(message) => {
                info!("Refusing request, {message}");
                axum::http::StatusCode::FORBIDDEN
            }
            WallpaperError::ProviderTimeout { .. }
            | WallpaperError::Provider(_)
            | WallpaperError::Transient(_)
            | WallpaperError::MalformedContent(_)
            | WallpaperError::SchemaViolation(_)
            | WallpaperError::EmptyResult(_)
            | WallpaperError::UnexpectedShape(_)
            | WallpaperError::Cdn(_) => {
                tracing::error!("Upstream error: {}", self);
                axum::http::StatusCode::BAD_GATEWAY
            }
            WallpaperError::Storage(_)
            | WallpaperError::ImageDecode(_)
            | WallpaperError::Database(_) => {
                tracing::error!("Internal server error: {}", self);
                axum::http::StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = match status {
            axum::http::StatusCode::UNAUTHORIZED => "Unauthorized: invalid or missing token.",
            axum::http::StatusCode::NOT_FOUND => "Not Found",
            axum::http::StatusCode::FORBIDDEN => "Forbidden",
            axum::http::StatusCode::BAD_GATEWAY => "Upstream provider error",
            _ => "Internal server error",
        };
        let mut response = axum::response::Response::new(axum::body::Body::from(body));
        *response.status_mut() = status;
        response
    }
}
