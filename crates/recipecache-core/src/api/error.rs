use reqwest::StatusCode;
use thiserror::Error;

/// Failure of one catalog request.
///
/// Every variant ends up as the message of an `ApiResponse::Error`, so the
/// `Display` text is what a user sees next to cached results.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Recipe not found in catalog: {0}")]
    NotFound(String),

    #[error("Catalog is rate limiting requests, try again shortly")]
    RateLimited,

    #[error("Server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("Catalog rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Longest catalog error body kept in a message, in characters
const MAX_BODY_CHARS: usize = 200;

fn excerpt(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_BODY_CHARS) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

impl ApiError {
    /// Classify a non-success, non-429 catalog status.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let body = excerpt(body);
        match status {
            StatusCode::NOT_FOUND => ApiError::NotFound(body),
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
            s if s.is_server_error() => ApiError::Server {
                status: s.as_u16(),
                body,
            },
            s => ApiError::Rejected {
                status: s.as_u16(),
                body,
            },
        }
    }

    /// Whether repeating the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited | ApiError::Server { .. } | ApiError::Network(_)
        )
    }
}
