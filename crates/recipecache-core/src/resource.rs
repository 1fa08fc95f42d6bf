//! Lifecycle types shared by the sync engine and its consumers.

use std::fmt::Display;

/// State of a value being synchronized between the cache and the catalog.
///
/// `Loading` and `Error` carry whatever was known before the refresh so that
/// consumers can keep showing it.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource<T> {
    Loading(Option<T>),
    Success(T),
    Error { message: String, data: Option<T> },
}

impl<T> Resource<T> {
    pub fn error(message: impl Into<String>, data: Option<T>) -> Self {
        Resource::Error {
            message: message.into(),
            data,
        }
    }

    /// The value attached to this state, if any.
    pub fn data(&self) -> Option<&T> {
        match self {
            Resource::Loading(data) => data.as_ref(),
            Resource::Success(data) => Some(data),
            Resource::Error { data, .. } => data.as_ref(),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Resource::Loading(_))
    }

    /// `Success` and `Error` end a refresh; `Loading` never does.
    pub fn is_terminal(&self) -> bool {
        !self.is_loading()
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Resource::Error { message, .. } => Some(message),
            _ => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Resource::Loading(_) => "loading",
            Resource::Success(_) => "success",
            Resource::Error { .. } => "error",
        }
    }
}

/// Outcome of exactly one call to the catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse<W> {
    Success(W),
    /// Well-formed response without content (HTTP 204, blank body, null entity).
    Empty,
    Error(String),
}

impl<W> ApiResponse<W> {
    /// Fold a client result into an outcome. `Ok(None)` is an empty response.
    pub fn from_result<E: Display>(result: Result<Option<W>, E>) -> Self {
        match result {
            Ok(Some(body)) => ApiResponse::Success(body),
            Ok(None) => ApiResponse::Empty,
            Err(e) => ApiResponse::Error(e.to_string()),
        }
    }
}
