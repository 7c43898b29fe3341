//! API error taxonomy.
//!
//! Every failure the poller can see falls into one of two classes:
//!
//!   Connection — the backend could not be reached at all, or went away
//!                mid-response (refused, timed out, DNS, cut-off body).
//!                Drives the disconnected banner.
//!   Data       — the backend answered, but with an error status or a
//!                payload we could not decode. Logged only.

use http::StatusCode;
use thiserror::Error;

/// Longest slice of an error body kept in [`ApiError::Status`].
const MAX_ERROR_BODY: usize = 500;

/// Coarse classification used by the poller to reconcile state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Connection,
    Data,
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend could not be reached.
    #[error("{message}")]
    Connection { message: String },

    /// The backend answered with a non-success status.
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: StatusCode,
        body: String,
    },

    /// The backend answered but the body was not the expected JSON.
    #[error("malformed response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// Any other client-side failure (bad URL, redirect loop).
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
}

impl ApiError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into() }
    }

    pub fn status(endpoint: impl Into<String>, status: StatusCode, body: &str) -> Self {
        Self::Status {
            endpoint: endpoint.into(),
            status,
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        }
    }

    /// Map a reqwest failure onto the taxonomy.
    ///
    /// Refused connections, timeouts and DNS failures surface from reqwest
    /// as connect/timeout/request errors. A body cut off mid-read shows up
    /// as a body or decode error (JSON is decoded by us, never by reqwest).
    /// All of those mean the backend went away and are connection-class.
    pub fn from_reqwest(endpoint: &str, base_url: &str, err: reqwest::Error) -> Self {
        if err.is_connect()
            || err.is_timeout()
            || err.is_request()
            || err.is_body()
            || err.is_decode()
        {
            Self::Connection {
                message: format!(
                    "Unable to connect to API server at {}. Make sure the server is running.",
                    base_url
                ),
            }
        } else {
            Self::Transport {
                endpoint: endpoint.to_string(),
                source: err,
            }
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Connection { .. } => ErrorClass::Connection,
            Self::Status { .. } | Self::Decode { .. } | Self::Transport { .. } => ErrorClass::Data,
        }
    }

    pub fn is_connection_error(&self) -> bool {
        self.class() == ErrorClass::Connection
    }
}
