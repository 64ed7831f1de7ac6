//! Metadata fetch errors.

use std::error::Error as StdError;
use std::io;

use thiserror::Error;

/// Broad category of a fetch failure. Retry behavior is the same for all
/// of them; only the operator hint differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// The metadata host name could not be resolved.
    Dns,
    /// The network is down or the metadata server is unreachable.
    Network,
    /// Anything else (bad status, undecodable body, timeouts, ...).
    Other,
}

/// A failed metadata fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("dns error requesting metadata: {0}")]
    Dns(String),

    #[error("network error requesting metadata: {0}")]
    Network(String),

    #[error("metadata server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid metadata response: {0}")]
    Decode(String),

    #[error("metadata request failed: {0}")]
    Request(String),
}

impl FetchError {
    /// Build from a transport error, classifying by its source chain.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let message = error_chain(&err);
        if err.is_decode() {
            return Self::Decode(message);
        }
        match classify(&err) {
            FetchErrorKind::Dns => Self::Dns(message),
            FetchErrorKind::Network => Self::Network(message),
            FetchErrorKind::Other if err.is_connect() => Self::Network(message),
            FetchErrorKind::Other => Self::Request(message),
        }
    }

    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Dns(_) => FetchErrorKind::Dns,
            FetchError::Network(_) => FetchErrorKind::Network,
            FetchError::Status { .. } | FetchError::Decode(_) | FetchError::Request(_) => {
                FetchErrorKind::Other
            }
        }
    }

    /// Actionable advice for the operator, if the failure has a likely fix.
    pub fn hint(&self) -> Option<&'static str> {
        match self.kind() {
            FetchErrorKind::Dns => Some(
                "DNS error when requesting metadata, check DNS settings and ensure \
                 metadata.google.internal is setup in your hosts file.",
            ),
            FetchErrorKind::Network => Some(
                "Network error when requesting metadata, make sure your instance has an \
                 active network and can reach the metadata server.",
            ),
            FetchErrorKind::Other => None,
        }
    }
}

/// Classify an error by walking its source chain.
pub fn classify(err: &(dyn StdError + 'static)) -> FetchErrorKind {
    let mut network = false;
    let mut current = Some(err);
    while let Some(e) = current {
        let text = e.to_string().to_ascii_lowercase();
        if text.contains("dns error")
            || text.contains("failed to lookup address")
            || text.contains("name or service not known")
            || text.contains("no such host")
        {
            return FetchErrorKind::Dns;
        }
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            network |= matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::AddrNotAvailable
                    | io::ErrorKind::NetworkUnreachable
                    | io::ErrorKind::HostUnreachable
                    | io::ErrorKind::NetworkDown
            );
        }
        current = e.source();
    }
    if network {
        FetchErrorKind::Network
    } else {
        FetchErrorKind::Other
    }
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if parts.last() != Some(&text) {
            parts.push(text);
        }
        source = cause.source();
    }
    parts.join(": ")
}
