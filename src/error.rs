//! The five error kinds of the core, each with a fixed disposition.
//!
//! Every error that crosses a component boundary is funneled through one
//! of these variants so the disposition (log-and-continue,
//! surface-to-browser, 4xx, log-and-fall-through, or exit(1)) is decided
//! in exactly one place per boundary, rather than re-derived ad hoc at
//! call sites.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;

/// A core error, tagged with the disposition its kind implies.
#[derive(Debug, thiserror::Error)]
pub enum PeaqueError {
    /// Malformed configuration or an unreadable project root.
    ///
    /// Disposition: log and continue with defaults; never fatal in dev.
    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A non-async export in a `'use server'` file, `export *` in one, or
    /// any other failure to transform a source module.
    ///
    /// Disposition: fail the transform; serve a synthesized module whose
    /// top-level throws the diagnostic so the failure surfaces in the
    /// browser console instead of silently producing broken output.
    #[error("source error in {file}: {message}")]
    Source { file: String, message: String },

    /// No handler for the HTTP method, RPC function missing, or a path
    /// that doesn't resolve under the project root.
    ///
    /// Disposition: 4xx with a short body, no stack trace.
    #[error("not found: {detail}")]
    NotFound { detail: String },

    /// A cache file was corrupted or a compressed sibling failed to write.
    ///
    /// Disposition: log a warning, fall through to the uncached/uncompressed
    /// path; the request still succeeds.
    #[error("transient error: {message}")]
    Transient {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The port is already in use, or a startup script threw.
    ///
    /// Disposition: log and exit the process with code 1.
    #[error("fatal error: {message}")]
    Fatal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl PeaqueError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn source(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::NotFound {
            detail: detail.into(),
        }
    }

    pub fn transient(message: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Transient {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
            source: None,
        }
    }

    /// The HTTP status this error maps to when it crosses the axum boundary.
    pub fn status(&self) -> StatusCode {
        match self {
            PeaqueError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            PeaqueError::Source { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            PeaqueError::NotFound { .. } => StatusCode::NOT_FOUND,
            PeaqueError::Transient { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            PeaqueError::Fatal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A wrapper that lets axum handlers return `Result<_, anyhow::Error>` (or
/// `PeaqueError`) directly via `?`.
pub struct ServerError(pub anyhow::Error);

impl fmt::Debug for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl<E> From<E> for ServerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self
            .0
            .downcast_ref::<PeaqueError>()
            .map(PeaqueError::status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        tracing::error!(error = ?self.0, %status, "request failed");
        (status, self.0.to_string()).into_response()
    }
}
