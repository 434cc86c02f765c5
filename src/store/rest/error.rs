//! Error types shared by the REST storage implementation.

use reqwest::StatusCode;
use thiserror::Error;

use crate::store::error::StoreError;

/// Convenient result alias returning [`RestDaoError`] failures.
pub type RestResult<T> = Result<T, RestDaoError>;

/// Failures that can occur while talking to the row API.
#[derive(Debug, Error)]
pub enum RestDaoError {
    /// Required environment variable is missing.
    #[error("missing store environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the missing variable.
        var: &'static str,
    },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build store client")]
    ClientBuilder {
        /// Builder failure.
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent.
    #[error("failed to send store request to `{path}`")]
    RequestSend {
        /// Table path the request targeted.
        path: String,
        /// Transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// The API returned an unexpected status code.
    #[error("unexpected store response status {status} for `{path}`")]
    RequestStatus {
        /// Table path the request targeted.
        path: String,
        /// Status returned by the API.
        status: StatusCode,
    },
    /// An insert hit a row that already exists.
    #[error("row `{id}` already exists in `{table}`")]
    Conflict {
        /// Table the insert targeted.
        table: &'static str,
        /// Conflicting row id.
        id: String,
    },
    /// An insert succeeded but the API returned no representation.
    #[error("insert into `{table}` returned no row")]
    EmptyInsert {
        /// Table the insert targeted.
        table: &'static str,
    },
    /// Response payload could not be parsed into the expected rows.
    #[error("failed to decode store response for `{path}`")]
    DecodeResponse {
        /// Table path the request targeted.
        path: String,
        /// Decoding failure.
        #[source]
        source: reqwest::Error,
    },
}

impl From<RestDaoError> for StoreError {
    fn from(err: RestDaoError) -> Self {
        match err {
            RestDaoError::Conflict { table, id } => StoreError::Conflict { table, id },
            other => StoreError::unavailable(other.to_string(), other),
        }
    }
}
