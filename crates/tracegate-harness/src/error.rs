//! Harness errors.

use thiserror::Error;
use tracegate_proto::ResourceId;
use tracegate_server::client::ClientError;

/// Errors raised while driving a distributed experiment.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Service never answered the liveness check
    #[error("service {addr} not reachable after {attempts} attempts")]
    Unreachable {
        /// Checked address
        addr: String,
        /// Checks made
        attempts: u32,
    },

    /// Request to a service failed
    #[error("request to {addr} failed: {source}")]
    Request {
        /// Target address
        addr: String,
        /// Underlying failure
        #[source]
        source: ClientError,
    },

    /// Service answered `ok:false`
    #[error("{kind} refused by {addr}: {reason}")]
    Refused {
        /// Request kind
        kind: &'static str,
        /// Target address
        addr: String,
        /// Error carried by the response
        reason: String,
    },

    /// Response lacked a field its request kind must carry
    #[error("{kind} response from {addr} is missing '{field}'")]
    MissingField {
        /// Request kind
        kind: &'static str,
        /// Target address
        addr: String,
        /// Absent field
        field: &'static str,
    },

    /// Workload names a resource with no configured node
    #[error("no resource node configured for {0}")]
    UnknownResource(ResourceId),

    /// Concurrent submission task failed
    #[error("submission task failed: {0}")]
    Task(String),

    /// Report could not be written
    #[error("report output failed: {0}")]
    Output(String),
}

impl HarnessError {
    pub(crate) fn request(addr: &str, source: ClientError) -> Self {
        Self::Request { addr: addr.to_owned(), source }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn messages_name_the_service() {
        let err = HarnessError::Unreachable { addr: "127.0.0.1:5001".into(), attempts: 30 };
        assert_eq!(err.to_string(), "service 127.0.0.1:5001 not reachable after 30 attempts");

        let err = HarnessError::Refused {
            kind: "RESET",
            addr: "n1:5001".into(),
            reason: "boom".into(),
        };
        assert_eq!(err.to_string(), "RESET refused by n1:5001: boom");
    }

    #[test]
    fn request_failures_keep_their_source() {
        let err = HarnessError::request("n1:5001", ClientError::Timeout(Duration::from_secs(1)));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("request to n1:5001 failed"));
    }
}
