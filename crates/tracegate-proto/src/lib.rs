//! Tracegate wire protocol.
//!
//! Value types shared by every Tracegate component and the newline-delimited
//! JSON encoding used between the harness, resource nodes and the
//! coordinator.
//!
//! # Wire Format
//!
//! Each connection carries exactly one request line and one response line:
//!
//! ```text
//! client -> server: {"type":"PROCESS_ML","interaction":{...},"snapshot":{...}}\n
//! server -> client: {"ok":true,"admitted":false,"latency_us":12.5}\n
//! ```
//!
//! The connection is closed after the response. Requests are a closed
//! [`Request`] enum tagged by `type`; responses are a single [`Response`]
//! shape whose fields are present only when meaningful for the request kind.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod errors;
pub mod message;
pub mod types;

pub use errors::{ProtocolError, Result};
pub use message::{Request, Response, decode_request, decode_response, encode_line};
pub use types::{
    Action, AgentId, Interaction, MechanismTag, PermissionRecord, ResourceId, ResourceState,
    TraceEntry,
};

/// Maximum accepted length of a single protocol line, in bytes.
///
/// A full `GET_TRACE` response for a long experiment run is the largest
/// message on the wire, so this is sized for responses rather than requests.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;
