//! Request and response messages plus the line codec.

use serde::{Deserialize, Serialize};

use crate::{
    MAX_LINE_BYTES,
    errors::{ProtocolError, Result},
    types::{AgentId, Interaction, ResourceState, TraceEntry},
};

/// Every request a Tracegate service understands.
///
/// Resource nodes answer everything except `PROCESS_MD`; the coordinator
/// answers only `PROCESS_MD` and `PING`. Each service rejects the other's
/// kinds with `{ok:false, error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    /// Snapshot of the node's resource state
    GetState,

    /// Descriptive mechanism: record and apply without validation
    ProcessMp {
        /// Interaction to record
        interaction: Interaction,
    },

    /// Locally validated mechanism
    ProcessMl {
        /// Interaction to validate
        interaction: Interaction,
        /// Frozen state to validate against instead of the live state
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<ResourceState>,
    },

    /// Coordinator-issued commit of an already-made decision
    Commit {
        /// Interaction decided on
        interaction: Interaction,
        /// Coordinator's decision
        admitted: bool,
        /// Target resource state the coordinator evaluated against
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state_snapshot: Option<ResourceState>,
    },

    /// Full audit trace of the node
    GetTrace,

    /// Drop all state and trace, re-authorize the given agents
    Reset {
        /// Agents authorized after the reset
        #[serde(default)]
        agents: Vec<AgentId>,
    },

    /// Directed mechanism, handled by the coordinator
    ProcessMd {
        /// Interaction to admit or reject
        interaction: Interaction,
    },

    /// Liveness check
    Ping,
}

impl Request {
    /// Wire names of all request kinds.
    pub const KINDS: [&'static str; 8] = [
        "GET_STATE",
        "PROCESS_MP",
        "PROCESS_ML",
        "COMMIT",
        "GET_TRACE",
        "RESET",
        "PROCESS_MD",
        "PING",
    ];

    /// Wire name of this request's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetState => "GET_STATE",
            Self::ProcessMp { .. } => "PROCESS_MP",
            Self::ProcessMl { .. } => "PROCESS_ML",
            Self::Commit { .. } => "COMMIT",
            Self::GetTrace => "GET_TRACE",
            Self::Reset { .. } => "RESET",
            Self::ProcessMd { .. } => "PROCESS_MD",
            Self::Ping => "PING",
        }
    }

    /// Interaction carried by the request, if any.
    pub fn interaction(&self) -> Option<&Interaction> {
        match self {
            Self::ProcessMp { interaction }
            | Self::ProcessMl { interaction, .. }
            | Self::Commit { interaction, .. }
            | Self::ProcessMd { interaction } => Some(interaction),
            Self::GetState | Self::GetTrace | Self::Reset { .. } | Self::Ping => None,
        }
    }
}

/// Response to any request.
///
/// Only the fields meaningful for the request kind are set; absent fields are
/// omitted on the wire. `PROCESS_MD` responses carry no `ok` field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Response {
    /// Whether the request was handled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    /// Error message when `ok` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Resource state (`GET_STATE`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ResourceState>,
    /// Admission decision (`PROCESS_*`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admitted: Option<bool>,
    /// Handling latency in microseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_us: Option<f64>,
    /// Coordinator state collection latency in microseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collect_latency_us: Option<f64>,
    /// Coordinator evaluation latency in microseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_latency_us: Option<f64>,
    /// Audit trace (`GET_TRACE`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<TraceEntry>>,
}

impl Response {
    /// `{ok:true}`
    pub fn ok() -> Self {
        Self { ok: Some(true), ..Self::default() }
    }

    /// `{ok:false, error}`
    pub fn error(message: impl Into<String>) -> Self {
        Self { ok: Some(false), error: Some(message.into()), ..Self::default() }
    }

    /// `{ok:true, state}`
    pub fn state(state: ResourceState) -> Self {
        Self { state: Some(state), ..Self::ok() }
    }

    /// `{ok:true, admitted, latency_us}`
    pub fn decision(admitted: bool, latency_us: f64) -> Self {
        Self { admitted: Some(admitted), latency_us: Some(latency_us), ..Self::ok() }
    }

    /// `{ok:true, trace}`
    pub fn trace(entries: Vec<TraceEntry>) -> Self {
        Self { trace: Some(entries), ..Self::ok() }
    }

    /// `{admitted, latency_us, collect_latency_us, eval_latency_us}`
    pub fn directed(
        admitted: bool,
        latency_us: f64,
        collect_latency_us: f64,
        eval_latency_us: f64,
    ) -> Self {
        Self {
            admitted: Some(admitted),
            latency_us: Some(latency_us),
            collect_latency_us: Some(collect_latency_us),
            eval_latency_us: Some(eval_latency_us),
            ..Self::default()
        }
    }

    /// Whether the request succeeded.
    ///
    /// Responses without an `ok` field count as successful unless they carry
    /// an error.
    pub fn is_ok(&self) -> bool {
        self.ok.unwrap_or(self.error.is_none())
    }
}

/// Encode a message as one JSON line terminated by `\n`.
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut buf = serde_json::to_vec(message).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    buf.push(b'\n');
    Ok(buf)
}

/// Decode one request line.
///
/// Errors are attributed to the request kind whenever the `type` field can be
/// read, so that callers can report which request was malformed.
pub fn decode_request(line: &[u8]) -> Result<Request> {
    let line = checked_line(line)?;

    let value: serde_json::Value =
        serde_json::from_slice(line).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(ProtocolError::MissingType)?
        .to_owned();

    if !Request::KINDS.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownType(kind));
    }

    serde_json::from_value(value)
        .map_err(|e| ProtocolError::Malformed { request_type: kind, reason: e.to_string() })
}

/// Decode one response line.
pub fn decode_response(line: &[u8]) -> Result<Response> {
    let line = checked_line(line)?;
    serde_json::from_slice(line).map_err(|e| ProtocolError::InvalidJson(e.to_string()))
}

fn checked_line(line: &[u8]) -> Result<&[u8]> {
    if line.len() > MAX_LINE_BYTES {
        return Err(ProtocolError::LineTooLong { len: line.len(), max: MAX_LINE_BYTES });
    }
    Ok(line.trim_ascii())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;

    #[test]
    fn decodes_bare_request_kinds() {
        assert_eq!(decode_request(br#"{"type":"GET_STATE"}"#).unwrap(), Request::GetState);
        assert_eq!(decode_request(b"{\"type\":\"PING\"}\n").unwrap(), Request::Ping);
        assert_eq!(decode_request(br#"{"type":"GET_TRACE"}"#).unwrap(), Request::GetTrace);
    }

    #[test]
    fn decodes_process_ml_without_snapshot() {
        let line = br#"{"type":"PROCESS_ML","interaction":{"agent":"a1","resource":"r1","action":"acquire","timestamp":3}}"#;
        let request = decode_request(line).unwrap();
        assert_eq!(
            request,
            Request::ProcessMl { interaction: Interaction::acquire("a1", "r1", 3), snapshot: None }
        );
    }

    #[test]
    fn null_snapshot_is_absent() {
        let line = br#"{"type":"PROCESS_ML","snapshot":null,"interaction":{"agent":"a1","resource":"r1","action":"release","timestamp":0}}"#;
        let Request::ProcessMl { interaction, snapshot } = decode_request(line).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(interaction.action(), Action::Release);
        assert!(snapshot.is_none());
    }

    #[test]
    fn reset_defaults_to_no_agents() {
        assert_eq!(
            decode_request(br#"{"type":"RESET"}"#).unwrap(),
            Request::Reset { agents: Vec::new() }
        );
    }

    #[test]
    fn unknown_type_is_reported() {
        let err = decode_request(br#"{"type":"LAUNCH"}"#).unwrap_err();
        assert_eq!(err, ProtocolError::UnknownType("LAUNCH".to_string()));
        assert_eq!(err.to_string(), "Unknown request type: LAUNCH");
    }

    #[test]
    fn malformed_known_type_is_tagged() {
        let err = decode_request(br#"{"type":"COMMIT","interaction":{"agent":"a1"}}"#).unwrap_err();
        assert_eq!(err.request_type(), Some("COMMIT"));
    }

    #[test]
    fn garbage_is_invalid_json() {
        assert!(matches!(decode_request(b"not json"), Err(ProtocolError::InvalidJson(_))));
        assert_eq!(decode_request(b"[1,2,3]"), Err(ProtocolError::MissingType));
    }

    #[test]
    fn directed_response_has_no_ok_field() {
        let line = encode_line(&Response::directed(true, 10.0, 7.0, 1.0)).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert!(json.get("ok").is_none());
        assert_eq!(json["admitted"], true);
        assert!(decode_response(&line).unwrap().is_ok());
    }

    #[test]
    fn encoded_line_ends_with_newline() {
        let line = encode_line(&Request::Ping).unwrap();
        assert_eq!(line, b"{\"type\":\"PING\"}\n");
    }

    #[test]
    fn error_response_is_not_ok() {
        let response = Response::error("boom");
        assert!(!response.is_ok());
        let line = encode_line(&response).unwrap();
        assert_eq!(line, b"{\"ok\":false,\"error\":\"boom\"}\n");
    }
}
