//! Shallow `type` probe — the message registry's routing half.
//!
//! Only the `type` discriminator is extracted; the payload is fully
//! decoded later by the handler that owns its schema. Unknown types are a
//! distinct, non-fatal error so the connection survives a controller that
//! speaks a newer protocol revision.

use serde::Deserialize;
use thiserror::Error;

/// Inbound message kinds the harness understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// `LINK` — workstation handshake.
    Link,
    /// `STATUS` — single-channel state update.
    Status,
    /// `STATUS_ALL` — bulk state sweep.
    StatusAll,
    /// `REPORT` — job completion.
    Report,
}

impl MessageKind {
    /// The wire `type` string of this kind.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Link => "LINK",
            Self::Status => "STATUS",
            Self::StatusAll => "STATUS_ALL",
            Self::Report => "REPORT",
        }
    }
}

/// Why a payload could not be routed.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Payload is not JSON at the shallow level, or has no `type` field.
    /// Fatal to the exchange; the connection stays open.
    #[error("failed to parse message type: {0}")]
    Malformed(String),

    /// `type` is present but not one of the known kinds. Non-fatal and
    /// reported distinctly to the caller.
    #[error("unknown message type: {0}")]
    UnknownType(String),
}

#[derive(Deserialize)]
struct TypeProbe {
    #[serde(rename = "type")]
    kind: String,
}

/// Extract the `type` discriminator from a normalized JSON payload.
pub fn peek_kind(payload: &[u8]) -> Result<MessageKind, ProbeError> {
    let probe: TypeProbe =
        serde_json::from_slice(payload).map_err(|e| ProbeError::Malformed(e.to_string()))?;
    match probe.kind.as_str() {
        "LINK" => Ok(MessageKind::Link),
        "STATUS" => Ok(MessageKind::Status),
        "STATUS_ALL" => Ok(MessageKind::StatusAll),
        "REPORT" => Ok(MessageKind::Report),
        other => Err(ProbeError::UnknownType(other.to_owned())),
    }
}
