//! Wire message schemas.
//!
//! Field names are wire-exact. Every message shares the envelope fields
//! (`type`, `timestamp`, `msg_id`, `work_station_name`); inbound messages
//! (controller → MES) are decoded individually after the type probe,
//! outbound messages (MES → controller) are one internally tagged enum,
//! the `type` discriminator carried by the serde tag.
//!
//! Inbound decoding is lenient about non-essential fields the same way the
//! controller firmware is about emitting them: optional metadata defaults
//! to empty rather than failing the exchange.

use serde::{Deserialize, Serialize};

use crate::state::{AckStatus, ChannelState, ConnectionMode};

/// Common fields present on every wire message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// ISO-8601 timestamp, `YYYY-MM-DDTHH:MM:SS+08:00`.
    #[serde(default)]
    pub timestamp: String,
    /// Correlation ID, 14-digit timestamp + 2-digit sequence.
    #[serde(default)]
    pub msg_id: String,
    /// Workstation the controller identifies itself as.
    #[serde(default)]
    pub work_station_name: String,
}

/// `LINK` — the controller's initial handshake.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LinkMessage {
    /// Shared envelope fields.
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Connectivity mode the controller reports.
    pub state: ConnectionMode,
    /// Channel count as a wire string (informational).
    #[serde(default)]
    pub channel_count: String,
    /// Controller software version (informational).
    #[serde(default)]
    pub software_version: String,
}

/// `STATUS` — single-channel state update. Channel addressed canonically
/// (`CH005`).
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StatusMessage {
    /// Shared envelope fields.
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Target channel (`CH005`-style).
    pub channel: String,
    /// Reported lifecycle state.
    pub state: ChannelState,
    /// Optional diagnostic note.
    #[serde(default)]
    pub message: Option<String>,
}

/// One entry of a `STATUS_ALL` sweep. The channel is addressed by bare
/// numeric suffix (`"001"`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelEntry {
    /// Bare channel number, no `CH` prefix.
    pub ch: String,
    /// Reported lifecycle state.
    pub state: ChannelState,
}

/// `STATUS_ALL` — bulk state sweep across channels.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct StatusAllMessage {
    /// Shared envelope fields.
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Controller connection state word (hex string, informational).
    #[serde(default)]
    pub connection_state: String,
    /// Per-channel entries.
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
}

/// `REPORT` — job completion. Channel addressed with a lowercase prefix
/// (`ch003`).
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ReportMessage {
    /// Shared envelope fields.
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Target channel (`ch003`-style).
    pub channel: String,
    /// Path of the written result record.
    #[serde(default)]
    pub record_path: String,
}

/// Acknowledgment fields shared by every `*_ACK`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AckBody {
    /// Shared envelope fields.
    #[serde(flatten)]
    pub envelope: Envelope,
    /// `msg_id` of the inbound message being acknowledged.
    pub reply_to: String,
    /// OK or NG.
    pub ack: AckStatus,
    /// Rejection reason; empty on OK.
    pub message: String,
}

/// Acknowledgment for channel-scoped inbound messages, echoing the channel
/// exactly as the controller spelled it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelAckBody {
    /// Shared acknowledgment fields.
    #[serde(flatten)]
    pub ack: AckBody,
    /// Channel as spelled by the inbound message.
    pub channel: String,
}

/// `START` command payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartBody {
    /// Shared envelope fields.
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Target channel (canonical form).
    pub channel: String,
    /// Barcode of the cell under test.
    pub barcode: String,
    /// Process (recipe) name.
    pub process: String,
    /// Result data path.
    pub data_path: String,
}

/// Payload of the channel-only commands (`STOP`, `PAUSE`, `RESUME`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelBody {
    /// Shared envelope fields.
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Target channel (canonical form).
    pub channel: String,
}

/// Every message the MES sends to the controller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Outbound {
    /// Acknowledge a `LINK` handshake.
    #[serde(rename = "LINK_ACK")]
    LinkAck(AckBody),
    /// Acknowledge a `STATUS` update.
    #[serde(rename = "STATUS_ACK")]
    StatusAck(ChannelAckBody),
    /// Acknowledge a `STATUS_ALL` sweep.
    #[serde(rename = "STATUS_ALL_ACK")]
    StatusAllAck(AckBody),
    /// Acknowledge a `REPORT`.
    #[serde(rename = "REPORT_ACK")]
    ReportAck(ChannelAckBody),
    /// Start a test run.
    #[serde(rename = "START")]
    Start(StartBody),
    /// Stop a run.
    #[serde(rename = "STOP")]
    Stop(ChannelBody),
    /// Pause a run.
    #[serde(rename = "PAUSE")]
    Pause(ChannelBody),
    /// Resume a paused run.
    #[serde(rename = "RESUME")]
    Resume(ChannelBody),
}

impl Outbound {
    /// The `msg_id` of an ack (`reply_to` correlation source) or command.
    pub fn msg_id(&self) -> &str {
        &self.envelope().msg_id
    }

    /// Shared envelope of any outbound variant.
    pub fn envelope(&self) -> &Envelope {
        match self {
            Self::LinkAck(b) | Self::StatusAllAck(b) => &b.envelope,
            Self::StatusAck(b) | Self::ReportAck(b) => &b.ack.envelope,
            Self::Start(b) => &b.envelope,
            Self::Stop(b) | Self::Pause(b) | Self::Resume(b) => &b.envelope,
        }
    }

    /// The wire `type` tag of this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LinkAck(_) => "LINK_ACK",
            Self::StatusAck(_) => "STATUS_ACK",
            Self::StatusAllAck(_) => "STATUS_ALL_ACK",
            Self::ReportAck(_) => "REPORT_ACK",
            Self::Start(_) => "START",
            Self::Stop(_) => "STOP",
            Self::Pause(_) => "PAUSE",
            Self::Resume(_) => "RESUME",
        }
    }
}
