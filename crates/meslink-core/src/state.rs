//! Wire-facing enums: channel lifecycle states, connection modes, ack status.
//!
//! Variant names serialize to the exact strings the controller puts on the
//! wire; the serde renames are the contract, not a convenience.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a single test channel.
///
/// Inbound status reports set this directly — the controller is the source
/// of truth for physical state. Command legality (see
/// [`crate::channel::Channel::check_command`]) is validated against the
/// last-known value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    /// Not connected / initial state.
    OffLine,
    /// Idle, ready to accept a run.
    StandBy,
    /// Test run in progress.
    Running,
    /// Run suspended by operator.
    Paused,
    /// Equipment fault on the channel.
    Alarm,
    /// No cell loaded in the lane.
    NoLoad,
    /// Run completed.
    Finish,
    /// Run failed to start.
    StartFailed,
    /// Step transition failed mid-run.
    ChangeStepFailed,
    /// Resume after pause failed.
    ResumeFailed,
    /// Cell inserted with reversed polarity.
    ReversePolarity,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OffLine => "OffLine",
            Self::StandBy => "StandBy",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Alarm => "Alarm",
            Self::NoLoad => "NoLoad",
            Self::Finish => "Finish",
            Self::StartFailed => "StartFailed",
            Self::ChangeStepFailed => "ChangeStepFailed",
            Self::ResumeFailed => "ResumeFailed",
            Self::ReversePolarity => "ReversePolarity",
        };
        f.write_str(s)
    }
}

/// Coarse controller connectivity mode, reported by the `LINK` handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionMode {
    /// Linked, running in automatic mode.
    #[serde(rename = "Online-Auto")]
    OnlineAuto,
    /// Linked, running in manual mode.
    #[serde(rename = "Online-Manual")]
    OnlineManual,
    /// Not linked.
    Offline,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OnlineAuto => "Online-Auto",
            Self::OnlineManual => "Online-Manual",
            Self::Offline => "Offline",
        };
        f.write_str(s)
    }
}

/// Acknowledgment status carried by every `*_ACK` message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckStatus {
    /// Message accepted.
    OK,
    /// Message rejected; `message` carries the reason.
    NG,
}
