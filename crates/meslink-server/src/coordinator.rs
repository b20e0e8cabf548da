//! The session coordinator: the stand-in MES brain.
//!
//! Owns the full session state — the dense channel arena and the link
//! status — behind a single reader/writer lock. Inbound controller
//! messages and operator commands both funnel through here; side effects
//! leave through two injected capabilities:
//!
//! - [`ControllerLink`]: enqueue a message toward the controller
//!   connection (fails when no controller is attached).
//! - [`EventSink`]: fire-and-forget mirror of every exchange to observers.
//!
//! Command enqueue happens inside the write-lock critical section — it is
//! a cheap channel push, not socket I/O — so the order the controller
//! observes commands in matches the order the validator accepted them.
//! The actual socket write happens on the connection's writer task.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use meslink_core::channel::{Channel, CommandKind};
use meslink_core::clock::{MsgIdGenerator, wire_timestamp};
use meslink_core::errors::CommandError;
use meslink_core::ids::ChannelId;
use meslink_core::messages::{
    AckBody, ChannelAckBody, ChannelBody, Envelope, LinkMessage, Outbound, ReportMessage,
    StartBody, StatusAllMessage, StatusMessage,
};
use meslink_core::state::{AckStatus, ConnectionMode};
use meslink_wire::{MessageKind, ProbeError, peek_kind};

use crate::broadcast::WireEvent;

/// Why a handed-off message could not reach the controller.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LinkError {
    /// No controller connection is attached.
    #[error("no controller connected")]
    NotConnected,
    /// The attached connection's queue has closed (connection tearing
    /// down).
    #[error("controller connection closed")]
    Closed,
}

/// Capability to hand a message to the controller connection.
///
/// Implementations enqueue; they must not block on network I/O.
pub trait ControllerLink: Send + Sync {
    /// Enqueue `msg` for transmission to the controller.
    fn send(&self, msg: &Outbound) -> Result<(), LinkError>;
}

/// Capability to mirror an exchange to observers. Fire-and-forget: lossy
/// under backpressure, never an error, never a correctness dependency.
pub trait EventSink: Send + Sync {
    /// Publish one mirrored exchange.
    fn publish(&self, event: WireEvent);
}

/// Why an inbound controller message failed its exchange.
///
/// None of these are fatal to the connection; the read loop logs and
/// continues.
#[derive(Debug, Error)]
pub enum InboundError {
    /// Type probe failure (malformed payload or unknown `type`).
    #[error(transparent)]
    Probe(#[from] ProbeError),

    /// The payload did not decode as its declared type.
    #[error("failed to decode {kind} message: {source}")]
    Decode {
        /// Wire type tag.
        kind: &'static str,
        /// Underlying decode error.
        source: serde_json::Error,
    },

    /// A single-channel message addressed a channel outside the
    /// configured range. No ack is produced and nothing is mutated.
    #[error("unknown channel {0}")]
    UnknownChannel(String),
}

/// Link/session status snapshot exposed to the query surface.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkStatus {
    /// True once a LINK handshake has been accepted. Never reset
    /// automatically; disconnect detection is a transport concern.
    pub connected: bool,
    /// Workstation name from the handshake.
    pub work_station_name: String,
    /// Connectivity mode from the handshake.
    pub mode: ConnectionMode,
    /// Number of configured channels.
    pub channel_count: u32,
}

/// Everything guarded by the session lock.
struct SessionState {
    channels: BTreeMap<ChannelId, Channel>,
    connected: bool,
    work_station_name: String,
    mode: ConnectionMode,
    channel_count: u32,
}

/// Orchestrates inbound messages, operator commands, and observer
/// mirroring over the shared session state.
pub struct Coordinator {
    state: RwLock<SessionState>,
    msg_ids: MsgIdGenerator,
    link: Arc<dyn ControllerLink>,
    sink: Arc<dyn EventSink>,
}

impl Coordinator {
    /// Create a coordinator with `channel_count` channels, all `OffLine`.
    pub fn new(
        channel_count: u32,
        link: Arc<dyn ControllerLink>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let channels = (1..=channel_count)
            .map(|i| {
                let id = ChannelId::from_index(i);
                (id.clone(), Channel::new(id))
            })
            .collect();
        Self {
            state: RwLock::new(SessionState {
                channels,
                connected: false,
                work_station_name: String::new(),
                mode: ConnectionMode::Offline,
                channel_count,
            }),
            msg_ids: MsgIdGenerator::new(),
            link,
            sink,
        }
    }

    // ── inbound ─────────────────────────────────────────────────────────

    /// Dispatch one framed, repaired payload from the controller.
    ///
    /// On success the returned ack carries a fresh `msg_id` and the
    /// inbound message's `msg_id` as `reply_to`; the caller transmits it.
    /// Every probed payload — including unknown types — is mirrored to
    /// observers before dispatch.
    pub fn handle_inbound(&self, payload: &[u8]) -> Result<Outbound, InboundError> {
        let kind = peek_kind(payload);
        if !matches!(&kind, Err(ProbeError::Malformed(_)))
            && let Ok(data) = serde_json::from_slice::<Value>(payload)
        {
            self.sink.publish(WireEvent::inbound(data));
        }
        match kind? {
            MessageKind::Link => self.handle_link(payload),
            MessageKind::Status => self.handle_status(payload),
            MessageKind::StatusAll => self.handle_status_all(payload),
            MessageKind::Report => self.handle_report(payload),
        }
    }

    /// Mirror an outbound message (typically a just-transmitted ack) to
    /// observers.
    pub fn mirror_outbound(&self, msg: &Outbound) {
        match serde_json::to_value(msg) {
            Ok(data) => self.sink.publish(WireEvent::outbound(data)),
            Err(e) => warn!(error = %e, kind = msg.kind(), "failed to mirror outbound message"),
        }
    }

    fn handle_link(&self, payload: &[u8]) -> Result<Outbound, InboundError> {
        let msg: LinkMessage = decode(payload, "LINK")?;
        {
            let mut state = self.state.write();
            state.connected = true;
            state.work_station_name = msg.envelope.work_station_name.clone();
            state.mode = msg.state;
        }
        info!(
            work_station = %msg.envelope.work_station_name,
            mode = %msg.state,
            channel_count = %msg.channel_count,
            version = %msg.software_version,
            "controller linked"
        );
        Ok(Outbound::LinkAck(self.ack_body(&msg.envelope)))
    }

    fn handle_status(&self, payload: &[u8]) -> Result<Outbound, InboundError> {
        let msg: StatusMessage = decode(payload, "STATUS")?;
        let id = ChannelId::new(msg.channel.as_str());
        {
            let mut state = self.state.write();
            let Some(channel) = state.channels.get_mut(&id) else {
                return Err(InboundError::UnknownChannel(msg.channel));
            };
            channel.apply_status(msg.state, msg.message.as_deref());
        }
        info!(channel = %id, state = %msg.state, "status update");
        Ok(Outbound::StatusAck(ChannelAckBody {
            ack: self.ack_body(&msg.envelope),
            channel: msg.channel,
        }))
    }

    fn handle_status_all(&self, payload: &[u8]) -> Result<Outbound, InboundError> {
        let msg: StatusAllMessage = decode(payload, "STATUS_ALL")?;
        let mut applied = 0usize;
        {
            let mut state = self.state.write();
            for entry in &msg.channels {
                let id = ChannelId::from_wire_suffix(&entry.ch);
                // Entries outside the configured range are skipped; the
                // rest of the sweep still applies.
                if let Some(channel) = state.channels.get_mut(&id) {
                    channel.apply_status(entry.state, None);
                    applied += 1;
                }
            }
        }
        info!(entries = msg.channels.len(), applied, "status sweep");
        Ok(Outbound::StatusAllAck(self.ack_body(&msg.envelope)))
    }

    fn handle_report(&self, payload: &[u8]) -> Result<Outbound, InboundError> {
        let msg: ReportMessage = decode(payload, "REPORT")?;
        let id = ChannelId::from_wire(&msg.channel);
        {
            let mut state = self.state.write();
            let Some(channel) = state.channels.get_mut(&id) else {
                return Err(InboundError::UnknownChannel(msg.channel));
            };
            channel.apply_report();
        }
        info!(channel = %id, record = %msg.record_path, "job completion report");
        Ok(Outbound::ReportAck(ChannelAckBody {
            ack: self.ack_body(&msg.envelope),
            channel: msg.channel,
        }))
    }

    fn ack_body(&self, inbound: &Envelope) -> AckBody {
        AckBody {
            envelope: Envelope {
                timestamp: wire_timestamp(),
                msg_id: self.msg_ids.next(),
                work_station_name: inbound.work_station_name.clone(),
            },
            reply_to: inbound.msg_id.clone(),
            ack: AckStatus::OK,
            message: String::new(),
        }
    }

    // ── operator commands ───────────────────────────────────────────────

    /// Validate and issue a START for `channel`, recording the run
    /// attributes optimistically on success.
    pub fn start(
        &self,
        channel: &ChannelId,
        barcode: &str,
        process: &str,
        data_path: &str,
    ) -> Result<(), CommandError> {
        self.issue(CommandKind::Start, channel, Some((barcode, process, data_path)))
    }

    /// Validate and issue a STOP for `channel`.
    pub fn stop(&self, channel: &ChannelId) -> Result<(), CommandError> {
        self.issue(CommandKind::Stop, channel, None)
    }

    /// Validate and issue a PAUSE for `channel`.
    pub fn pause(&self, channel: &ChannelId) -> Result<(), CommandError> {
        self.issue(CommandKind::Pause, channel, None)
    }

    /// Validate and issue a RESUME for `channel`.
    pub fn resume(&self, channel: &ChannelId) -> Result<(), CommandError> {
        self.issue(CommandKind::Resume, channel, None)
    }

    fn issue(
        &self,
        kind: CommandKind,
        channel: &ChannelId,
        start: Option<(&str, &str, &str)>,
    ) -> Result<(), CommandError> {
        let cmd = {
            let mut state = self.state.write();
            if !state.connected {
                return Err(CommandError::NotLinked);
            }
            let work_station_name = state.work_station_name.clone();
            let Some(ch) = state.channels.get_mut(channel) else {
                return Err(CommandError::UnknownChannel(channel.clone()));
            };
            ch.check_command(kind)?;

            let envelope = Envelope {
                timestamp: wire_timestamp(),
                msg_id: self.msg_ids.next(),
                work_station_name,
            };
            let cmd = match kind {
                CommandKind::Start => {
                    let (barcode, process, data_path) = start.unwrap_or_default();
                    Outbound::Start(StartBody {
                        envelope,
                        channel: channel.to_string(),
                        barcode: barcode.to_owned(),
                        process: process.to_owned(),
                        data_path: data_path.to_owned(),
                    })
                }
                CommandKind::Stop => Outbound::Stop(ChannelBody {
                    envelope,
                    channel: channel.to_string(),
                }),
                CommandKind::Pause => Outbound::Pause(ChannelBody {
                    envelope,
                    channel: channel.to_string(),
                }),
                CommandKind::Resume => Outbound::Resume(ChannelBody {
                    envelope,
                    channel: channel.to_string(),
                }),
            };

            // Enqueue before releasing the lock so per-channel command
            // order matches validation order.
            self.link.send(&cmd).map_err(|e| CommandError::SendFailed {
                command: kind,
                reason: e.to_string(),
            })?;

            if let (CommandKind::Start, Some((barcode, process, data_path))) = (kind, start) {
                ch.record_start(barcode, process, data_path);
            }
            cmd
        };

        info!(command = %kind, channel = %channel, "command issued");
        self.mirror_outbound(&cmd);
        Ok(())
    }

    // ── snapshots ───────────────────────────────────────────────────────

    /// Current channel states, dense `CH001..CH{N}` order.
    pub fn channels(&self) -> Vec<Channel> {
        self.state.read().channels.values().cloned().collect()
    }

    /// Current link/session status.
    pub fn link_status(&self) -> LinkStatus {
        let state = self.state.read();
        LinkStatus {
            connected: state.connected,
            work_station_name: state.work_station_name.clone(),
            mode: state.mode,
            channel_count: state.channel_count,
        }
    }
}

fn decode<'a, T: serde::Deserialize<'a>>(
    payload: &'a [u8],
    kind: &'static str,
) -> Result<T, InboundError> {
    serde_json::from_slice(payload).map_err(|source| InboundError::Decode { kind, source })
}
