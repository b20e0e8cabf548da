//! Error types shared across the meslink crates.

use thiserror::Error;

use crate::channel::CommandKind;
use crate::ids::ChannelId;
use crate::state::ChannelState;

/// Why an operator command was rejected.
///
/// Rejected commands mutate nothing and send nothing; the error is
/// returned synchronously to the command issuer.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    /// No `LINK` handshake has been accepted yet.
    #[error("workstation is not linked")]
    NotLinked,

    /// The target channel is outside the configured range.
    #[error("channel {0} does not exist")]
    UnknownChannel(ChannelId),

    /// The channel's last-known state makes the command illegal.
    #[error("channel {channel} cannot accept {command}: {reason} (current state: {state})")]
    IllegalState {
        /// Target channel.
        channel: ChannelId,
        /// Command that was attempted.
        command: CommandKind,
        /// Last-known channel state.
        state: ChannelState,
        /// Human-readable rejection reason.
        reason: &'static str,
    },

    /// The command passed validation but could not be handed to the
    /// controller connection (link went down).
    #[error("failed to send {command} to controller: {reason}")]
    SendFailed {
        /// Command that was attempted.
        command: CommandKind,
        /// Transport-level reason.
        reason: String,
    },
}
