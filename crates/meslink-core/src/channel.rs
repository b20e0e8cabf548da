//! The per-channel state machine.
//!
//! A [`Channel`] trusts inbound status reports unconditionally (the
//! controller owns physical state) but is the single place where outbound
//! command *legality* is enforced. The legality table:
//!
//! | command  | legal when current state is        |
//! |----------|------------------------------------|
//! | `START`  | not in {Running, OffLine, Paused, Alarm} |
//! | `STOP`   | Running or Paused                  |
//! | `PAUSE`  | Running                            |
//! | `RESUME` | Paused                             |
//!
//! `REPORT` (job completion) bypasses the table and forces `Finish`.

use std::fmt;

use serde::Serialize;

use crate::errors::CommandError;
use crate::ids::ChannelId;
use crate::state::ChannelState;

/// Operator command kinds subject to the legality table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    /// Start a test run.
    Start,
    /// Stop a running or paused run.
    Stop,
    /// Suspend a running run.
    Pause,
    /// Resume a paused run.
    Resume,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "START",
            Self::Stop => "STOP",
            Self::Pause => "PAUSE",
            Self::Resume => "RESUME",
        };
        f.write_str(s)
    }
}

/// One test lane on the controller.
///
/// Channels are created once at coordinator startup in `OffLine` and live
/// for the process lifetime; only their attributes mutate. The struct
/// serializes directly as the snapshot shape the HTTP/WS surface exposes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Channel {
    /// Stable canonical ID (`CH001`-style).
    pub id: ChannelId,
    /// Last-known lifecycle state.
    pub state: ChannelState,
    /// Barcode of the cell under test, recorded optimistically on START.
    pub barcode: String,
    /// Process (recipe) name, recorded optimistically on START.
    pub process: String,
    /// Result data path, recorded optimistically on START.
    pub data_path: String,
    /// Last diagnostic note from a STATUS report.
    pub message: String,
}

impl Channel {
    /// Create a channel in the initial `OffLine` state.
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            state: ChannelState::OffLine,
            barcode: String::new(),
            process: String::new(),
            data_path: String::new(),
            message: String::new(),
        }
    }

    /// Apply an inbound status report. The reported value is trusted as-is;
    /// a non-empty diagnostic message replaces the stored one.
    pub fn apply_status(&mut self, state: ChannelState, message: Option<&str>) {
        self.state = state;
        if let Some(msg) = message
            && !msg.is_empty()
        {
            self.message = msg.to_owned();
        }
    }

    /// Apply a completion report: unconditionally `Finish`, regardless of
    /// the prior state.
    pub fn apply_report(&mut self) {
        self.state = ChannelState::Finish;
    }

    /// Record the run attributes of an accepted START.
    ///
    /// The state is deliberately left unchanged; `Running` is expected to
    /// arrive later via a confirming STATUS report.
    pub fn record_start(&mut self, barcode: &str, process: &str, data_path: &str) {
        self.barcode = barcode.to_owned();
        self.process = process.to_owned();
        self.data_path = data_path.to_owned();
    }

    /// Check whether `command` is legal against the last-known state.
    ///
    /// Returns the descriptive rejection on failure; performs no mutation
    /// either way.
    pub fn check_command(&self, command: CommandKind) -> Result<(), CommandError> {
        let reason = match command {
            CommandKind::Start => match self.state {
                ChannelState::Running => Some("already running"),
                ChannelState::OffLine => Some("channel is offline"),
                ChannelState::Paused => Some("channel is paused, use RESUME instead"),
                ChannelState::Alarm => Some("channel is in alarm state"),
                _ => None,
            },
            CommandKind::Stop => match self.state {
                ChannelState::Running | ChannelState::Paused => None,
                _ => Some("channel is not running"),
            },
            CommandKind::Pause => match self.state {
                ChannelState::Running => None,
                _ => Some("channel is not running"),
            },
            CommandKind::Resume => match self.state {
                ChannelState::Paused => None,
                _ => Some("channel is not paused"),
            },
        };

        match reason {
            None => Ok(()),
            Some(reason) => Err(CommandError::IllegalState {
                channel: self.id.clone(),
                command,
                state: self.state,
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn channel_in(state: ChannelState) -> Channel {
        let mut ch = Channel::new(ChannelId::from_index(1));
        ch.state = state;
        ch
    }

    const ALL_STATES: [ChannelState; 11] = [
        ChannelState::OffLine,
        ChannelState::StandBy,
        ChannelState::Running,
        ChannelState::Paused,
        ChannelState::Alarm,
        ChannelState::NoLoad,
        ChannelState::Finish,
        ChannelState::StartFailed,
        ChannelState::ChangeStepFailed,
        ChannelState::ResumeFailed,
        ChannelState::ReversePolarity,
    ];

    #[test]
    fn start_legality_table() {
        for state in ALL_STATES {
            let legal = !matches!(
                state,
                ChannelState::Running
                    | ChannelState::OffLine
                    | ChannelState::Paused
                    | ChannelState::Alarm
            );
            let result = channel_in(state).check_command(CommandKind::Start);
            assert_eq!(result.is_ok(), legal, "START in {state}");
        }
    }

    #[test]
    fn stop_legality_table() {
        for state in ALL_STATES {
            let legal = matches!(state, ChannelState::Running | ChannelState::Paused);
            let result = channel_in(state).check_command(CommandKind::Stop);
            assert_eq!(result.is_ok(), legal, "STOP in {state}");
        }
    }

    #[test]
    fn pause_legality_table() {
        for state in ALL_STATES {
            let legal = state == ChannelState::Running;
            let result = channel_in(state).check_command(CommandKind::Pause);
            assert_eq!(result.is_ok(), legal, "PAUSE in {state}");
        }
    }

    #[test]
    fn resume_legality_table() {
        for state in ALL_STATES {
            let legal = state == ChannelState::Paused;
            let result = channel_in(state).check_command(CommandKind::Resume);
            assert_eq!(result.is_ok(), legal, "RESUME in {state}");
        }
    }

    #[test]
    fn rejection_carries_context() {
        let err = channel_in(ChannelState::Alarm)
            .check_command(CommandKind::Start)
            .unwrap_err();
        assert_matches!(
            err,
            CommandError::IllegalState {
                command: CommandKind::Start,
                state: ChannelState::Alarm,
                ..
            }
        );
        assert!(err.to_string().contains("CH001"));
        assert!(err.to_string().contains("alarm"));
    }

    #[test]
    fn check_command_does_not_mutate() {
        let mut ch = channel_in(ChannelState::Paused);
        let before = ch.clone();
        let _ = ch.check_command(CommandKind::Start);
        let _ = ch.check_command(CommandKind::Pause);
        assert_eq!(ch, before);
    }

    #[test]
    fn apply_status_trusts_controller() {
        let mut ch = channel_in(ChannelState::OffLine);
        ch.apply_status(ChannelState::Running, Some("ramping"));
        assert_eq!(ch.state, ChannelState::Running);
        assert_eq!(ch.message, "ramping");
    }

    #[test]
    fn apply_status_keeps_message_when_absent_or_empty() {
        let mut ch = channel_in(ChannelState::Running);
        ch.apply_status(ChannelState::Alarm, Some("over-voltage"));
        ch.apply_status(ChannelState::StandBy, None);
        assert_eq!(ch.message, "over-voltage");
        ch.apply_status(ChannelState::StandBy, Some(""));
        assert_eq!(ch.message, "over-voltage");
    }

    #[test]
    fn report_finishes_from_any_state() {
        for state in ALL_STATES {
            let mut ch = channel_in(state);
            ch.apply_report();
            assert_eq!(ch.state, ChannelState::Finish, "REPORT from {state}");
        }
    }

    #[test]
    fn record_start_leaves_state_untouched() {
        let mut ch = channel_in(ChannelState::StandBy);
        ch.record_start("B1", "P1", "/d");
        assert_eq!(ch.state, ChannelState::StandBy);
        assert_eq!(ch.barcode, "B1");
        assert_eq!(ch.process, "P1");
        assert_eq!(ch.data_path, "/d");
    }
}
