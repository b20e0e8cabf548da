//! # meslink-wire
//!
//! The byte-stream layer of the meslink harness: everything between the
//! socket and the typed message handlers.
//!
//! - **Framing**: [`frame::FrameCodec`] turns an unbounded byte stream into
//!   discrete JSON payloads (and back). Two incompatible framing
//!   conventions exist across deployments — an 8-digit ASCII length prefix
//!   and a `\r\n`-terminated line — selected per deployment via
//!   [`frame::FrameFormat`].
//! - **Escape repair**: [`repair::repair_escapes`] normalizes the invalid
//!   single-backslash escapes some controllers emit inside JSON strings
//!   (Windows paths), after framing and before parsing.
//! - **Type probe**: [`probe::peek_kind`] extracts only the `type`
//!   discriminator to route a payload to its full decoder, distinguishing
//!   unknown types (non-fatal) from undecodable payloads.
//!
//! ## Crate Position
//!
//! Depends only on the codec/buffer ecosystem. Consumed by
//! `meslink-server`'s controller endpoint.

#![deny(unsafe_code)]

pub mod frame;
pub mod probe;
pub mod repair;

pub use frame::{FrameCodec, FrameError, FrameFormat, MAX_FRAME_BYTES};
pub use probe::{MessageKind, ProbeError, peek_kind};
pub use repair::repair_escapes;
