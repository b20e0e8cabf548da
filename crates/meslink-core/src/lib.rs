//! # meslink-core
//!
//! Foundation types for the meslink MES test harness.
//!
//! This crate provides the shared vocabulary the other meslink crates
//! depend on:
//!
//! - **Channel IDs**: [`ids::ChannelId`] as a fixed-width newtype with the
//!   wire normalization quirks (`"003"`, `"ch003"` → `CH003`)
//! - **Lifecycle states**: [`state::ChannelState`], [`state::ConnectionMode`],
//!   [`state::AckStatus`] with exact wire strings
//! - **State machine**: [`channel::Channel`] enforcing the command legality
//!   table, [`channel::CommandKind`]
//! - **Messages**: [`messages::Outbound`] tagged enum and per-type inbound
//!   bodies, field names wire-exact
//! - **Clock**: [`clock::wire_timestamp`] and [`clock::MsgIdGenerator`]
//! - **Errors**: [`errors::CommandError`] hierarchy via `thiserror`
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by `meslink-server`; `meslink-wire`
//! stays below it and handles raw bytes only.

#![deny(unsafe_code)]

pub mod channel;
pub mod clock;
pub mod errors;
pub mod ids;
pub mod messages;
pub mod state;

pub use channel::{Channel, CommandKind};
pub use errors::CommandError;
pub use ids::ChannelId;
pub use state::{AckStatus, ChannelState, ConnectionMode};
