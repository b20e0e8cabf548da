//! # meslink-server
//!
//! The MES-side protocol harness: a TCP listener speaking the controller
//! protocol, a session coordinator modeling channel state, and an
//! HTTP/WebSocket surface for operators and observers.

#![deny(unsafe_code)]

pub mod broadcast;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod http;

pub use broadcast::{BroadcastHub, Direction, WireEvent};
pub use config::ServerConfig;
pub use controller::ControllerHandle;
pub use coordinator::{Coordinator, ControllerLink, EventSink, LinkStatus};
