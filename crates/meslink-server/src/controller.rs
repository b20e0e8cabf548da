//! The controller-facing TCP listener and connection loop.
//!
//! One controller at a time: a new connection supersedes the previous
//! attachment. Each connection gets a framed reader on the accept task and
//! a dedicated writer task draining an unbounded queue, so the coordinator
//! can enqueue messages without touching the socket. The queue carries
//! both command traffic (via [`ControllerHandle`]'s
//! [`ControllerLink`] impl) and the acks produced by the read loop, in
//! the order they were accepted.
//!
//! Inbound processing per frame: repair invalid JSON string escapes,
//! then hand the payload to the coordinator. A failed exchange is logged
//! and the connection keeps reading; only transport errors end the loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use meslink_core::messages::Outbound;
use meslink_wire::{FrameCodec, FrameFormat, repair_escapes};

use crate::coordinator::{Coordinator, ControllerLink, LinkError};

/// Cloneable handle to whichever controller connection is currently
/// attached. Empty until the first controller connects.
#[derive(Clone, Default)]
pub struct ControllerHandle {
    tx: Arc<RwLock<Option<mpsc::UnboundedSender<Outbound>>>>,
    connections: Arc<AtomicUsize>,
}

impl ControllerHandle {
    /// Create a handle with no connection attached.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of open controller sockets. More than one is possible while
    /// a superseded connection drains; only the newest receives traffic.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Attach a connection's outbound queue, superseding any previous one.
    fn attach(&self, tx: mpsc::UnboundedSender<Outbound>) {
        *self.tx.write() = Some(tx);
    }

    /// Detach `tx` if it is still the attached connection. A connection
    /// that was already superseded leaves the newer attachment in place.
    fn detach(&self, tx: &mpsc::UnboundedSender<Outbound>) {
        let mut slot = self.tx.write();
        if slot.as_ref().is_some_and(|cur| cur.same_channel(tx)) {
            *slot = None;
        }
    }
}

impl ControllerLink for ControllerHandle {
    fn send(&self, msg: &Outbound) -> Result<(), LinkError> {
        let slot = self.tx.read();
        let tx = slot.as_ref().ok_or(LinkError::NotConnected)?;
        tx.send(msg.clone()).map_err(|_| LinkError::Closed)
    }
}

/// Accept controller connections on `listener` until the task is aborted.
pub async fn serve(
    listener: TcpListener,
    handle: ControllerHandle,
    coordinator: Arc<Coordinator>,
    format: FrameFormat,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!(%peer, "controller connected");
                let handle = handle.clone();
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer, handle, coordinator, format).await;
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handle: ControllerHandle,
    coordinator: Arc<Coordinator>,
    format: FrameFormat,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, FrameCodec::new(format));
    let mut writer = FramedWrite::new(write_half, FrameCodec::new(format));

    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let _ = handle.connections.fetch_add(1, Ordering::Relaxed);
    handle.attach(tx.clone());

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = match serde_json::to_vec(&msg) {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, kind = msg.kind(), "failed to encode outbound message");
                    continue;
                }
            };
            if let Err(e) = writer.send(Bytes::from(payload)).await {
                warn!(error = %e, "controller write failed");
                break;
            }
        }
    });

    while let Some(frame) = reader.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%peer, error = %e, "framing error, closing connection");
                break;
            }
        };
        let payload = repair_escapes(&frame);
        match coordinator.handle_inbound(&payload) {
            Ok(ack) => {
                coordinator.mirror_outbound(&ack);
                if tx.send(ack).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!(%peer, raw = %String::from_utf8_lossy(&payload), "rejected payload");
                warn!(%peer, error = %e, "inbound exchange failed");
            }
        }
    }

    handle.detach(&tx);
    drop(tx);
    let _ = writer_task.await;
    let _ = handle.connections.fetch_sub(1, Ordering::Relaxed);
    info!(%peer, "controller disconnected");
}
