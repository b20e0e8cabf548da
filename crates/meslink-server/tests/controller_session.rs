//! End-to-end controller session over a real TCP socket: framing, escape
//! repair, ack correlation, command dispatch, and observer mirroring.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Duration, timeout};

use meslink_core::ids::ChannelId;
use meslink_server::broadcast::BroadcastHub;
use meslink_server::controller::{self, ControllerHandle};
use meslink_server::coordinator::Coordinator;
use meslink_wire::FrameFormat;

struct TestServer {
    coordinator: Arc<Coordinator>,
    hub: Arc<BroadcastHub>,
    handle: ControllerHandle,
    addr: std::net::SocketAddr,
    _serve: tokio::task::JoinHandle<()>,
}

async fn spawn_server(format: FrameFormat) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hub = Arc::new(BroadcastHub::new());
    let handle = ControllerHandle::new();
    let coordinator = Arc::new(Coordinator::new(8, Arc::new(handle.clone()), hub.clone()));
    let serve = tokio::spawn(controller::serve(
        listener,
        handle.clone(),
        coordinator.clone(),
        format,
    ));
    TestServer {
        coordinator,
        hub,
        handle,
        addr,
        _serve: serve,
    }
}

/// Controller side of the wire, speaking the configured framing.
struct FakeController {
    stream: TcpStream,
    format: FrameFormat,
    buf: Vec<u8>,
}

impl FakeController {
    async fn connect(server: &TestServer, format: FrameFormat) -> Self {
        let stream = TcpStream::connect(server.addr).await.unwrap();
        Self {
            stream,
            format,
            buf: Vec::new(),
        }
    }

    async fn send_raw(&mut self, payload: &[u8]) {
        match self.format {
            FrameFormat::LengthPrefixed => {
                let header = format!("{:08}", payload.len());
                self.stream.write_all(header.as_bytes()).await.unwrap();
                self.stream.write_all(payload).await.unwrap();
            }
            FrameFormat::CrlfDelimited => {
                self.stream.write_all(payload).await.unwrap();
                self.stream.write_all(b"\r\n").await.unwrap();
            }
        }
    }

    async fn send(&mut self, msg: &Value) {
        self.send_raw(&serde_json::to_vec(msg).unwrap()).await;
    }

    /// Read the next framed message off the socket.
    async fn recv(&mut self) -> Value {
        timeout(Duration::from_secs(5), self.recv_inner())
            .await
            .expect("timed out waiting for a frame")
    }

    async fn recv_inner(&mut self) -> Value {
        loop {
            if let Some(payload) = self.try_extract() {
                return serde_json::from_slice(&payload).unwrap();
            }
            let mut chunk = [0u8; 4096];
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed while waiting for a frame");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn try_extract(&mut self) -> Option<Vec<u8>> {
        match self.format {
            FrameFormat::LengthPrefixed => {
                if self.buf.len() < 8 {
                    return None;
                }
                let len: usize = std::str::from_utf8(&self.buf[..8]).unwrap().parse().unwrap();
                if self.buf.len() < 8 + len {
                    return None;
                }
                let payload = self.buf[8..8 + len].to_vec();
                self.buf.drain(..8 + len);
                Some(payload)
            }
            FrameFormat::CrlfDelimited => {
                let at = self.buf.windows(2).position(|w| w == b"\r\n")?;
                let payload = self.buf[..at].to_vec();
                self.buf.drain(..at + 2);
                Some(payload)
            }
        }
    }
}

fn link_msg(msg_id: &str) -> Value {
    json!({
        "type": "LINK",
        "timestamp": "2026-08-28T10:00:00+08:00",
        "msg_id": msg_id,
        "work_station_name": "WS01",
        "state": "Online-Auto",
        "channel_count": "8",
        "software_version": "1.0.3"
    })
}

#[tokio::test]
async fn link_handshake_over_crlf() {
    let server = spawn_server(FrameFormat::CrlfDelimited).await;
    let mut controller = FakeController::connect(&server, FrameFormat::CrlfDelimited).await;

    controller.send(&link_msg("link01")).await;
    let ack = controller.recv().await;

    assert_eq!(ack["type"], "LINK_ACK");
    assert_eq!(ack["reply_to"], "link01");
    assert_eq!(ack["ack"], "OK");
    assert_eq!(ack["work_station_name"], "WS01");
    assert!(server.coordinator.link_status().connected);
    assert_eq!(server.handle.connection_count(), 1);
}

#[tokio::test]
async fn link_handshake_over_length_prefix() {
    let server = spawn_server(FrameFormat::LengthPrefixed).await;
    let mut controller = FakeController::connect(&server, FrameFormat::LengthPrefixed).await;

    controller.send(&link_msg("link02")).await;
    let ack = controller.recv().await;
    assert_eq!(ack["type"], "LINK_ACK");
    assert_eq!(ack["reply_to"], "link02");
}

#[tokio::test]
async fn status_report_cycle_updates_state() {
    let server = spawn_server(FrameFormat::CrlfDelimited).await;
    let mut controller = FakeController::connect(&server, FrameFormat::CrlfDelimited).await;

    controller.send(&link_msg("link03")).await;
    let _ = controller.recv().await;

    controller
        .send(&json!({
            "type": "STATUS",
            "msg_id": "st01",
            "work_station_name": "WS01",
            "channel": "CH003",
            "state": "Running"
        }))
        .await;
    let ack = controller.recv().await;
    assert_eq!(ack["type"], "STATUS_ACK");
    assert_eq!(ack["channel"], "CH003");
    assert_eq!(ack["reply_to"], "st01");

    controller
        .send(&json!({
            "type": "REPORT",
            "msg_id": "rp01",
            "work_station_name": "WS01",
            "channel": "ch003",
            "record_path": "D:/records/r1.csv"
        }))
        .await;
    let ack = controller.recv().await;
    assert_eq!(ack["type"], "REPORT_ACK");
    assert_eq!(ack["channel"], "ch003");
    assert_eq!(ack["reply_to"], "rp01");

    let channels = server.coordinator.channels();
    let ch3 = channels.iter().find(|c| c.id.as_str() == "CH003").unwrap();
    assert_eq!(ch3.state.to_string(), "Finish");
}

#[tokio::test]
async fn invalid_escapes_are_repaired_before_dispatch() {
    let server = spawn_server(FrameFormat::CrlfDelimited).await;
    let mut controller = FakeController::connect(&server, FrameFormat::CrlfDelimited).await;

    controller.send(&link_msg("link04")).await;
    let _ = controller.recv().await;

    // A Windows path with raw single backslashes is invalid JSON as-is.
    let raw = br#"{"type":"REPORT","msg_id":"rp02","work_station_name":"WS01","channel":"ch002","record_path":"D:\mes\data\q1.csv"}"#;
    controller.send_raw(raw).await;
    let ack = controller.recv().await;
    assert_eq!(ack["type"], "REPORT_ACK");
    assert_eq!(ack["reply_to"], "rp02");
    assert_eq!(ack["channel"], "ch002");
}

#[tokio::test]
async fn failed_exchange_keeps_connection_alive() {
    let server = spawn_server(FrameFormat::CrlfDelimited).await;
    let mut controller = FakeController::connect(&server, FrameFormat::CrlfDelimited).await;

    // Unknown type: no ack, but the connection must keep serving.
    controller
        .send(&json!({"type": "REBOOT", "msg_id": "x1"}))
        .await;
    controller.send(&link_msg("link05")).await;
    let ack = controller.recv().await;
    assert_eq!(ack["type"], "LINK_ACK");
    assert_eq!(ack["reply_to"], "link05");
}

#[tokio::test]
async fn operator_command_reaches_controller_socket() {
    let server = spawn_server(FrameFormat::CrlfDelimited).await;
    let mut controller = FakeController::connect(&server, FrameFormat::CrlfDelimited).await;

    controller.send(&link_msg("link06")).await;
    let _ = controller.recv().await;
    controller
        .send(&json!({
            "type": "STATUS",
            "msg_id": "st02",
            "channel": "CH001",
            "state": "StandBy"
        }))
        .await;
    let _ = controller.recv().await;

    server
        .coordinator
        .start(&ChannelId::new("CH001"), "BATT-42", "RecipeA", "/data/run1")
        .unwrap();

    let cmd = controller.recv().await;
    assert_eq!(cmd["type"], "START");
    assert_eq!(cmd["channel"], "CH001");
    assert_eq!(cmd["barcode"], "BATT-42");
    assert_eq!(cmd["process"], "RecipeA");
    assert_eq!(cmd["data_path"], "/data/run1");
    assert_eq!(cmd["work_station_name"], "WS01");
    assert_eq!(cmd["msg_id"].as_str().unwrap().len(), 16);
}

#[tokio::test]
async fn commands_preserve_issue_order() {
    let server = spawn_server(FrameFormat::CrlfDelimited).await;
    let mut controller = FakeController::connect(&server, FrameFormat::CrlfDelimited).await;

    controller.send(&link_msg("link07")).await;
    let _ = controller.recv().await;
    controller
        .send(&json!({
            "type": "STATUS",
            "msg_id": "st03",
            "channel": "CH002",
            "state": "Running"
        }))
        .await;
    let _ = controller.recv().await;

    server.coordinator.pause(&ChannelId::new("CH002")).unwrap();
    // Local state is still Running until a confirming STATUS, so STOP is
    // legal and must arrive after the PAUSE it followed.
    server.coordinator.stop(&ChannelId::new("CH002")).unwrap();

    assert_eq!(controller.recv().await["type"], "PAUSE");
    assert_eq!(controller.recv().await["type"], "STOP");
}

#[tokio::test]
async fn observers_see_both_directions() {
    let server = spawn_server(FrameFormat::CrlfDelimited).await;
    let (_id, mut events) = server.hub.register();
    let mut controller = FakeController::connect(&server, FrameFormat::CrlfDelimited).await;

    controller.send(&link_msg("link08")).await;
    let _ = controller.recv().await;

    let first: Value =
        serde_json::from_str(&timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap())
            .unwrap();
    assert_eq!(first["direction"], "controller->mes");
    assert_eq!(first["data"]["type"], "LINK");

    let second: Value =
        serde_json::from_str(&timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap())
            .unwrap();
    assert_eq!(second["direction"], "mes->controller");
    assert_eq!(second["data"]["type"], "LINK_ACK");
    assert_eq!(second["data"]["reply_to"], "link08");
}

#[tokio::test]
async fn new_controller_connection_supersedes_old() {
    let server = spawn_server(FrameFormat::CrlfDelimited).await;
    let mut first = FakeController::connect(&server, FrameFormat::CrlfDelimited).await;
    first.send(&link_msg("link09")).await;
    let _ = first.recv().await;
    first
        .send(&json!({
            "type": "STATUS",
            "msg_id": "st04",
            "channel": "CH001",
            "state": "Running"
        }))
        .await;
    let _ = first.recv().await;

    let mut second = FakeController::connect(&server, FrameFormat::CrlfDelimited).await;
    second.send(&link_msg("link10")).await;
    let _ = second.recv().await;

    server.coordinator.pause(&ChannelId::new("CH001")).unwrap();
    let cmd = second.recv().await;
    assert_eq!(cmd["type"], "PAUSE");
    assert_eq!(cmd["channel"], "CH001");
}
