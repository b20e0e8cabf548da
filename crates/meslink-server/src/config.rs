//! Server configuration.

use meslink_wire::FrameFormat;

/// Runtime configuration for both listeners.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind both listeners on.
    pub host: String,
    /// TCP port the controller connects to.
    pub tcp_port: u16,
    /// HTTP/WebSocket port for the operator surface.
    pub http_port: u16,
    /// Number of test channels to model.
    pub channel_count: u32,
    /// Framing convention of the controller deployment.
    pub frame_format: FrameFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            tcp_port: 50200,
            http_port: 5179,
            channel_count: 128,
            frame_format: FrameFormat::default(),
        }
    }
}
