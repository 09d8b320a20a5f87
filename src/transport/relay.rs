// src/transport/relay.rs
//
// Station relay: robot datagrams in, operator envelopes out.
//
//   robot --udp--> [listener] -> snapshot -+-> [ws client task] --ws--> operator UI
//                                 ^ latest  +-> [ws client task] --ws--> operator UI
//                                   values  +-> [udp forwarder]  --udp--> operator_addr (optional)
//
// Packets merge field by field into one snapshot, so a robot that sends a
// partial update leaves the other fields untouched. Each operator gets its
// own task ticking at `forward_fps` regardless of how fast the robot sends.

use crate::pipeline::PipelineMetrics;
use crate::telemetry::{OperatorMessage, RobotPacket};
use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{lookup_host, TcpListener, TcpStream, UdpSocket};
use tokio::sync::RwLock;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Where robots send `robot_telemetry` datagrams
    pub listen_addr: String,
    /// WebSocket endpoint for operator UIs
    pub listen_ws_addr: String,
    /// Extra UDP destination for envelopes; off when unset
    pub operator_addr: Option<String>,
    pub forward_fps: u32,
    /// Image size reported when the robot did not send one
    pub default_width: u32,
    pub default_height: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            listen_ws_addr: "0.0.0.0:8081".to_string(),
            operator_addr: None,
            forward_fps: 15,
            default_width: 640,
            default_height: 480,
        }
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

#[derive(Debug, Clone)]
pub struct RelaySnapshot {
    fields: Map<String, Value>,
    packet: RobotPacket,
    packets_received: u64,
    updated_at: Option<Instant>,
}

impl Default for RelaySnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl RelaySnapshot {
    /// Neutral state: lane lost, stopped, no images.
    pub fn new() -> Self {
        let packet = RobotPacket::default();
        let fields = match serde_json::to_value(&packet) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self {
            fields,
            packet,
            packets_received: 0,
            updated_at: None,
        }
    }

    /// Merge the `data` object of one robot datagram.
    ///
    /// The update is applied only if the merged result is still a valid packet.
    /// Keys that are not packet fields are dropped.
    pub fn merge(&mut self, data: Map<String, Value>) -> Result<()> {
        let mut merged = self.fields.clone();
        merged.extend(data);

        let packet: RobotPacket = serde_json::from_value(Value::Object(merged))
            .context("Robot packet has fields of the wrong type")?;

        self.fields = match serde_json::to_value(&packet)? {
            Value::Object(map) => map,
            _ => return Err(anyhow!("Robot packet did not serialize to an object")),
        };
        self.packet = packet;
        self.packets_received += 1;
        self.updated_at = Some(Instant::now());
        Ok(())
    }

    pub fn packet(&self) -> &RobotPacket {
        &self.packet
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received
    }

    /// Time since the last accepted packet.
    pub fn age(&self) -> Option<Duration> {
        self.updated_at.map(|t| t.elapsed())
    }

    /// Envelopes for one forwarding tick: images only when present, then telemetry.
    pub fn operator_messages(&self, config: &RelayConfig) -> Vec<OperatorMessage> {
        let packet = &self.packet;
        let width = packet.width.unwrap_or(config.default_width);
        let height = packet.height.unwrap_or(config.default_height);

        let mut messages = Vec::with_capacity(3);
        if !packet.raw_image_b64.is_empty() {
            messages.push(OperatorMessage::ImageRaw {
                data: packet.raw_image_b64.clone(),
                width,
                height,
            });
        }
        if !packet.processed_image_b64.is_empty() {
            messages.push(OperatorMessage::ImageProcessed {
                data: packet.processed_image_b64.clone(),
                width,
                height,
            });
        }
        messages.push(OperatorMessage::Telemetry {
            data: packet.telemetry.clone(),
        });
        messages
    }
}

/// Extract the `data` object from a robot datagram.
pub fn parse_robot_datagram(bytes: &[u8]) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_slice(bytes).context("Datagram is not JSON")?;
    let mut object = match value {
        Value::Object(map) => map,
        _ => return Err(anyhow!("Datagram is not a JSON object")),
    };

    match object.get("type").and_then(Value::as_str) {
        Some("robot_telemetry") | None => {}
        Some(other) => debug!("Unexpected datagram type '{}', reading data anyway", other),
    }

    match object.remove("data") {
        Some(Value::Object(data)) => Ok(data),
        Some(_) => Err(anyhow!("Datagram 'data' is not an object")),
        None => Err(anyhow!("Datagram has no 'data' field")),
    }
}

// ============================================================================
// TASKS
// ============================================================================

pub type SharedSnapshot = Arc<RwLock<RelaySnapshot>>;

/// Receive robot datagrams forever, merging each into `snapshot`.
pub async fn run_listener(socket: UdpSocket, snapshot: SharedSnapshot) -> Result<()> {
    let mut buf = vec![0u8; 65_536];
    loop {
        let (len, peer) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                warn!("Relay receive failed: {}", e);
                continue;
            }
        };

        let data = match parse_robot_datagram(&buf[..len]) {
            Ok(data) => data,
            Err(e) => {
                warn!("Ignoring datagram from {}: {:#}", peer, e);
                continue;
            }
        };

        let mut guard = snapshot.write().await;
        if let Err(e) = guard.merge(data) {
            warn!("Ignoring datagram from {}: {:#}", peer, e);
            continue;
        }
        if guard.packets_received() == 1 {
            info!("✓ First robot packet from {}", peer);
        }
    }
}

/// Send the current snapshot to `target` at `fps` until the task is dropped.
pub async fn run_forwarder(
    socket: UdpSocket,
    target: SocketAddr,
    snapshot: SharedSnapshot,
    config: RelayConfig,
    metrics: PipelineMetrics,
) -> Result<()> {
    let mut ticker = forward_ticker(config.forward_fps);

    loop {
        ticker.tick().await;

        let messages = snapshot.read().await.operator_messages(&config);
        for message in &messages {
            let bytes = serde_json::to_vec(message).context("Failed to serialize envelope")?;
            match socket.send_to(&bytes, target).await {
                Ok(_) => metrics.inc(&metrics.datagrams_sent),
                Err(e) => {
                    metrics.inc(&metrics.datagrams_failed);
                    debug!("Forward to {} failed: {}", target, e);
                }
            }
        }
    }
}

fn forward_ticker(fps: u32) -> Interval {
    let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Accept operator WebSocket clients forever, one forwarding task each.
pub async fn run_ws_server(
    listener: TcpListener,
    snapshot: SharedSnapshot,
    config: RelayConfig,
    metrics: PipelineMetrics,
) -> Result<()> {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Operator accept failed: {}", e);
                continue;
            }
        };
        tokio::spawn(serve_operator(
            stream,
            peer,
            snapshot.clone(),
            config.clone(),
            metrics.clone(),
        ));
    }
}

async fn serve_operator(
    stream: TcpStream,
    peer: SocketAddr,
    snapshot: SharedSnapshot,
    config: RelayConfig,
    metrics: PipelineMetrics,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", peer, e);
            return;
        }
    };
    info!("🖥️ Operator connected from {}", peer);

    match forward_to_operator(ws, &snapshot, &config, &metrics).await {
        Ok(()) => info!("Operator {} disconnected", peer),
        Err(e) => warn!("Operator {} dropped: {:#}", peer, e),
    }
}

/// Push envelopes at `forward_fps` until the client closes or a send fails.
async fn forward_to_operator(
    ws: WebSocketStream<TcpStream>,
    snapshot: &SharedSnapshot,
    config: &RelayConfig,
    metrics: &PipelineMetrics,
) -> Result<()> {
    let (mut sink, mut incoming) = ws.split();
    let mut ticker = forward_ticker(config.forward_fps);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let messages = snapshot.read().await.operator_messages(config);
                for message in &messages {
                    let text = serde_json::to_string(message).context("Failed to serialize envelope")?;
                    if let Err(e) = sink.send(Message::text(text)).await {
                        metrics.inc(&metrics.datagrams_failed);
                        return Err(e).context("WebSocket send failed");
                    }
                    metrics.inc(&metrics.datagrams_sent);
                }
            }
            received = incoming.next() => match received {
                None | Some(Ok(Message::Close(_))) => return Ok(()),
                Some(Err(e)) => return Err(e).context("WebSocket receive failed"),
                // Operator UIs do not send commands; pings are answered by the stream
                Some(Ok(_)) => {}
            }
        }
    }
}

async fn bind_udp_forward(operator_addr: &str) -> Result<(UdpSocket, SocketAddr)> {
    let target = lookup_host(operator_addr)
        .await
        .with_context(|| format!("Failed to resolve operator address {}", operator_addr))?
        .next()
        .with_context(|| format!("No address found for {}", operator_addr))?;
    let bind_addr = if target.is_ipv4() {
        "0.0.0.0:0"
    } else {
        "[::]:0"
    };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .context("Failed to bind relay forward socket")?;
    Ok((socket, target))
}

/// Bind all endpoints and run listener and forwarders until one fails.
pub async fn run_relay(config: RelayConfig, metrics: PipelineMetrics) -> Result<()> {
    let listen = UdpSocket::bind(config.listen_addr.as_str())
        .await
        .with_context(|| format!("Failed to bind relay listener on {}", config.listen_addr))?;
    let ws_listener = TcpListener::bind(config.listen_ws_addr.as_str())
        .await
        .with_context(|| format!("Failed to bind operator WebSocket on {}", config.listen_ws_addr))?;

    let udp_forward = match config.operator_addr.as_deref() {
        Some(addr) => Some(bind_udp_forward(addr).await?),
        None => None,
    };

    info!(
        "📡 Relay listening on udp://{}, serving operators on ws://{} at {} FPS",
        listen.local_addr()?,
        ws_listener.local_addr()?,
        config.forward_fps
    );
    if let Some((_, target)) = &udp_forward {
        info!("Also forwarding envelopes to udp://{}", target);
    }

    let snapshot: SharedSnapshot = Arc::new(RwLock::new(RelaySnapshot::new()));
    let udp_forwarder = {
        let snapshot = snapshot.clone();
        let config = config.clone();
        let metrics = metrics.clone();
        async move {
            match udp_forward {
                Some((socket, target)) => {
                    run_forwarder(socket, target, snapshot, config, metrics).await
                }
                None => std::future::pending().await,
            }
        }
    };

    tokio::try_join!(
        run_listener(listen, snapshot.clone()),
        run_ws_server(ws_listener, snapshot, config, metrics),
        udp_forwarder,
    )?;
    Ok(())
}
