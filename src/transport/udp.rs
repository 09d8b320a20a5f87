// src/transport/udp.rs
//
// Robot side: one `robot_telemetry` JSON datagram per processed frame.

use crate::telemetry::{RobotMessage, RobotPacket};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::{lookup_host, UdpSocket};
use tracing::{debug, info, warn};

/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Relay (station server) UDP address
    pub relay_addr: String,
    /// JPEG quality for both frames, 1-100
    pub jpeg_quality: u8,
    /// Upper bound on processed frames per second
    pub target_fps: u32,
    /// Datagrams above this size are sent without images
    pub max_datagram_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            relay_addr: "127.0.0.1:8080".to_string(),
            jpeg_quality: 50,
            target_fps: 15,
            max_datagram_bytes: MAX_UDP_PAYLOAD,
        }
    }
}

/// Which image payloads survived the size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePayload {
    Both,
    ProcessedOnly,
    TelemetryOnly,
}

#[derive(Debug, Clone)]
pub struct EncodedDatagram {
    pub bytes: Vec<u8>,
    pub images: ImagePayload,
}

/// Serialize `packet`, shedding images until it fits in `max_bytes`.
///
/// The annotated frame is kept over the raw one when only one fits.
pub fn encode_datagram(packet: &RobotPacket, max_bytes: usize) -> Result<EncodedDatagram> {
    let full = serialize(packet.clone())?;
    if full.len() <= max_bytes || !packet.has_images() {
        if full.len() > max_bytes {
            bail!(
                "telemetry datagram is {} bytes, limit is {}",
                full.len(),
                max_bytes
            );
        }
        let images = if packet.has_images() {
            ImagePayload::Both
        } else {
            ImagePayload::TelemetryOnly
        };
        return Ok(EncodedDatagram {
            bytes: full,
            images,
        });
    }

    let mut processed_only = packet.clone();
    processed_only.raw_image_b64.clear();
    let bytes = serialize(processed_only)?;
    if bytes.len() <= max_bytes {
        return Ok(EncodedDatagram {
            bytes,
            images: ImagePayload::ProcessedOnly,
        });
    }

    let bytes = serialize(packet.without_images())?;
    if bytes.len() > max_bytes {
        bail!(
            "telemetry datagram is {} bytes without images, limit is {}",
            bytes.len(),
            max_bytes
        );
    }
    Ok(EncodedDatagram {
        bytes,
        images: ImagePayload::TelemetryOnly,
    })
}

fn serialize(data: RobotPacket) -> Result<Vec<u8>> {
    serde_json::to_vec(&RobotMessage::RobotTelemetry { data })
        .context("Failed to serialize robot telemetry")
}

pub struct UdpTelemetrySender {
    socket: UdpSocket,
    target: SocketAddr,
    max_datagram_bytes: usize,
}

impl UdpTelemetrySender {
    pub async fn connect(config: &TransportConfig) -> Result<Self> {
        let target = lookup_host(config.relay_addr.as_str())
            .await
            .with_context(|| format!("Failed to resolve relay address {}", config.relay_addr))?
            .next()
            .with_context(|| format!("No address found for {}", config.relay_addr))?;

        let bind_addr = if target.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .context("Failed to bind telemetry socket")?;

        info!("📡 Telemetry -> udp://{}", target);

        Ok(Self {
            socket,
            target,
            max_datagram_bytes: config.max_datagram_bytes.min(MAX_UDP_PAYLOAD),
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send one packet; returns which images made it into the datagram.
    pub async fn send(&self, packet: &RobotPacket) -> Result<ImagePayload> {
        let datagram = encode_datagram(packet, self.max_datagram_bytes)?;
        if packet.has_images() && datagram.images != ImagePayload::Both {
            warn!(
                "Datagram over {} bytes, sent with images {:?}",
                self.max_datagram_bytes, datagram.images
            );
        }

        let sent = self
            .socket
            .send_to(&datagram.bytes, self.target)
            .await
            .with_context(|| format!("Failed to send telemetry to {}", self.target))?;
        debug!("Sent {} byte datagram", sent);

        Ok(datagram.images)
    }
}
