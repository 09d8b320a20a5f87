// src/transport/mod.rs

pub mod relay;
pub mod udp;

pub use relay::{run_relay, RelayConfig, RelaySnapshot};
pub use udp::{ImagePayload, TransportConfig, UdpTelemetrySender};
