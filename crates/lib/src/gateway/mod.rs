//! Gateway: HTTP + WebSocket server and the relay pipeline.

pub mod protocol;
pub mod server;

pub use server::{app, run_gateway, RelayState};
