//! Webhook gateway for the voice relay.
//!
//! The gateway hosts the HTTP server, authenticates channel webhooks, and
//! drives each event through transcription, completion, synthesis, storage
//! and reply, strictly in that order.

pub mod relay;
pub mod server;
pub mod state;

pub use relay::{Relay, build_relay};
pub use server::{router, start_gateway};
pub use state::GatewayState;
