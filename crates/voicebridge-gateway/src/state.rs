//! Gateway shared state.

use std::time::Instant;

use crate::relay::Relay;

/// Shared gateway state accessible from all handlers.
///
/// Everything here is immutable after startup; requests share no mutable state.
pub struct GatewayState {
    pub relay: Relay,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(relay: Relay) -> Self {
        Self {
            relay,
            started_at: Instant::now(),
        }
    }
}
