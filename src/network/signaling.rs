// Session-description exchange between two endpoint ids over the relay
// Descriptions are passed through opaquely; str0m builds and parses them

use anyhow::Result;

use super::protocol::{Envelope, RelayPayload, SessionDescription};
use super::relay::{Addressing, RelayChannel};

/// Description received from a remote endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub offer: SessionDescription,
    pub remote_id: String,
}

/// Stateless apart from who we are
#[derive(Debug, Clone)]
pub struct SignalingExchange {
    addressing: Addressing,
}

impl SignalingExchange {
    pub fn new(addressing: Addressing) -> Self {
        Self { addressing }
    }

    /// Send a description to one remote endpoint
    pub fn signal_offer(
        &self,
        relay: &RelayChannel,
        offer: SessionDescription,
        remote_id: &str,
    ) -> Result<()> {
        relay.send_message(RelayPayload::SignalOffer { offer }, Some(remote_id))
    }

    /// Extract a signal from an inbound envelope; `None` for other payloads
    /// or when the sender did not identify itself
    pub fn handle(&self, envelope: &Envelope) -> Option<Signal> {
        let RelayPayload::SignalOffer { offer } = &envelope.payload else {
            return None;
        };
        let remote_id = self.addressing.sender(envelope)?;
        Some(Signal {
            offer: offer.clone(),
            remote_id: remote_id.to_string(),
        })
    }
}
