// Room directory: clients broadcast a discovery request, hosts answer with their rooms

use anyhow::Result;
use std::collections::HashMap;
use tracing::debug;

use super::protocol::{Envelope, RelayPayload, ServerId, ServerSummary};
use super::relay::RelayChannel;

/// Host side: answer a discovery request, addressed back to the requester.
/// Returns false when the envelope was not a request.
pub fn answer_discovery(
    relay: &RelayChannel,
    envelope: &Envelope,
    summary: impl FnOnce() -> ServerSummary,
) -> Result<bool> {
    if envelope.payload != RelayPayload::DiscoveryRequest {
        return Ok(false);
    }
    let Some(requester) = relay.addressing().sender(envelope) else {
        debug!("Ignoring anonymous discovery request");
        return Ok(true);
    };

    let summary = summary();
    debug!(
        "Answering discovery from {} with {} rooms",
        requester,
        summary.rooms.len()
    );
    relay.send_message(
        RelayPayload::DiscoveryResponse {
            host_username: summary.host_username,
            rooms: summary.rooms,
        },
        Some(requester),
    )?;
    Ok(true)
}

/// Client side: responses collected during one discovery window
#[derive(Debug, Default)]
pub struct DirectoryCollector {
    servers: HashMap<ServerId, ServerSummary>,
    open: bool,
}

impl DirectoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget earlier results and start accepting responses
    pub fn begin(&mut self) {
        self.servers.clear();
        self.open = true;
    }

    /// Record a response; returns it when it was accepted
    pub fn handle(&mut self, envelope: &Envelope) -> Option<ServerSummary> {
        let RelayPayload::DiscoveryResponse {
            host_username,
            rooms,
        } = &envelope.payload
        else {
            return None;
        };
        if !self.open {
            debug!("Dropping late discovery response");
            return None;
        }
        let server_id = envelope.server_id.clone()?;

        let summary = ServerSummary {
            server_id: server_id.clone(),
            host_username: host_username.clone(),
            rooms: rooms.clone(),
        };
        self.servers.insert(server_id, summary.clone());
        Some(summary)
    }

    /// Close the window and hand out what was collected
    pub fn finish(&mut self) -> HashMap<ServerId, ServerSummary> {
        self.open = false;
        self.servers.clone()
    }

    #[cfg(test)]
    pub fn servers(&self) -> &HashMap<ServerId, ServerSummary> {
        &self.servers
    }
}
