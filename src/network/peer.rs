// One direct peer-to-peer data channel, sans-I/O
// Wraps a str0m Rtc together with its negotiation state and reconnect timer.
// The owner feeds datagrams, signals and timeouts in and drains `poll_output`.

use serde::Serialize;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use str0m::change::{SdpAnswer, SdpOffer, SdpPendingOffer};
use str0m::channel::{ChannelConfig, ChannelId, Reliability};
use str0m::net::{Protocol, Receive};
use str0m::{Candidate, Event, IceConnectionState, Input, Output, Rtc, RtcError};

use super::protocol::SessionDescription;

const CHANNEL_LABEL: &str = "archers";

/// How long a session without any deadline of its own waits between polls
const IDLE_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("invalid session description: {0}")]
    Sdp(String),

    #[error("webrtc error: {0}")]
    Rtc(#[from] RtcError),

    #[error("data channel is not open")]
    ChannelNotOpen,

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What a session reports to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// Data channel open; emitted once per established link
    Connect,
    /// Inbound JSON message
    Message(serde_json::Value),
    /// Negotiation or link failure
    Error(String),
    /// Channel closed, locally or by the remote
    Close,
}

/// UDP datagram str0m wants on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct Datagram {
    pub source: SocketAddr,
    pub destination: SocketAddr,
    pub contents: Vec<u8>,
}

#[derive(Debug)]
pub enum PeerOutput {
    /// Description to relay to the remote endpoint
    Signal(SessionDescription),
    Event(PeerEvent),
    Transmit(Datagram),
    /// Call `handle_timeout` no later than this; always the last output of a drain
    Timeout(Instant),
}

enum Negotiation {
    /// Acceptor waiting for the remote offer
    AwaitingOffer,
    /// Initiator waiting for the answer to its offer
    AwaitingAnswer(SdpPendingOffer),
    /// Descriptions exchanged; further ones are ignored
    Stable,
    /// Broken until the next rebuild
    Failed,
}

pub struct PeerSession {
    id: String,
    remote_id: String,
    is_initiator: bool,
    candidates: Vec<Candidate>,
    rtc: Rtc,
    negotiation: Negotiation,
    channel: Option<ChannelId>,
    reconnect_interval: Duration,
    reconnect_at: Option<Instant>,
    pending: VecDeque<PeerOutput>,
    last_now: Instant,
    link_failed: bool,
    closed: bool,
}

impl PeerSession {
    /// An initiator queues its offer right away
    pub fn new(
        remote_id: String,
        is_initiator: bool,
        candidates: Vec<Candidate>,
        reconnect_interval: Duration,
        now: Instant,
    ) -> Self {
        let mut session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            remote_id,
            is_initiator,
            rtc: build_rtc(&candidates),
            candidates,
            negotiation: Negotiation::AwaitingOffer,
            channel: None,
            reconnect_interval,
            reconnect_at: None,
            pending: VecDeque::new(),
            last_now: now,
            link_failed: false,
            closed: false,
        };

        if is_initiator {
            session.offer(now);
        }
        session
    }

    #[cfg(test)]
    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[cfg(test)]
    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Feed a description relayed from `remote_id`
    pub fn handle_signal(
        &mut self,
        remote_id: &str,
        description: SessionDescription,
        now: Instant,
    ) {
        self.last_now = now;
        if self.closed || remote_id != self.remote_id {
            debug!("Session {} ignoring signal from {}", self.id, remote_id);
            return;
        }

        match (std::mem::replace(&mut self.negotiation, Negotiation::Failed), description) {
            (Negotiation::AwaitingOffer, SessionDescription::Offer { sdp }) => {
                match self.accept_offer(&sdp) {
                    Ok(answer) => {
                        self.negotiation = Negotiation::Stable;
                        self.pending.push_back(PeerOutput::Signal(answer));
                    }
                    Err(e) => self.fail(format!("failed to accept offer: {}", e), now),
                }
            }
            (Negotiation::AwaitingAnswer(pending), SessionDescription::Answer { sdp }) => {
                match self.accept_answer(pending, &sdp) {
                    Ok(()) => {
                        debug!("Session {} negotiated with {}", self.id, self.remote_id);
                        self.negotiation = Negotiation::Stable;
                    }
                    Err(e) => self.fail(format!("failed to accept answer: {}", e), now),
                }
            }
            (state, _) => {
                debug!("Session {} ignoring late or unexpected description", self.id);
                self.negotiation = state;
            }
        }
    }

    fn accept_offer(&mut self, sdp: &str) -> Result<SessionDescription, PeerError> {
        let offer = SdpOffer::from_sdp_string(sdp).map_err(|e| PeerError::Sdp(e.to_string()))?;
        let answer = self.rtc.sdp_api().accept_offer(offer)?;
        Ok(SessionDescription::Answer {
            sdp: answer.to_sdp_string(),
        })
    }

    fn accept_answer(&mut self, pending: SdpPendingOffer, sdp: &str) -> Result<(), PeerError> {
        let answer = SdpAnswer::from_sdp_string(sdp).map_err(|e| PeerError::Sdp(e.to_string()))?;
        self.rtc.sdp_api().accept_answer(pending, answer)?;
        Ok(())
    }

    /// Inbound datagram from the session's socket
    pub fn handle_receive(
        &mut self,
        now: Instant,
        source: SocketAddr,
        destination: SocketAddr,
        contents: &[u8],
    ) {
        self.last_now = now;
        if self.closed || self.link_failed {
            return;
        }

        let contents = match contents.try_into() {
            Ok(contents) => contents,
            Err(e) => {
                debug!("Dropping datagram from {}: {}", source, e);
                return;
            }
        };
        let receive = Receive {
            proto: Protocol::Udp,
            source,
            destination,
            contents,
        };
        if let Err(e) = self.rtc.handle_input(Input::Receive(now, receive)) {
            self.fail(format!("link error: {}", e), now);
        }
    }

    /// Drive timers; a due reconnect deadline rebuilds the connection
    pub fn handle_timeout(&mut self, now: Instant) {
        self.last_now = now;
        if self.closed {
            return;
        }

        if let Some(at) = self.reconnect_at {
            if now >= at {
                self.rebuild(now);
                return;
            }
        }

        if self.link_failed {
            return;
        }
        if let Err(e) = self.rtc.handle_input(Input::Timeout(now)) {
            self.fail(format!("link error: {}", e), now);
        }
    }

    /// Serialize to JSON and write it on the data channel
    pub fn send_message<T: Serialize>(&mut self, message: &T) -> Result<(), PeerError> {
        let text = serde_json::to_string(message)?;
        self.send_text(&text)
    }

    pub fn send_text(&mut self, text: &str) -> Result<(), PeerError> {
        let cid = self.channel.ok_or(PeerError::ChannelNotOpen)?;
        let mut channel = self.rtc.channel(cid).ok_or(PeerError::ChannelNotOpen)?;
        channel.write(false, text.as_bytes())?;
        Ok(())
    }

    /// Tear the link down; emits `Close` once
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.rtc.disconnect();
        self.mark_closed();
    }

    /// Next thing the owner has to act on. A drain ends with `Timeout`;
    /// `None` once the session is closed and drained.
    pub fn poll_output(&mut self) -> Option<PeerOutput> {
        if let Some(output) = self.pending.pop_front() {
            return Some(output);
        }
        if self.closed {
            return None;
        }
        if self.link_failed {
            return Some(PeerOutput::Timeout(self.idle_deadline()));
        }

        loop {
            match self.rtc.poll_output() {
                Ok(Output::Transmit(transmit)) => {
                    return Some(PeerOutput::Transmit(Datagram {
                        source: transmit.source,
                        destination: transmit.destination,
                        contents: transmit.contents.to_vec(),
                    }));
                }
                Ok(Output::Event(event)) => {
                    self.handle_event(event);
                    if let Some(output) = self.pending.pop_front() {
                        return Some(output);
                    }
                }
                Ok(Output::Timeout(deadline)) => {
                    let deadline = match self.reconnect_at {
                        Some(at) => deadline.min(at),
                        None => deadline,
                    };
                    return Some(PeerOutput::Timeout(deadline));
                }
                Err(e) => {
                    let now = self.last_now;
                    self.fail(format!("link error: {}", e), now);
                    return self.pending.pop_front();
                }
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Connected => {
                debug!("Session {} ICE and DTLS established", self.id);
            }
            Event::IceConnectionStateChange(state) => {
                debug!("Session {} ICE state: {:?}", self.id, state);
                if matches!(state, IceConnectionState::Disconnected) {
                    let now = self.last_now;
                    self.fail("ICE connection lost".to_string(), now);
                }
            }
            Event::ChannelOpen(cid, label) => {
                info!("Session {} opened channel '{}' to {}", self.id, label, self.remote_id);
                if self.channel.is_none() {
                    self.channel = Some(cid);
                    self.reconnect_at = None;
                    self.pending.push_back(PeerOutput::Event(PeerEvent::Connect));
                }
            }
            Event::ChannelData(data) => match serde_json::from_slice(&data.data) {
                Ok(value) => self.pending.push_back(PeerOutput::Event(PeerEvent::Message(value))),
                Err(e) => warn!("Session {} dropping malformed message: {}", self.id, e),
            },
            Event::ChannelClose(cid) => {
                if self.channel == Some(cid) {
                    info!("Session {} channel to {} closed", self.id, self.remote_id);
                    self.mark_closed();
                }
            }
            _ => {}
        }
    }

    /// Report a failure; an initiator arms its reconnect deadline
    fn fail(&mut self, reason: String, now: Instant) {
        warn!("Session {} with {}: {}", self.id, self.remote_id, reason);
        self.link_failed = true;
        self.negotiation = Negotiation::Failed;
        self.pending.push_back(PeerOutput::Event(PeerEvent::Error(reason)));

        if self.is_initiator && self.reconnect_at.is_none() {
            self.reconnect_at = Some(now + self.reconnect_interval);
        }
    }

    /// Fresh Rtc and a fresh offer; the deadline stays armed until the channel opens
    fn rebuild(&mut self, now: Instant) {
        info!("Session {} reconnecting to {}", self.id, self.remote_id);
        self.rtc.disconnect();
        self.rtc = build_rtc(&self.candidates);
        self.channel = None;
        self.link_failed = false;
        self.negotiation = Negotiation::AwaitingOffer;
        self.reconnect_at = Some(now + self.reconnect_interval);
        self.offer(now);
    }

    fn offer(&mut self, now: Instant) {
        let mut change = self.rtc.sdp_api();
        let cid = change.add_channel_with_config(ChannelConfig {
            label: CHANNEL_LABEL.to_string(),
            ordered: true,
            reliability: Reliability::Reliable,
            negotiated: None,
            protocol: String::new(),
        });

        match change.apply() {
            Some((offer, pending)) => {
                debug!("Session {} offering channel {:?}", self.id, cid);
                self.negotiation = Negotiation::AwaitingAnswer(pending);
                self.pending.push_back(PeerOutput::Signal(SessionDescription::Offer {
                    sdp: offer.to_sdp_string(),
                }));
            }
            None => self.fail("nothing to offer".to_string(), now),
        }
    }

    fn mark_closed(&mut self) {
        self.closed = true;
        self.channel = None;
        self.reconnect_at = None;
        self.pending.push_back(PeerOutput::Event(PeerEvent::Close));
    }

    fn idle_deadline(&self) -> Instant {
        self.reconnect_at.unwrap_or(self.last_now + IDLE_WAIT)
    }
}

fn build_rtc(candidates: &[Candidate]) -> Rtc {
    let mut rtc = Rtc::builder().set_rtp_mode(false).build();
    for candidate in candidates {
        if rtc.add_local_candidate(candidate.clone()).is_none() {
            warn!("Rejected local candidate {:?}", candidate);
        }
    }
    rtc
}
