// Networking for Archers
// Relay link, signaling, WebRTC peer sessions and the room directory

pub mod directory;
pub mod peer;
pub mod peer_driver;
pub mod protocol;
pub mod relay;
pub mod signaling;

