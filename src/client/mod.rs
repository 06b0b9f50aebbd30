pub mod service;

pub use service::{ClientEvent, GameClient};
