// Hosting side: peer-session registry and the host event loop

pub mod registry;
pub mod service;

pub use service::GameHost;
