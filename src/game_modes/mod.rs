mod host;
mod play;

pub use host::run_host;
pub use play::{run_play, PlayOptions};
