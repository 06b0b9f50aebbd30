pub mod engine;
pub mod room;
pub mod walk;

pub use engine::{GameReporter, RoomEngine, RoomEvent};
pub use room::Room;
