pub mod control_plane;
pub mod ports;
pub mod reaper;
pub mod store;

pub use control_plane::*;
pub use ports::*;
pub use reaper::*;
pub use store::*;
