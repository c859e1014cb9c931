pub mod docker;
pub mod process;
pub mod tunnel;

pub use docker::*;
pub use process::*;
pub use tunnel::*;
