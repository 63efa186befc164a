//! Adapters over the external qemu tools

pub mod img;
pub mod runner;
pub mod system;

pub use img::QemuImg;
pub use runner::{CommandOutput, CommandRunner, Invocation, ProcessExit, SystemRunner};
pub use system::QemuSystem;
