//! Data models

mod disk;
mod machine;

pub use disk::*;
pub use machine::*;
