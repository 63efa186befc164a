//! HTTP API for disk and machine control

mod handlers;
mod server;
mod types;

pub use handlers::AppState;
pub use server::{router, Server};
pub use types::*;
