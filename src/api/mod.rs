//! API server implementation
//!
//! Serves the log WebSocket, the container listing and the static viewer.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::{ApiServer, AppState};
