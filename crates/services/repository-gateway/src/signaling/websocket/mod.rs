//! WebSocket transport for the client protocol

pub mod handler;
pub mod server;

pub use server::{WebSocketServer, WebSocketServerHandle};
