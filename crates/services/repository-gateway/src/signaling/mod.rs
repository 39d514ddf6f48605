//! Client signaling: protocol, routing and the WebSocket transport

pub mod peer;
pub mod protocol;
pub mod router;
pub mod websocket;

pub use peer::PeerSender;
pub use protocol::{ClientMessage, ServerMessage};
pub use router::SignalingRouter;
pub use websocket::{WebSocketServer, WebSocketServerHandle};
