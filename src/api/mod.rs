//! Control-plane API for ki-identity-browser
//!
//! HTTP endpoints for generating and validating fingerprints and for driving
//! account contexts, plus a WebSocket stream of lifecycle events.

pub mod routes;
pub mod server;
pub mod websocket;

pub use routes::{create_router, ApiResponse};
pub use server::{ApiServer, AppState};
pub use websocket::{ControlEvent, OutboundMessage, WebSocketCommand, WebSocketHandler};
