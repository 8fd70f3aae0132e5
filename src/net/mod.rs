//! Network layer: WebTransport server, session management, wire protocol.

pub mod framing;
pub mod protocol;
pub mod session;
pub mod tls;
pub mod transport;
