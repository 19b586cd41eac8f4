//! WebSocket shim around the simulation kernel: wire messages and the
//! connection/tick plumbing. Everything here is a thin I/O layer; the
//! kernel never sees a socket.

pub mod protocol;
pub mod server;
