pub mod chat;
pub mod generation;
pub mod host;
pub mod poller;
pub mod sse;
pub mod timer;
pub mod transport;
